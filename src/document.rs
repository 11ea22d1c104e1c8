// Per-document orchestration: dialect selection, table building, extraction
use crate::contexts::ContextTable;
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::dom;
use crate::facts::{collect_facts, FactExtractor, RawFact};
use crate::namespaces::{NamespaceMap, NamespaceRole};
use crate::sink::{AccountRecord, RecordSink};
use crate::units::UnitTable;
use crate::Result;
use ahash::AHashSet;
use chrono::NaiveDate;
use compact_str::CompactString;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

/// Well-known tags carrying the filing company's registered number.
const HTML_COMPANY_NUMBER_TAG: &str = "UKCompaniesHouseRegisteredNumber";
const XML_COMPANY_NUMBER_TAG: &str = "CompaniesHouseRegisteredNumber";

/// Bulk-download filenames embed the registered number and filing date:
/// `Prod224_1234_07654321_20171231.html`.
static FILENAME_META: Lazy<Regex> = Lazy::new(|| Regex::new(r"_(\d{8})_(\d{8})\.html$").unwrap());

/// Document dialect, selected from the filename suffix only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Inline XBRL embedded in (X)HTML.
    Html,
    /// Standalone XBRL instance document.
    Xml,
}

impl Dialect {
    pub fn from_filename(filename: &str) -> Option<Dialect> {
        if filename.ends_with(".html") {
            Some(Dialect::Html)
        } else if filename.ends_with(".xml") {
            Some(Dialect::Xml)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentState {
    Unparsed,
    NamespacesLoaded,
    TablesBuilt,
    Parsed,
    ParseFailed,
}

/// One entry of the fact-of-interest catalogue.
#[derive(Debug, Clone)]
pub struct AccountTag {
    pub role: NamespaceRole,
    pub local: CompactString,
    pub numeric: bool,
}

impl AccountTag {
    pub fn numeric(role: NamespaceRole, local: &str) -> Self {
        AccountTag {
            role,
            local: CompactString::from(local),
            numeric: true,
        }
    }

    pub fn textual(role: NamespaceRole, local: &str) -> Self {
        AccountTag {
            role,
            local: CompactString::from(local),
            numeric: false,
        }
    }
}

/// The account tags queried by default for every parsed filing.
pub fn default_catalogue() -> Vec<AccountTag> {
    use NamespaceRole::Core;
    vec![
        AccountTag::numeric(Core, "TurnoverRevenue"),
        AccountTag::numeric(Core, "WagesSalaries"),
        AccountTag::numeric(Core, "DividendsPaid"),
        AccountTag::numeric(Core, "FixedAssets"),
        AccountTag::numeric(Core, "RetainedEarningsAccumulatedLosses"),
    ]
}

/// One statutory filing, parsed in place.
///
/// The state machine is strictly forward: Unparsed → NamespacesLoaded →
/// TablesBuilt → Parsed, or ParseFailed on unrecoverable markup. A failed
/// document never raises past `parse`; batch callers check `is_parsed` and
/// move on.
pub struct FilingDocument {
    filename: String,
    dialect: Option<Dialect>,
    registered_number: Option<CompactString>,
    filing_date: Option<NaiveDate>,
    state: DocumentState,
    ns: NamespaceMap,
    units: UnitTable,
    contexts: ContextTable,
    facts: Vec<RawFact>,
    company_number: Option<CompactString>,
    dump_dir: Option<PathBuf>,
}

impl FilingDocument {
    pub fn new(filename: impl Into<String>) -> Self {
        let filename = filename.into();
        let dialect = Dialect::from_filename(&filename);
        let (registered_number, filing_date) = parse_filename_meta(&filename);
        FilingDocument {
            filename,
            dialect,
            registered_number,
            filing_date,
            state: DocumentState::Unparsed,
            ns: NamespaceMap::default(),
            units: UnitTable::default(),
            contexts: ContextTable::default(),
            facts: Vec::new(),
            company_number: None,
            dump_dir: None,
        }
    }

    /// Directory that receives the raw bytes of documents that fail to
    /// parse, for offline inspection.
    pub fn with_dump_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dump_dir = Some(dir.into());
        self
    }

    /// Parse the document bytes. Returns true when the document reached the
    /// Parsed state; all failures are absorbed and reported through the
    /// diagnostics sink.
    pub fn parse(&mut self, data: &[u8], diag: &mut dyn DiagnosticSink) -> bool {
        let Some(dialect) = self.dialect else {
            self.fail(data, "unsupported filename suffix", diag);
            return false;
        };

        let root = match dom::parse(data) {
            Ok(root) => root,
            Err(e) => {
                self.fail(data, &e.to_string(), diag);
                return false;
            }
        };

        self.ns = NamespaceMap::from_root(&root);
        self.state = DocumentState::NamespacesLoaded;
        log::debug!(
            "{}: resolved {} namespace roles",
            self.filename,
            self.ns.resolved_roles().len()
        );

        self.units = UnitTable::build(&root, &self.ns);
        self.contexts = ContextTable::build(&root, &self.ns, diag);
        self.facts = collect_facts(&root, &self.ns, dialect);
        self.state = DocumentState::TablesBuilt;

        self.company_number = self.find_company_number(dialect);
        self.state = DocumentState::Parsed;
        true
    }

    fn fail(&mut self, data: &[u8], message: &str, diag: &mut dyn DiagnosticSink) {
        if let Some(dir) = &self.dump_dir {
            let name = Path::new(&self.filename)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "unnamed".to_string());
            if let Err(e) = std::fs::write(dir.join(name), data) {
                log::warn!("{}: could not dump raw document: {}", self.filename, e);
            }
        }
        diag.emit(Diagnostic::ParseFailed {
            filename: CompactString::from(self.filename.as_str()),
            message: CompactString::from(message),
        });
        self.state = DocumentState::ParseFailed;
    }

    fn find_company_number(&self, dialect: Dialect) -> Option<CompactString> {
        let tag = match dialect {
            Dialect::Html => self
                .ns
                .qualified(NamespaceRole::Business, HTML_COMPANY_NUMBER_TAG),
            Dialect::Xml => self
                .ns
                .qualified(NamespaceRole::CompaniesAct, XML_COMPANY_NUMBER_TAG),
        };
        self.facts
            .iter()
            .find(|f| !f.numeric && f.name == tag && !f.text.is_empty())
            .map(|f| f.text.clone())
    }

    pub fn state(&self) -> DocumentState {
        self.state
    }

    pub fn is_parsed(&self) -> bool {
        self.state == DocumentState::Parsed
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn dialect(&self) -> Option<Dialect> {
        self.dialect
    }

    /// Registered number parsed from the filename pattern.
    pub fn registered_number(&self) -> Option<&str> {
        self.registered_number.as_deref()
    }

    pub fn filing_date(&self) -> Option<NaiveDate> {
        self.filing_date
    }

    /// Company number extracted from the document's well-known tag.
    pub fn company_number(&self) -> Option<&str> {
        self.company_number.as_deref()
    }

    pub fn units(&self) -> &UnitTable {
        &self.units
    }

    pub fn contexts(&self) -> &ContextTable {
        &self.contexts
    }

    pub fn facts(&self) -> &[RawFact] {
        &self.facts
    }

    pub fn extractor(&self) -> FactExtractor<'_> {
        FactExtractor::new(
            &self.ns,
            &self.units,
            &self.contexts,
            &self.facts,
            self.dialect.unwrap_or(Dialect::Html),
        )
    }

    /// Query the catalogue and emit one record per resolved fact, enforcing
    /// first-seen uniqueness per (account tag, context). Does nothing
    /// unless the document reached the Parsed state.
    pub fn emit_records(
        &self,
        catalogue: &[AccountTag],
        sink: &mut dyn RecordSink,
        diag: &mut dyn DiagnosticSink,
    ) -> Result<usize> {
        if !self.is_parsed() {
            return Ok(0);
        }
        let extractor = self.extractor();
        let identifier = self.record_identifier();
        let mut seen: AHashSet<(CompactString, CompactString)> = AHashSet::new();
        let mut emitted = 0;

        for tag in catalogue {
            let qname = self.ns.qualified(tag.role, &tag.local);
            for fact in extractor.extract(&qname, tag.numeric, diag) {
                if !seen.insert((qname.clone(), fact.context_ref.clone())) {
                    diag.emit(Diagnostic::DuplicateEntry {
                        name: qname.clone(),
                        context_ref: fact.context_ref.clone(),
                    });
                    continue;
                }
                let mut record = AccountRecord {
                    registered_number: identifier.clone(),
                    account_name: tag.local.clone(),
                    segment: fact.segment_label.clone(),
                    value: fact.value.clone(),
                    unit: fact.unit.clone(),
                    start_date: None,
                    end_date: None,
                    instant: None,
                    forever: false,
                };
                record.set_period(&fact.period);
                sink.emit(&record)?;
                emitted += 1;
            }
        }
        Ok(emitted)
    }

    /// In-document company number when tagged, else the filename-derived
    /// registered number.
    fn record_identifier(&self) -> CompactString {
        self.company_number
            .clone()
            .or_else(|| self.registered_number.clone())
            .unwrap_or_default()
    }
}

fn parse_filename_meta(filename: &str) -> (Option<CompactString>, Option<NaiveDate>) {
    let Some(caps) = FILENAME_META.captures(filename) else {
        return (None, None);
    };
    let registered_number = CompactString::from(&caps[1]);
    let filing_date = NaiveDate::parse_from_str(&caps[2], "%Y%m%d").ok();
    (Some(registered_number), filing_date)
}
