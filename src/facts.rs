// Fact extraction: discovery, numeric decoding, segment attribution
use crate::contexts::{ContextTable, Period};
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::document::Dialect;
use crate::dom::{squash_ws, Element};
use crate::namespaces::{NamespaceMap, NamespaceRole};
use crate::sink::Value;
use crate::units::UnitTable;
use compact_str::CompactString;
use once_cell::sync::Lazy;
use regex::Regex;

/// Inline-XBRL tag carrying the name of the individual a dimensional
/// context describes.
const OFFICER_NAME_TAG: &str = "NameEntityOfficer";

static NUMERIC_TEXT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\d,]+$").unwrap());
static SCALE_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").unwrap());

/// One tagged value as it appears in the document, before any table joins.
#[derive(Debug, Clone)]
pub struct RawFact {
    /// Namespace-qualified tag name (the `name` attribute for inline facts,
    /// the element name for standalone XML facts).
    pub name: CompactString,
    pub context_ref: CompactString,
    pub unit_ref: Option<CompactString>,
    /// Whitespace-normalised text. Direct text when present, otherwise the
    /// concatenated descendant text (values nested in formatting wrappers).
    pub text: CompactString,
    pub decimals: Option<CompactString>,
    pub format: Option<CompactString>,
    pub scale: Option<CompactString>,
    pub sign: Option<CompactString>,
    pub numeric: bool,
}

impl RawFact {
    fn from_element(element: &Element, name: CompactString, numeric: bool) -> Option<Self> {
        let context_ref = CompactString::from(element.attr("contextRef")?);
        let mut text = squash_ws(&element.text());
        if text.is_empty() {
            text = squash_ws(&element.deep_text());
        }
        let attr = |n: &str| element.attr(n).map(CompactString::from);
        Some(RawFact {
            name,
            context_ref,
            unit_ref: attr("unitRef"),
            text,
            decimals: attr("decimals"),
            format: attr("format"),
            scale: attr("scale"),
            sign: attr("sign"),
            numeric,
        })
    }
}

/// Scan the document for tagged facts.
///
/// HTML dialect: inline `nonFraction` (numeric) and `nonNumeric` (textual)
/// elements, identified by their `name` attribute. Standalone XML dialect:
/// any element carrying a `contextRef` attribute is a fact named by its own
/// element name, numeric when it also carries a `unitRef`.
pub fn collect_facts(root: &Element, ns: &NamespaceMap, dialect: Dialect) -> Vec<RawFact> {
    let mut facts = Vec::new();
    match dialect {
        Dialect::Html => {
            let non_fraction = ns.qualified(NamespaceRole::Inline, "nonFraction");
            let non_numeric = ns.qualified(NamespaceRole::Inline, "nonNumeric");
            for element in root.descendants() {
                let numeric = if element.name == non_fraction {
                    true
                } else if element.name == non_numeric {
                    false
                } else {
                    continue;
                };
                let Some(name) = element.attr("name") else {
                    continue;
                };
                if let Some(fact) = RawFact::from_element(element, CompactString::from(name), numeric)
                {
                    facts.push(fact);
                }
            }
        }
        Dialect::Xml => {
            for element in root.descendants() {
                if element.attr("contextRef").is_none() {
                    continue;
                }
                let numeric = element.attr("unitRef").is_some();
                if let Some(fact) = RawFact::from_element(element, element.name.clone(), numeric) {
                    facts.push(fact);
                }
            }
        }
    }
    facts
}

/// Apply the scale/sign decoding rule to a reported digit string.
///
/// Returns `None` when the text is not a comma-separated digit string. A
/// malformed scale or sign token is diagnosed and its transform skipped;
/// the raw-derived value is kept. Scales that would overflow are treated
/// the same way.
pub fn decode_number(
    text: &str,
    scale: Option<&str>,
    sign: Option<&str>,
    diag: &mut dyn DiagnosticSink,
) -> Option<i64> {
    if !NUMERIC_TEXT.is_match(text) {
        return None;
    }
    let mut number: i64 = text.replace(',', "").parse().ok()?;

    if let Some(scale) = scale {
        let scaled = if SCALE_TOKEN.is_match(scale) {
            scale
                .parse::<u32>()
                .ok()
                .and_then(|exp| 10i64.checked_pow(exp))
                .and_then(|factor| number.checked_mul(factor))
        } else {
            None
        };
        match scaled {
            Some(scaled) => number = scaled,
            None => diag.emit(Diagnostic::InvalidScale {
                scale: CompactString::from(scale),
            }),
        }
    }

    if let Some(sign) = sign {
        if sign == "-" {
            number = -number;
        } else if !sign.is_empty() {
            diag.emit(Diagnostic::InvalidSign {
                sign: CompactString::from(sign),
            });
        }
    }

    Some(number)
}

/// A fact joined against the context and unit tables.
#[derive(Debug, Clone)]
pub struct ExtractedFact {
    pub name: CompactString,
    pub context_ref: CompactString,
    pub segment_label: Option<CompactString>,
    pub value: Option<Value>,
    pub unit: Option<CompactString>,
    pub period: Period,
}

pub struct FactExtractor<'a> {
    ns: &'a NamespaceMap,
    units: &'a UnitTable,
    contexts: &'a ContextTable,
    facts: &'a [RawFact],
    dialect: Dialect,
}

impl<'a> FactExtractor<'a> {
    pub fn new(
        ns: &'a NamespaceMap,
        units: &'a UnitTable,
        contexts: &'a ContextTable,
        facts: &'a [RawFact],
        dialect: Dialect,
    ) -> Self {
        Self {
            ns,
            units,
            contexts,
            facts,
            dialect,
        }
    }

    /// All facts for a namespace-qualified account tag.
    ///
    /// Both discovery strategies always run and their results are
    /// concatenated without cross-deduplication: recall is deliberately
    /// favoured over precision, and per-context uniqueness is left to the
    /// consuming layer.
    pub fn extract(
        &self,
        tag: &str,
        numeric: bool,
        diag: &mut dyn DiagnosticSink,
    ) -> Vec<ExtractedFact> {
        let mut out = self.by_element(tag, numeric, diag);
        if numeric {
            out.extend(self.by_dimension(tag, diag));
        }
        out
    }

    /// Facts tagged directly with the target name.
    fn by_element(
        &self,
        tag: &str,
        numeric: bool,
        diag: &mut dyn DiagnosticSink,
    ) -> Vec<ExtractedFact> {
        let mut out = Vec::new();
        for fact in self.facts {
            if fact.name != tag || fact.numeric != numeric {
                continue;
            }
            if let Some(extracted) = self.resolve(fact, diag) {
                out.push(extracted);
            }
        }
        out
    }

    /// Facts tagged generically but disambiguated through their dimensional
    /// context: any context whose explicit-member text contains the target
    /// tag, joined back to the numeric fact reported against it.
    fn by_dimension(&self, tag: &str, diag: &mut dyn DiagnosticSink) -> Vec<ExtractedFact> {
        let mut out = Vec::new();
        for (id, context) in self.contexts.iter() {
            let Some(segment) = &context.segment else {
                continue;
            };
            if !segment.member.contains(tag) {
                continue;
            }
            let Some(fact) = self
                .facts
                .iter()
                .find(|f| f.numeric && f.context_ref == *id)
            else {
                diag.emit(Diagnostic::NoFactForContext {
                    context_id: id.clone(),
                });
                continue;
            };
            if let Some(extracted) = self.resolve(fact, diag) {
                out.push(extracted);
            }
        }
        out
    }

    /// Join one raw fact against the context and unit tables; a missing
    /// reference drops the fact with a diagnostic, never fabricates.
    fn resolve(&self, fact: &RawFact, diag: &mut dyn DiagnosticSink) -> Option<ExtractedFact> {
        let Some(context) = self.contexts.get(&fact.context_ref) else {
            diag.emit(Diagnostic::MissingContext {
                context_ref: fact.context_ref.clone(),
                name: fact.name.clone(),
            });
            return None;
        };

        let (unit, value) = if fact.numeric {
            let unit_ref = fact.unit_ref.as_deref().unwrap_or("");
            let Some(unit) = self.units.get(unit_ref) else {
                diag.emit(Diagnostic::MissingUnit {
                    unit_ref: CompactString::from(unit_ref),
                    name: fact.name.clone(),
                });
                return None;
            };
            let value = decode_number(
                &fact.text,
                fact.scale.as_deref(),
                fact.sign.as_deref(),
                diag,
            );
            (Some(CompactString::from(unit)), value.map(Value::Number))
        } else {
            (None, Some(Value::Text(fact.text.clone())))
        };

        Some(ExtractedFact {
            name: fact.name.clone(),
            context_ref: fact.context_ref.clone(),
            segment_label: self.segment_label(&fact.context_ref),
            value,
            unit,
            period: context.period.clone(),
        })
    }

    /// Which named individual does this context represent?
    ///
    /// First look for an officer-name fact reported against the context
    /// itself; failing that, follow the context's explicit-member text to a
    /// sibling context sharing it and take the officer-name fact reported
    /// there. One indirection hop at most, and the original context id is
    /// excluded from the sibling search so resolution can never loop back
    /// to itself. HTML dialect only.
    pub fn segment_label(&self, context_id: &str) -> Option<CompactString> {
        if self.dialect != Dialect::Html {
            return None;
        }
        let officer_tag = self.ns.qualified(NamespaceRole::Business, OFFICER_NAME_TAG);

        if let Some(name) = self.officer_name_for(&officer_tag, context_id) {
            return Some(name);
        }

        let member = &self.contexts.get(context_id)?.segment.as_ref()?.member;
        if member.is_empty() {
            return None;
        }
        for (id, context) in self.contexts.iter() {
            if id.as_str() == context_id {
                continue;
            }
            let shares_member = context
                .segment
                .as_ref()
                .map_or(false, |s| s.member == *member);
            if !shares_member {
                continue;
            }
            if let Some(name) = self.officer_name_for(&officer_tag, id) {
                return Some(name);
            }
        }
        None
    }

    fn officer_name_for(&self, officer_tag: &str, context_id: &str) -> Option<CompactString> {
        self.facts
            .iter()
            .find(|f| !f.numeric && f.name == officer_tag && f.context_ref == context_id)
            .map(|f| f.text.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::MemorySink;
    use crate::dom;
    use pretty_assertions::assert_eq;

    #[test]
    fn decode_strips_commas() {
        let mut sink = MemorySink::new();
        assert_eq!(decode_number("5,000", None, None, &mut sink), Some(5000));
        assert!(sink.diagnostics.is_empty());
    }

    #[test]
    fn decode_applies_scale_and_sign() {
        let mut sink = MemorySink::new();
        assert_eq!(decode_number("12", Some("3"), None, &mut sink), Some(12_000));
        assert_eq!(decode_number("12", None, Some("-"), &mut sink), Some(-12));
        assert_eq!(
            decode_number("1,234", Some("2"), Some("-"), &mut sink),
            Some(-123_400)
        );
        assert!(sink.diagnostics.is_empty());
    }

    #[test]
    fn malformed_scale_skips_transform_and_diagnoses() {
        let mut sink = MemorySink::new();
        assert_eq!(decode_number("12", Some("abc"), None, &mut sink), Some(12));
        assert!(sink.contains(&Diagnostic::InvalidScale { scale: "abc".into() }));
    }

    #[test]
    fn malformed_sign_skips_transform_and_diagnoses() {
        let mut sink = MemorySink::new();
        assert_eq!(decode_number("12", None, Some("x"), &mut sink), Some(12));
        assert!(sink.contains(&Diagnostic::InvalidSign { sign: "x".into() }));
        // empty sign token is well-formed and a no-op
        let mut sink = MemorySink::new();
        assert_eq!(decode_number("12", None, Some(""), &mut sink), Some(12));
        assert!(sink.diagnostics.is_empty());
    }

    #[test]
    fn non_numeric_text_yields_no_value() {
        let mut sink = MemorySink::new();
        assert_eq!(decode_number("n/a", None, None, &mut sink), None);
        assert_eq!(decode_number("1 234", None, None, &mut sink), None);
        assert_eq!(decode_number("", None, None, &mut sink), None);
    }

    #[test]
    fn overflowing_scale_is_treated_as_malformed() {
        let mut sink = MemorySink::new();
        assert_eq!(decode_number("12", Some("30"), None, &mut sink), Some(12));
        assert!(sink.contains(&Diagnostic::InvalidScale { scale: "30".into() }));
    }

    // --- extraction over a small inline document -------------------------

    const DOC_NS: &str = concat!(
        r#"xmlns:xbrli="http://www.xbrl.org/2003/instance" "#,
        r#"xmlns:xbrldi="http://xbrl.org/2006/xbrldi" "#,
        r#"xmlns:ix="http://www.xbrl.org/2013/inlineXBRL" "#,
        r#"xmlns:core="http://xbrl.frc.org.uk/fr/2021-01-01/core" "#,
        r#"xmlns:bus="http://xbrl.frc.org.uk/cd/2021-01-01/business""#
    );

    struct Fixture {
        ns: NamespaceMap,
        units: UnitTable,
        contexts: ContextTable,
        facts: Vec<RawFact>,
    }

    impl Fixture {
        fn load(body: &str) -> (Self, MemorySink) {
            let markup = format!("<html {}>{}</html>", DOC_NS, body);
            let root = dom::parse(markup.as_bytes()).unwrap();
            let ns = NamespaceMap::from_root(&root);
            let mut sink = MemorySink::new();
            let units = UnitTable::build(&root, &ns);
            let contexts = ContextTable::build(&root, &ns, &mut sink);
            let facts = collect_facts(&root, &ns, Dialect::Html);
            (
                Fixture {
                    ns,
                    units,
                    contexts,
                    facts,
                },
                sink,
            )
        }

        fn extractor(&self) -> FactExtractor<'_> {
            FactExtractor::new(
                &self.ns,
                &self.units,
                &self.contexts,
                &self.facts,
                Dialect::Html,
            )
        }
    }

    const GBP_UNIT: &str = r#"<xbrli:unit id="U1">
        <xbrli:measure>iso4217:GBP</xbrli:measure></xbrli:unit>"#;

    fn director_context(id: &str, member: &str) -> String {
        format!(
            r#"<xbrli:context id="{}">
                 <xbrli:entity><xbrli:segment>
                   <xbrldi:explicitMember dimension="core:Dim">{}</xbrldi:explicitMember>
                 </xbrli:segment></xbrli:entity>
                 <xbrli:period>
                   <xbrli:startDate>2017-01-01</xbrli:startDate>
                   <xbrli:endDate>2017-12-31</xbrli:endDate>
                 </xbrli:period>
               </xbrli:context>"#,
            id, member
        )
    }

    #[test]
    fn by_element_resolves_value_unit_and_label() {
        let body = format!(
            r#"{unit}{ctx}
               <ix:nonNumeric name="bus:NameEntityOfficer" contextRef="C1">Director A</ix:nonNumeric>
               <ix:nonFraction name="core:DividendsPaid" contextRef="C1" unitRef="U1"
                               scale="0">5,000</ix:nonFraction>"#,
            unit = GBP_UNIT,
            ctx = director_context("C1", "core:Director1"),
        );
        let (fx, mut sink) = Fixture::load(&body);
        let facts = fx
            .extractor()
            .extract("core:DividendsPaid", true, &mut sink);

        // by-element hit plus nothing from by-dimension (member does not
        // contain the tag)
        assert_eq!(facts.len(), 1);
        let fact = &facts[0];
        assert_eq!(fact.value, Some(Value::Number(5000)));
        assert_eq!(fact.unit.as_deref(), Some("GBP"));
        assert_eq!(fact.segment_label.as_deref(), Some("Director A"));
        assert_eq!(
            fact.period,
            Period::Duration {
                start: "2017-01-01".into(),
                end: "2017-12-31".into()
            }
        );
        assert!(sink.diagnostics.is_empty());
    }

    #[test]
    fn missing_context_drops_fact_with_diagnostic() {
        let body = format!(
            r#"{unit}
               <ix:nonFraction name="core:DividendsPaid" contextRef="C9" unitRef="U1">1</ix:nonFraction>"#,
            unit = GBP_UNIT,
        );
        let (fx, mut sink) = Fixture::load(&body);
        let facts = fx
            .extractor()
            .extract("core:DividendsPaid", true, &mut sink);
        assert!(facts.is_empty());
        assert_eq!(
            sink.diagnostics,
            vec![Diagnostic::MissingContext {
                context_ref: "C9".into(),
                name: "core:DividendsPaid".into()
            }]
        );
    }

    #[test]
    fn missing_unit_drops_fact_with_diagnostic() {
        let body = format!(
            r#"{ctx}
               <ix:nonFraction name="core:DividendsPaid" contextRef="C1" unitRef="U9">1</ix:nonFraction>"#,
            ctx = director_context("C1", "core:Director1"),
        );
        let (fx, mut sink) = Fixture::load(&body);
        let facts = fx
            .extractor()
            .extract("core:DividendsPaid", true, &mut sink);
        assert!(facts.is_empty());
        assert!(sink.contains(&Diagnostic::MissingUnit {
            unit_ref: "U9".into(),
            name: "core:DividendsPaid".into()
        }));
    }

    #[test]
    fn by_dimension_recovers_generically_tagged_facts() {
        // The monetary fact is tagged with a generic concept; only the
        // context's member text links it to DividendsPaid.
        let body = format!(
            r#"{unit}{ctx}
               <ix:nonFraction name="core:Equity" contextRef="C1" unitRef="U1">2,500</ix:nonFraction>"#,
            unit = GBP_UNIT,
            ctx = director_context("C1", "core:DividendsPaid"),
        );
        let (fx, mut sink) = Fixture::load(&body);
        let facts = fx
            .extractor()
            .extract("core:DividendsPaid", true, &mut sink);
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].value, Some(Value::Number(2500)));
        assert_eq!(facts[0].name, "core:Equity");
    }

    #[test]
    fn by_dimension_without_fact_diagnoses() {
        let body = director_context("C1", "core:DividendsPaid");
        let (fx, mut sink) = Fixture::load(&body);
        let facts = fx
            .extractor()
            .extract("core:DividendsPaid", true, &mut sink);
        assert!(facts.is_empty());
        assert!(sink.contains(&Diagnostic::NoFactForContext {
            context_id: "C1".into()
        }));
    }

    #[test]
    fn strategies_concatenate_without_deduplication() {
        // One fact reachable both by element name and through its context's
        // member text: two results, by design.
        let body = format!(
            r#"{unit}{ctx}
               <ix:nonFraction name="core:DividendsPaid" contextRef="C1" unitRef="U1">100</ix:nonFraction>"#,
            unit = GBP_UNIT,
            ctx = director_context("C1", "core:DividendsPaid"),
        );
        let (fx, mut sink) = Fixture::load(&body);
        let facts = fx
            .extractor()
            .extract("core:DividendsPaid", true, &mut sink);
        assert_eq!(facts.len(), 2);
        assert_eq!(facts[0].context_ref, facts[1].context_ref);
    }

    #[test]
    fn segment_label_falls_back_to_sibling_context() {
        // C1 carries the money, C2 shares the member text and carries the
        // officer name.
        let body = format!(
            r#"{unit}{c1}{c2}
               <ix:nonFraction name="core:DividendsPaid" contextRef="C1" unitRef="U1">100</ix:nonFraction>
               <ix:nonNumeric name="bus:NameEntityOfficer" contextRef="C2">Director B</ix:nonNumeric>"#,
            unit = GBP_UNIT,
            c1 = director_context("C1", "core:Director1"),
            c2 = director_context("C2", "core:Director1"),
        );
        let (fx, mut sink) = Fixture::load(&body);
        let facts = fx
            .extractor()
            .extract("core:DividendsPaid", true, &mut sink);
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].segment_label.as_deref(), Some("Director B"));
    }

    #[test]
    fn segment_label_never_resolves_from_itself() {
        // Only C1 carries the member; no sibling exists, so no label, and
        // repeated resolution is stable.
        let body = format!(
            "{unit}{c1}",
            unit = GBP_UNIT,
            c1 = director_context("C1", "core:Director1"),
        );
        let (fx, _) = Fixture::load(&body);
        let extractor = fx.extractor();
        assert_eq!(extractor.segment_label("C1"), None);
        assert_eq!(extractor.segment_label("C1"), None);
    }

    #[test]
    fn segment_label_is_idempotent() {
        let body = format!(
            r#"{c1}{c2}
               <ix:nonNumeric name="bus:NameEntityOfficer" contextRef="C2">Director C</ix:nonNumeric>"#,
            c1 = director_context("C1", "core:Director1"),
            c2 = director_context("C2", "core:Director1"),
        );
        let (fx, _) = Fixture::load(&body);
        let extractor = fx.extractor();
        let first = extractor.segment_label("C1");
        assert_eq!(first.as_deref(), Some("Director C"));
        assert_eq!(extractor.segment_label("C1"), first);
    }

    #[test]
    fn textual_extraction_returns_stripped_text() {
        let body = format!(
            r#"{ctx}
               <ix:nonNumeric name="bus:UKCompaniesHouseRegisteredNumber"
                              contextRef="C1"> 01234567 </ix:nonNumeric>"#,
            ctx = director_context("C1", "core:Director1"),
        );
        let (fx, mut sink) = Fixture::load(&body);
        let facts = fx
            .extractor()
            .extract("bus:UKCompaniesHouseRegisteredNumber", false, &mut sink);
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].value, Some(Value::Text("01234567".into())));
        assert_eq!(facts[0].unit, None);
    }
}
