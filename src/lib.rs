//! ukaccounts - extraction engine for XBRL and inline-XBRL UK statutory filings
//!
//! Parses Companies House bulk-download documents (inline-XBRL HTML and
//! legacy standalone XBRL XML), resolves namespaces, builds unit and
//! context tables, and extracts a configurable catalogue of account facts
//! into flat records for CSV or line-delimited JSON output.

pub mod contexts;
pub mod diagnostics;
pub mod document;
pub mod dom;
pub mod facts;
pub mod namespaces;
pub mod sink;
pub mod units;

pub use contexts::{Context, ContextTable, Period, SegmentMember};
pub use diagnostics::{Diagnostic, DiagnosticSink, LogSink, MemorySink};
pub use document::{default_catalogue, AccountTag, Dialect, DocumentState, FilingDocument};
pub use facts::{ExtractedFact, FactExtractor, RawFact};
pub use namespaces::{NamespaceMap, NamespaceRole};
pub use sink::{AccountRecord, CsvSink, JsonLinesSink, RecordSink, Value};
pub use units::UnitTable;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
