// Diagnostics side-channel
//
// Every skip decision in the engine is surfaced here rather than on the
// record stream: a dropped fact, a malformed token, a document that failed
// to parse. The sink is injected into each component so callers (and tests)
// choose where warnings go.
use compact_str::CompactString;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Diagnostic {
    #[error("No context for '{context_ref}': name: '{name}'")]
    MissingContext {
        context_ref: CompactString,
        name: CompactString,
    },

    #[error("No unit for '{unit_ref}': name: '{name}'")]
    MissingUnit {
        unit_ref: CompactString,
        name: CompactString,
    },

    #[error("Invalid format: scale='{scale}'")]
    InvalidScale { scale: CompactString },

    #[error("Invalid format: sign='{sign}'")]
    InvalidSign { sign: CompactString },

    #[error("No endDate for startDate in context '{context_id}'")]
    MissingEndDate { context_id: CompactString },

    #[error("No fact found for context '{context_id}'")]
    NoFactForContext { context_id: CompactString },

    #[error("Duplicate entry: name: '{name}', contextRef: '{context_ref}'")]
    DuplicateEntry {
        name: CompactString,
        context_ref: CompactString,
    },

    #[error("Parse failed for '{filename}': {message}")]
    ParseFailed {
        filename: CompactString,
        message: CompactString,
    },
}

pub trait DiagnosticSink {
    fn emit(&mut self, diagnostic: Diagnostic);
}

/// Forwards diagnostics to the `log` facade at warn level.
#[derive(Debug, Default)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn emit(&mut self, diagnostic: Diagnostic) {
        log::warn!("{}", diagnostic);
    }
}

/// Collects diagnostics in memory. Tests assert on these as the signal that
/// malformed input was recognised and skipped rather than silently dropped.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub diagnostics: Vec<Diagnostic>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, diagnostic: &Diagnostic) -> bool {
        self.diagnostics.contains(diagnostic)
    }
}

impl DiagnosticSink for MemorySink {
    fn emit(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_reference() {
        let d = Diagnostic::MissingContext {
            context_ref: "C9".into(),
            name: "core:DividendsPaid".into(),
        };
        assert_eq!(d.to_string(), "No context for 'C9': name: 'core:DividendsPaid'");

        let d = Diagnostic::InvalidScale { scale: "abc".into() };
        assert_eq!(d.to_string(), "Invalid format: scale='abc'");
    }

    #[test]
    fn memory_sink_collects_in_order() {
        let mut sink = MemorySink::new();
        sink.emit(Diagnostic::InvalidSign { sign: "x".into() });
        sink.emit(Diagnostic::MissingEndDate {
            context_id: "C1".into(),
        });
        assert_eq!(sink.diagnostics.len(), 2);
        assert!(sink.contains(&Diagnostic::InvalidSign { sign: "x".into() }));
    }
}
