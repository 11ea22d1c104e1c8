// Context table construction: periods and dimensional segments
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::dom::{squash_ws, Element};
use crate::namespaces::{NamespaceMap, NamespaceRole};
use ahash::AHashMap;
use compact_str::CompactString;

/// Reporting period of a context. A malformed duration (startDate present,
/// endDate missing) degrades to `Unknown` with a diagnostic; it is never a
/// parse failure.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Period {
    Duration {
        start: CompactString,
        end: CompactString,
    },
    Instant {
        date: CompactString,
    },
    Forever,
    #[default]
    Unknown,
}

/// Explicit-member reference under entity/segment: which sub-entity the
/// context's facts describe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentMember {
    pub member: CompactString,
    pub dimension: CompactString,
}

#[derive(Debug, Clone, Default)]
pub struct Context {
    pub segment: Option<SegmentMember>,
    pub period: Period,
}

/// Context id → segment + period. Built once per document, before any fact
/// is resolved against it. Iteration follows insertion (document) order so
/// sibling-context searches are deterministic.
#[derive(Debug, Clone, Default)]
pub struct ContextTable {
    contexts: AHashMap<CompactString, Context>,
    order: Vec<CompactString>,
}

impl ContextTable {
    pub fn build(root: &Element, ns: &NamespaceMap, diag: &mut dyn DiagnosticSink) -> Self {
        let context_name = ns.qualified(NamespaceRole::Instance, "context");
        let entity_name = ns.qualified(NamespaceRole::Instance, "entity");
        let segment_name = ns.qualified(NamespaceRole::Instance, "segment");
        let member_name = ns.qualified(NamespaceRole::Dimensions, "explicitMember");
        let period_name = ns.qualified(NamespaceRole::Instance, "period");

        let mut table = ContextTable::default();
        for element in root.descendants() {
            if element.name != context_name {
                continue;
            }
            let Some(id) = element.attr("id") else {
                continue;
            };

            let segment = element
                .child(&entity_name)
                .and_then(|entity| entity.child(&segment_name))
                .and_then(|segment| segment.child(&member_name))
                .map(|member| SegmentMember {
                    member: squash_ws(&member.text()),
                    dimension: CompactString::from(member.attr("dimension").unwrap_or("")),
                });

            let period = match element.child(&period_name) {
                Some(period) => parse_period(period, ns, id, diag),
                None => Period::Unknown,
            };

            table.insert(CompactString::from(id), Context { segment, period });
        }
        table
    }

    /// Last-write-wins on duplicate ids (malformed but seen in the wild).
    fn insert(&mut self, id: CompactString, context: Context) {
        if self.contexts.insert(id.clone(), context).is_none() {
            self.order.push(id);
        }
    }

    pub fn get(&self, id: &str) -> Option<&Context> {
        self.contexts.get(id)
    }

    /// (id, context) pairs in document order.
    pub fn iter(&self) -> impl Iterator<Item = (&CompactString, &Context)> {
        self.order.iter().map(|id| (id, &self.contexts[id]))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

fn parse_period(
    period: &Element,
    ns: &NamespaceMap,
    context_id: &str,
    diag: &mut dyn DiagnosticSink,
) -> Period {
    let text_of = |local: &str| -> Option<CompactString> {
        period
            .child(&ns.qualified(NamespaceRole::Instance, local))
            .map(|el| squash_ws(&el.text()))
    };

    if let Some(start) = text_of("startDate") {
        return match text_of("endDate") {
            Some(end) => Period::Duration { start, end },
            None => {
                diag.emit(Diagnostic::MissingEndDate {
                    context_id: CompactString::from(context_id),
                });
                Period::Unknown
            }
        };
    }
    if let Some(date) = text_of("instant") {
        return Period::Instant { date };
    }
    if period
        .child(&ns.qualified(NamespaceRole::Instance, "forever"))
        .is_some()
    {
        return Period::Forever;
    }
    Period::Unknown
}
