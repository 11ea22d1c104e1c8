// Unit table construction
use crate::dom::{squash_ws, Element};
use crate::namespaces::{NamespaceMap, NamespaceRole};
use ahash::AHashMap;
use compact_str::CompactString;

/// Unit id → currency code, or the empty string for a dimensionless `pure`
/// measure. Only those two unit shapes are modelled; any other measure gets
/// no entry at all. Built once per document, before any fact is resolved.
#[derive(Debug, Clone, Default)]
pub struct UnitTable {
    units: AHashMap<CompactString, CompactString>,
}

impl UnitTable {
    pub fn build(root: &Element, ns: &NamespaceMap) -> Self {
        let unit_name = ns.qualified(NamespaceRole::Instance, "unit");
        let measure_name = ns.qualified(NamespaceRole::Instance, "measure");
        let pure = ns.qualified(NamespaceRole::Instance, "pure");

        let mut units = AHashMap::new();
        for element in root.descendants() {
            if element.name != unit_name {
                continue;
            }
            let Some(id) = element.attr("id") else {
                continue;
            };
            let Some(measure) = element.child(&measure_name) else {
                continue;
            };
            let measure = squash_ws(&measure.text());
            if let Some(code) = measure.strip_prefix("iso4217:") {
                units.insert(CompactString::from(id), CompactString::from(code));
            } else if measure == pure {
                units.insert(CompactString::from(id), CompactString::default());
            }
            // Anything else (divide units, non-currency measures) is out of
            // scope: no entry, facts referencing it are dropped downstream.
        }
        UnitTable { units }
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.units.get(id).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}
