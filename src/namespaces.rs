// Namespace resolution for UK filing taxonomies
//
// Filings bind the taxonomy namespaces to arbitrary document-local prefixes,
// and the taxonomy URIs carry a year-stamped path segment that changes across
// filing years. Roles are therefore matched by pattern against the declared
// URI, once per document, and every downstream query goes through the
// resulting table.
use crate::dom::Element;
use compact_str::{format_compact, CompactString};
use once_cell::sync::Lazy;
use regex::Regex;

/// Logical namespace roles the extraction engine cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamespaceRole {
    /// XBRL instance (`xbrli`): units, contexts, periods.
    Instance,
    /// XBRL dimensions (`xbrldi`): explicit members.
    Dimensions,
    /// Inline XBRL (`ix`): nonFraction / nonNumeric facts.
    Inline,
    /// FRC core taxonomy (`core`): account concepts.
    Core,
    /// FRC business taxonomy (`bus`): entity metadata.
    Business,
    /// Companies House GAAP audit-exempt taxonomy (`ae`).
    CompaniesAct,
    /// Legacy UK GAAP principal taxonomy (`pt`).
    LegacyGaap,
}

const ROLES: [NamespaceRole; 7] = [
    NamespaceRole::Instance,
    NamespaceRole::Dimensions,
    NamespaceRole::Inline,
    NamespaceRole::Core,
    NamespaceRole::Business,
    NamespaceRole::CompaniesAct,
    NamespaceRole::LegacyGaap,
];

static URI_PATTERNS: Lazy<Vec<(NamespaceRole, Regex)>> = Lazy::new(|| {
    [
        (
            NamespaceRole::Instance,
            r"^http://www\.xbrl\.org/[^/]+/instance$",
        ),
        (
            NamespaceRole::Dimensions,
            r"^http://xbrl\.org/[^/]+/xbrldi$",
        ),
        (
            NamespaceRole::Inline,
            r"^http://www\.xbrl\.org/[^/]+/inlineXBRL$",
        ),
        (
            NamespaceRole::Core,
            r"^http://xbrl\.frc\.org\.uk/fr/[^/]+/core$",
        ),
        (
            NamespaceRole::Business,
            r"^http://xbrl\.frc\.org\.uk/cd/[^/]+/business$",
        ),
        (
            NamespaceRole::CompaniesAct,
            r"^http://www\.companieshouse\.gov\.uk/ef/xbrl/uk/fr/gaap/ae/[^/]+$",
        ),
        (
            NamespaceRole::LegacyGaap,
            r"^http://www\.xbrl\.org/uk/fr/gaap/pt/[^/]+$",
        ),
    ]
    .into_iter()
    .map(|(role, pattern)| (role, Regex::new(pattern).unwrap()))
    .collect()
});

/// Role → document-local prefix, built once per document from the root
/// element's `xmlns` declarations. Immutable afterwards.
#[derive(Debug, Clone, Default)]
pub struct NamespaceMap {
    prefixes: [Option<CompactString>; 7],
}

impl NamespaceMap {
    /// Scan `xmlns:foo="uri"` (and default `xmlns="uri"`) declarations on
    /// the given root element. Declarations matching no known taxonomy URI
    /// are ignored; a role never declared stays absent.
    pub fn from_root(root: &Element) -> Self {
        let mut map = NamespaceMap::default();
        for (name, uri) in &root.attrs {
            let prefix = if let Some(rest) = name.strip_prefix("xmlns:") {
                rest
            } else if name.as_str() == "xmlns" {
                ""
            } else {
                continue;
            };
            for (role, pattern) in URI_PATTERNS.iter() {
                if pattern.is_match(uri) {
                    map.prefixes[*role as usize] = Some(CompactString::from(prefix));
                    break;
                }
            }
        }
        map
    }

    pub fn has(&self, role: NamespaceRole) -> bool {
        self.prefixes[role as usize].is_some()
    }

    pub fn prefix(&self, role: NamespaceRole) -> Option<&str> {
        self.prefixes[role as usize].as_deref()
    }

    /// Qualified name for a local name under the given role, using the
    /// prefix this document actually bound. When the role is absent (or
    /// bound to the default namespace) the bare local name is returned, so
    /// lookups degrade to matching unprefixed elements instead of failing.
    pub fn qualified(&self, role: NamespaceRole, local: &str) -> CompactString {
        match self.prefix(role) {
            Some(prefix) if !prefix.is_empty() => format_compact!("{}:{}", prefix, local),
            _ => CompactString::from(local),
        }
    }

    /// Roles resolved in this document, for logging.
    pub fn resolved_roles(&self) -> Vec<NamespaceRole> {
        ROLES
            .into_iter()
            .filter(|role| self.has(*role))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom;
    use pretty_assertions::assert_eq;

    #[test]
    fn resolves_prefixes_across_taxonomy_years() {
        let doc = dom::parse(
            br#"<html
                xmlns:x="http://www.xbrl.org/2003/instance"
                xmlns:d="http://xbrl.org/2006/xbrldi"
                xmlns:inline="http://www.xbrl.org/2013/inlineXBRL"
                xmlns:c="http://xbrl.frc.org.uk/fr/2021-01-01/core"
                xmlns:b="http://xbrl.frc.org.uk/cd/2014-09-01/business"/>"#,
        )
        .unwrap();
        let ns = NamespaceMap::from_root(&doc);
        assert_eq!(ns.prefix(NamespaceRole::Instance), Some("x"));
        assert_eq!(ns.prefix(NamespaceRole::Dimensions), Some("d"));
        assert_eq!(ns.prefix(NamespaceRole::Inline), Some("inline"));
        assert_eq!(ns.prefix(NamespaceRole::Core), Some("c"));
        assert_eq!(ns.prefix(NamespaceRole::Business), Some("b"));
        assert_eq!(ns.qualified(NamespaceRole::Core, "DividendsPaid"), "c:DividendsPaid");
    }

    #[test]
    fn matches_companies_act_and_legacy_gaap() {
        let doc = dom::parse(
            br#"<xbrl
                xmlns:ae="http://www.companieshouse.gov.uk/ef/xbrl/uk/fr/gaap/ae/2009-06-21"
                xmlns:pt="http://www.xbrl.org/uk/fr/gaap/pt/2004-12-01"/>"#,
        )
        .unwrap();
        let ns = NamespaceMap::from_root(&doc);
        assert_eq!(ns.prefix(NamespaceRole::CompaniesAct), Some("ae"));
        assert_eq!(ns.prefix(NamespaceRole::LegacyGaap), Some("pt"));
        assert!(!ns.has(NamespaceRole::Inline));
    }

    #[test]
    fn ignores_unknown_uris_and_versioned_lookalikes() {
        let doc = dom::parse(
            br#"<html
                xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
                xmlns:x="http://www.xbrl.org/2003/instance/extra"/>"#,
        )
        .unwrap();
        let ns = NamespaceMap::from_root(&doc);
        assert!(ns.resolved_roles().is_empty());
    }

    #[test]
    fn absent_role_degrades_to_local_name() {
        let ns = NamespaceMap::default();
        assert_eq!(ns.qualified(NamespaceRole::Instance, "unit"), "unit");
    }

    #[test]
    fn default_namespace_binding_uses_bare_names() {
        let doc = dom::parse(br#"<xbrl xmlns="http://www.xbrl.org/2003/instance"/>"#).unwrap();
        let ns = NamespaceMap::from_root(&doc);
        assert!(ns.has(NamespaceRole::Instance));
        assert_eq!(ns.qualified(NamespaceRole::Instance, "context"), "context");
    }
}
