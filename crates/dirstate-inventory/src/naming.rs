//! Inventory naming rules
//!
//! Turns directory group DNs into inventory group names and host entries into
//! host identifiers, and decides which of them make it into the inventory.

use std::collections::BTreeMap;

use dirstate_ldap::Dn;
use serde::{Deserialize, Serialize};

use crate::types::ResolvedHost;

/// Naming and filtering rules for an inventory build
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingRules {
    /// Explicit names, keyed by the group's RDN value
    pub renames: BTreeMap<String, String>,
    /// Prefix removed from group names (case-insensitive)
    pub strip_prefix: Option<String>,
    /// Prefix added to every group name
    pub prefix: Option<String>,
    /// Group name patterns to keep; empty keeps all
    pub include_groups: Vec<String>,
    /// Group name patterns to drop
    pub exclude_groups: Vec<String>,
    /// Host name patterns to keep; empty keeps all
    pub include_hosts: Vec<String>,
    /// Host name patterns to drop
    pub exclude_hosts: Vec<String>,
    /// Attribute holding the host name
    pub host_name_attribute: String,
}

impl Default for NamingRules {
    fn default() -> Self {
        Self {
            renames: BTreeMap::new(),
            strip_prefix: None,
            prefix: None,
            include_groups: Vec::new(),
            exclude_groups: Vec::new(),
            include_hosts: Vec::new(),
            exclude_hosts: Vec::new(),
            host_name_attribute: "fqdn".to_string(),
        }
    }
}

impl NamingRules {
    /// Inventory group name for a directory group
    #[must_use]
    pub fn group_name(&self, dn: &Dn) -> String {
        let rdn = dn.rdn_value();
        let mut name = self
            .renames
            .get(rdn)
            .cloned()
            .unwrap_or_else(|| rdn.to_string());

        if let Some(strip) = self.strip_prefix.as_deref()
            && name.len() >= strip.len()
            && name.is_char_boundary(strip.len())
            && name[..strip.len()].eq_ignore_ascii_case(strip)
        {
            name = name[strip.len()..].to_string();
        }

        let mut name = sanitize(&name.to_lowercase());
        if let Some(prefix) = &self.prefix {
            name = format!("{prefix}{name}");
        }
        name
    }

    /// Host identifier: the host name attribute, else the first RDN value
    #[must_use]
    pub fn host_name(&self, host: &ResolvedHost) -> String {
        host.attributes
            .get(&self.host_name_attribute)
            .and_then(|values| values.first())
            .map_or_else(|| host.dn.rdn_value().to_string(), str::to_string)
    }

    /// Check group include/exclude patterns
    #[must_use]
    pub fn keeps_group(&self, name: &str) -> bool {
        keeps(&self.include_groups, &self.exclude_groups, name)
    }

    /// Check host include/exclude patterns
    #[must_use]
    pub fn keeps_host(&self, name: &str) -> bool {
        keeps(&self.include_hosts, &self.exclude_hosts, name)
    }
}

fn keeps(include: &[String], exclude: &[String], name: &str) -> bool {
    let included = include.is_empty() || include.iter().any(|p| wildcard_match(p, name));
    included && !exclude.iter().any(|p| wildcard_match(p, name))
}

/// Replace everything outside `[A-Za-z0-9_]` with `_`
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Match `text` against a pattern where `*` matches any run of characters
#[must_use]
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if pi < p.len() && p[pi] == t[ti] {
            pi += 1;
            ti += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirstate_ldap::{AttributeSet, AttributeValues};

    fn dn(s: &str) -> Dn {
        Dn::parse(s).unwrap()
    }

    #[test]
    fn test_group_name_transform() {
        let rules = NamingRules::default();
        assert_eq!(
            rules.group_name(&dn("cn=Web Servers-EU,cn=hostgroups,dc=x")),
            "web_servers_eu"
        );

        let rules = NamingRules {
            strip_prefix: Some("HG-".into()),
            prefix: Some("ipa_".into()),
            ..NamingRules::default()
        };
        assert_eq!(rules.group_name(&dn("cn=hg-db,dc=x")), "ipa_db");
    }

    #[test]
    fn test_rename_map() {
        let rules = NamingRules {
            renames: BTreeMap::from([("legacy".to_string(), "Old Boxes".to_string())]),
            ..NamingRules::default()
        };
        assert_eq!(rules.group_name(&dn("cn=legacy,dc=x")), "old_boxes");
    }

    #[test]
    fn test_host_name_fallback() {
        let rules = NamingRules::default();
        let mut attrs = AttributeSet::new();
        let mut host = ResolvedHost {
            dn: dn("fqdn=web1.example.com,cn=computers,dc=x"),
            depth: 1,
            attributes: attrs.clone(),
        };
        assert_eq!(rules.host_name(&host), "web1.example.com");

        attrs.insert("fqdn", AttributeValues::single("web1.internal"));
        host.attributes = attrs;
        assert_eq!(rules.host_name(&host), "web1.internal");
    }

    #[test]
    fn test_wildcard_match() {
        assert!(wildcard_match("*", ""));
        assert!(wildcard_match("web*", "web01"));
        assert!(wildcard_match("*.example.com", "a.example.com"));
        assert!(wildcard_match("a*b*c", "aXXbYYc"));
        assert!(!wildcard_match("a*b*c", "aXXbYY"));
        assert!(!wildcard_match("web", "web01"));
    }

    #[test]
    fn test_include_exclude() {
        let rules = NamingRules {
            include_groups: vec!["web*".into(), "db*".into()],
            exclude_groups: vec!["*_test".into()],
            ..NamingRules::default()
        };
        assert!(rules.keeps_group("web_eu"));
        assert!(!rules.keeps_group("web_test"));
        assert!(!rules.keeps_group("mail"));
        assert!(rules.keeps_host("anything"));
    }
}
