//! Search filter builder
//!
//! Provides type-safe construction of RFC 4515 search filters, plus evaluation
//! against an entry for directories that are not backed by a server.

use std::fmt;

use crate::entry::ObservedEntry;

/// Search filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// All sub-filters match
    And(Vec<Filter>),
    /// Any sub-filter matches
    Or(Vec<Filter>),
    /// Sub-filter does not match
    Not(Box<Filter>),
    /// Attribute has a value equal to `value`
    Equals { attribute: String, value: String },
    /// Attribute is present
    Present { attribute: String },
}

impl Filter {
    /// Equality filter
    pub fn equals(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Equals {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Presence filter
    pub fn present(attribute: impl Into<String>) -> Self {
        Filter::Present {
            attribute: attribute.into(),
        }
    }

    /// `(objectClass=*)`, matches every entry
    #[must_use]
    pub fn any_object() -> Self {
        Self::present("objectClass")
    }

    /// Conjunction
    #[must_use]
    pub fn and(filters: Vec<Filter>) -> Self {
        Filter::And(filters)
    }

    /// Disjunction
    #[must_use]
    pub fn or(filters: Vec<Filter>) -> Self {
        Filter::Or(filters)
    }

    /// Negation
    #[must_use]
    pub fn negate(filter: Filter) -> Self {
        Filter::Not(Box::new(filter))
    }

    /// Match any of the given object classes
    #[must_use]
    pub fn object_class_in(classes: &[String]) -> Self {
        match classes {
            [one] => Self::equals("objectClass", one.clone()),
            many => Self::or(
                many.iter()
                    .map(|c| Self::equals("objectClass", c.clone()))
                    .collect(),
            ),
        }
    }

    /// Build the filter string
    #[must_use]
    pub fn build(&self) -> String {
        match self {
            Filter::And(filters) => format!("(&{})", join(filters)),
            Filter::Or(filters) => format!("(|{})", join(filters)),
            Filter::Not(filter) => format!("(!{})", filter.build()),
            Filter::Equals { attribute, value } => {
                format!("({attribute}={})", escape_filter_value(value))
            }
            Filter::Present { attribute } => format!("({attribute}=*)"),
        }
    }

    /// Evaluate against an entry
    ///
    /// Equality uses case-insensitive matching, which is what the common
    /// directory string syntaxes do.
    #[must_use]
    pub fn matches(&self, entry: &ObservedEntry) -> bool {
        match self {
            Filter::And(filters) => filters.iter().all(|f| f.matches(entry)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(entry)),
            Filter::Not(filter) => !filter.matches(entry),
            Filter::Equals { attribute, value } => entry
                .get(attribute)
                .is_some_and(|values| values.iter().any(|v| v.eq_ignore_ascii_case(value))),
            Filter::Present { attribute } => entry
                .get(attribute)
                .is_some_and(|values| !values.is_empty()),
        }
    }
}

fn join(filters: &[Filter]) -> String {
    filters.iter().map(Filter::build).collect()
}

/// Escape special characters in filter values (RFC 4515)
#[must_use]
pub fn escape_filter_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => escaped.push_str("\\5c"),
            '*' => escaped.push_str("\\2a"),
            '(' => escaped.push_str("\\28"),
            ')' => escaped.push_str("\\29"),
            '\0' => escaped.push_str("\\00"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dn::Dn;
    use crate::entry::{AttributeSet, AttributeValues};

    fn host_entry() -> ObservedEntry {
        let attrs: AttributeSet = [
            ("objectClass", AttributeValues::many(["top", "ipaHost"])),
            ("fqdn", AttributeValues::single("web1.example.com")),
        ]
        .into_iter()
        .collect();
        ObservedEntry::new(
            Dn::parse("fqdn=web1.example.com,cn=computers,dc=example,dc=com").unwrap(),
            attrs,
        )
    }

    #[test]
    fn test_filter_builder() {
        let filter = Filter::and(vec![
            Filter::equals("objectClass", "ipaHost"),
            Filter::equals("fqdn", "web1.example.com"),
        ]);

        assert_eq!(filter.build(), "(&(objectClass=ipaHost)(fqdn=web1.example.com))");
    }

    #[test]
    fn test_filter_injection_prevention() {
        let filter = Filter::equals("uid", "*)(uid=*");
        assert_eq!(filter.build(), r"(uid=\2a\29\28uid=\2a)");
    }

    #[test]
    fn test_object_class_in() {
        let single = Filter::object_class_in(&["ipaHostGroup".to_string()]);
        assert_eq!(single.build(), "(objectClass=ipaHostGroup)");

        let many = Filter::object_class_in(&["a".to_string(), "b".to_string()]);
        assert_eq!(many.build(), "(|(objectClass=a)(objectClass=b))");
    }

    #[test]
    fn test_matches() {
        let entry = host_entry();

        assert!(Filter::any_object().matches(&entry));
        assert!(Filter::equals("objectclass", "IPAHOST").matches(&entry));
        assert!(!Filter::equals("fqdn", "web2.example.com").matches(&entry));
        assert!(Filter::negate(Filter::present("macAddress")).matches(&entry));
        assert!(
            Filter::or(vec![Filter::equals("fqdn", "x"), Filter::present("fqdn")]).matches(&entry)
        );
    }
}
