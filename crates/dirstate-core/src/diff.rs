//! Attribute diff engine
//!
//! Computes the minimal change plan that brings an observed entry to the
//! desired state. Attributes the caller does not name are never touched.

use std::collections::HashSet;
use std::fmt;

use dirstate_ldap::{AttributeSet, AttributeValues, Dn, Modification, ObservedEntry};

use crate::config::DesiredEntry;

/// Decides when two attribute values are the same
#[derive(Debug, Clone)]
pub struct AttributeComparator {
    dn_valued: HashSet<String>,
}

impl AttributeComparator {
    /// Attributes compared as DNs unless configured otherwise
    pub const DEFAULT_DN_ATTRIBUTES: &'static [&'static str] = &[
        "member",
        "memberOf",
        "uniqueMember",
        "manager",
        "owner",
        "seeAlso",
        "secretary",
    ];

    /// Create a comparator treating the given attributes as DN-valued
    pub fn new<'a>(dn_attributes: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            dn_valued: dn_attributes
                .into_iter()
                .map(str::to_ascii_lowercase)
                .collect(),
        }
    }

    /// Check whether an attribute holds DNs
    #[must_use]
    pub fn is_dn_valued(&self, attribute: &str) -> bool {
        self.dn_valued.contains(&attribute.to_ascii_lowercase())
    }

    /// Comparison form of one value
    fn normalize(&self, attribute: &str, value: &str) -> String {
        if attribute.eq_ignore_ascii_case("objectClass") {
            value.to_ascii_lowercase()
        } else if self.is_dn_valued(attribute) {
            // Unparseable values fall back to byte comparison
            Dn::parse(value).map_or_else(|_| value.to_string(), |dn| dn.key().to_string())
        } else {
            value.to_string()
        }
    }

    /// Compare two value lists as sets
    #[must_use]
    pub fn same_values(
        &self,
        attribute: &str,
        left: &AttributeValues,
        right: &AttributeValues,
    ) -> bool {
        let set = |values: &AttributeValues| -> HashSet<String> {
            values.iter().map(|v| self.normalize(attribute, v)).collect()
        };
        set(left) == set(right)
    }
}

impl Default for AttributeComparator {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DN_ATTRIBUTES.iter().copied())
    }
}

// ============================================================================
// Plan
// ============================================================================

/// Change plan for one entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffPlan {
    /// Entry does not exist; add it
    Create {
        object_classes: Vec<String>,
        attributes: AttributeSet,
    },
    /// Entry exists; apply these modifications in one request
    Modify(Vec<Modification>),
}

impl DiffPlan {
    /// Check whether the plan changes nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, DiffPlan::Modify(mods) if mods.is_empty())
    }

    /// Check whether the plan creates the entry
    #[must_use]
    pub fn is_create(&self) -> bool {
        matches!(self, DiffPlan::Create { .. })
    }

    /// One line per change
    #[must_use]
    pub fn describe(&self) -> Vec<String> {
        match self {
            DiffPlan::Create {
                object_classes,
                attributes,
            } => {
                let mut lines = vec![format!("add objectClass: {}", object_classes.join(", "))];
                lines.extend(
                    attributes
                        .iter()
                        .map(|(name, values)| format!("add {name}: {}", values.as_slice().join(", "))),
                );
                lines
            }
            DiffPlan::Modify(mods) => mods.iter().map(ToString::to_string).collect(),
        }
    }
}

impl fmt::Display for DiffPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiffPlan::Create { .. } => write!(f, "create")?,
            DiffPlan::Modify(mods) if mods.is_empty() => return write!(f, "no changes"),
            DiffPlan::Modify(_) => write!(f, "modify")?,
        }
        for line in self.describe() {
            write!(f, "\n  {line}")?;
        }
        Ok(())
    }
}

/// Compute the plan that converges `observed` to `desired`
///
/// Identical inputs always produce identical plans: modifications follow the
/// declared attribute order, with any missing object classes added first.
#[must_use]
pub fn compute_diff(
    desired: &DesiredEntry,
    observed: Option<&ObservedEntry>,
    comparator: &AttributeComparator,
) -> DiffPlan {
    let Some(observed) = observed else {
        let attributes = desired
            .attributes
            .iter()
            .filter(|(name, values)| !values.is_empty() && !name.eq_ignore_ascii_case("objectClass"))
            .map(|(name, values)| (name.to_string(), values.clone()))
            .collect();
        return DiffPlan::Create {
            object_classes: desired.object_classes.clone(),
            attributes,
        };
    };

    let mut mods = Vec::new();

    let mut missing: Vec<String> = Vec::new();
    for class in &desired.object_classes {
        let present = observed.has_object_class(class)
            || missing.iter().any(|m| m.eq_ignore_ascii_case(class));
        if !present {
            missing.push(class.clone());
        }
    }
    if !missing.is_empty() {
        mods.push(Modification::Add {
            attribute: "objectClass".to_string(),
            values: AttributeValues::from(missing),
        });
    }

    for (name, wanted) in desired.attributes.iter() {
        if name.eq_ignore_ascii_case("objectClass") {
            continue;
        }
        let current = observed.get(name).filter(|values| !values.is_empty());
        match current {
            None if wanted.is_empty() => {}
            None => mods.push(Modification::Add {
                attribute: name.to_string(),
                values: wanted.clone(),
            }),
            Some(_) if wanted.is_empty() => mods.push(Modification::Delete {
                attribute: name.to_string(),
                values: AttributeValues::empty(),
            }),
            Some(current) if comparator.same_values(name, wanted, current) => {}
            Some(_) => mods.push(Modification::Replace {
                attribute: name.to_string(),
                values: wanted.clone(),
            }),
        }
    }

    DiffPlan::Modify(mods)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dn(s: &str) -> Dn {
        Dn::parse(s).unwrap()
    }

    fn desired(attrs: &[(&str, &[&str])]) -> DesiredEntry {
        DesiredEntry::new(
            dn("uid=guest,ou=People,dc=example,dc=com"),
            vec!["inetOrgPerson".to_string()],
            attrs
                .iter()
                .map(|(n, v)| (*n, AttributeValues::many(v.iter().copied())))
                .collect(),
        )
    }

    fn observed(attrs: &[(&str, &[&str])]) -> ObservedEntry {
        ObservedEntry::new(
            dn("uid=guest,ou=People,dc=example,dc=com"),
            attrs
                .iter()
                .map(|(n, v)| (*n, AttributeValues::many(v.iter().copied())))
                .collect(),
        )
    }

    #[test]
    fn test_absent_entry_is_created() {
        let want = desired(&[("uid", &["guest"]), ("sn", &["User"]), ("mail", &[])]);
        let plan = compute_diff(&want, None, &AttributeComparator::default());

        let DiffPlan::Create {
            object_classes,
            attributes,
        } = plan
        else {
            panic!("expected create");
        };
        assert_eq!(object_classes, vec!["inetOrgPerson"]);
        assert_eq!(attributes.names().collect::<Vec<_>>(), vec!["uid", "sn"]);
    }

    #[test]
    fn test_equal_sets_in_any_order_produce_nothing() {
        let want = desired(&[("mail", &["a@x", "b@x"])]);
        let have = observed(&[
            ("objectClass", &["top", "INETORGPERSON"]),
            ("mail", &["b@x", "a@x"]),
        ]);
        let plan = compute_diff(&want, Some(&have), &AttributeComparator::default());
        assert!(plan.is_empty());
    }

    #[test]
    fn test_add_replace_and_superset() {
        let want = desired(&[("sn", &["User"]), ("cn", &["Guest User"])]);
        let have = observed(&[
            ("objectClass", &["top", "person"]),
            ("sn", &["Old"]),
            ("description", &["kept"]),
        ]);
        let plan = compute_diff(&want, Some(&have), &AttributeComparator::default());

        assert_eq!(
            plan,
            DiffPlan::Modify(vec![
                Modification::Add {
                    attribute: "objectClass".into(),
                    values: AttributeValues::single("inetOrgPerson"),
                },
                Modification::Replace {
                    attribute: "sn".into(),
                    values: AttributeValues::single("User"),
                },
                Modification::Add {
                    attribute: "cn".into(),
                    values: AttributeValues::single("Guest User"),
                },
            ])
        );
    }

    #[test]
    fn test_empty_desired_values_delete_only_when_present() {
        let want = desired(&[("mail", &[]), ("l", &[])]);
        let have = observed(&[("objectClass", &["inetOrgPerson"]), ("mail", &["a@x"])]);
        let plan = compute_diff(&want, Some(&have), &AttributeComparator::default());

        assert_eq!(
            plan,
            DiffPlan::Modify(vec![Modification::Delete {
                attribute: "mail".into(),
                values: AttributeValues::empty(),
            }])
        );
    }

    #[test]
    fn test_dn_valued_attributes_compare_normalized() {
        let want = desired(&[("member", &["uid=a, ou=People, dc=example, dc=com"])]);
        let have = observed(&[
            ("objectClass", &["inetOrgPerson"]),
            ("member", &["UID=A,OU=people,DC=Example,DC=com"]),
        ]);
        let plan = compute_diff(&want, Some(&have), &AttributeComparator::default());
        assert!(plan.is_empty());

        let strict = AttributeComparator::new([]);
        let plan = compute_diff(&want, Some(&have), &strict);
        assert!(!plan.is_empty());
    }

    #[test]
    fn test_plan_is_deterministic() {
        let want = desired(&[("b", &["1"]), ("a", &["2"]), ("c", &["3"])]);
        let have = observed(&[("objectClass", &["inetOrgPerson"])]);
        let comparator = AttributeComparator::default();

        let first = compute_diff(&want, Some(&have), &comparator);
        let second = compute_diff(&want, Some(&have), &comparator);
        assert_eq!(first, second);
        assert_eq!(
            first.describe(),
            vec!["add b: 1", "add a: 2", "add c: 3"]
        );
    }
}
