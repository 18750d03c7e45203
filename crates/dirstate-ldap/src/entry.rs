//! Directory entry types

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::dn::Dn;

// ============================================================================
// Attribute Values
// ============================================================================

/// Values of one attribute
///
/// Single-valued attributes hold exactly one value. Multi-valued attributes
/// keep the order they were supplied in, but that order carries no meaning
/// when values are compared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeValues(Vec<String>);

impl AttributeValues {
    /// Create a single value
    pub fn single(value: impl Into<String>) -> Self {
        Self(vec![value.into()])
    }

    /// Create from several values
    pub fn many<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(values.into_iter().map(Into::into).collect())
    }

    /// Explicitly empty value list
    #[must_use]
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// All values in supplied order
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// First value, if any
    #[must_use]
    pub fn first(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over values
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Add a value unless an identical one is present
    pub fn push_unique(&mut self, value: impl Into<String>) {
        let value = value.into();
        if !self.0.contains(&value) {
            self.0.push(value);
        }
    }

    /// Remove all values equal to `value`, returns true if any were removed
    pub fn remove(&mut self, value: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|v| v != value);
        before != self.0.len()
    }

    /// Consume into the underlying vector
    #[must_use]
    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl From<&str> for AttributeValues {
    fn from(value: &str) -> Self {
        Self::single(value)
    }
}

impl From<String> for AttributeValues {
    fn from(value: String) -> Self {
        Self::single(value)
    }
}

impl From<Vec<String>> for AttributeValues {
    fn from(values: Vec<String>) -> Self {
        Self(values)
    }
}

impl Serialize for AttributeValues {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0.as_slice() {
            [one] => serializer.serialize_str(one),
            many => many.serialize(serializer),
        }
    }
}

/// Scalar accepted in declarative input
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Integer(i64),
    Float(f64),
    Flag(bool),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Scalar::Text(s) => s,
            Scalar::Integer(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
            // Directory boolean syntax
            Scalar::Flag(b) => if b { "TRUE" } else { "FALSE" }.to_string(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(Scalar),
    Many(Vec<Scalar>),
}

impl<'de> Deserialize<'de> for AttributeValues {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match OneOrMany::deserialize(deserializer)? {
            OneOrMany::One(s) => Self(vec![s.into_string()]),
            OneOrMany::Many(list) => Self(list.into_iter().map(Scalar::into_string).collect()),
        })
    }
}

// ============================================================================
// Attribute Set
// ============================================================================

/// Mapping from attribute name to values
///
/// Names are matched case-insensitively. Insertion order is preserved so that
/// anything derived from a set (such as a modification plan) is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeSet {
    entries: Vec<(String, AttributeValues)>,
}

impl AttributeSet {
    /// Create an empty set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// Insert or replace an attribute, keeping its original position when replacing
    pub fn insert(&mut self, name: impl Into<String>, values: impl Into<AttributeValues>) {
        let name = name.into();
        let values = values.into();
        match self.position(&name) {
            Some(idx) => self.entries[idx].1 = values,
            None => self.entries.push((name, values)),
        }
    }

    /// Look up an attribute by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AttributeValues> {
        self.position(name).map(|idx| &self.entries[idx].1)
    }

    /// Mutable lookup
    pub fn get_mut(&mut self, name: &str) -> Option<&mut AttributeValues> {
        self.position(name).map(|idx| &mut self.entries[idx].1)
    }

    /// Remove an attribute, returning its values
    pub fn remove(&mut self, name: &str) -> Option<AttributeValues> {
        self.position(name).map(|idx| self.entries.remove(idx).1)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Iterate in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValues)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Attribute names in insertion order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for AttributeSet
where
    K: Into<String>,
    V: Into<AttributeValues>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (name, values) in iter {
            set.insert(name, values);
        }
        set
    }
}

impl Serialize for AttributeSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, values) in &self.entries {
            map.serialize_entry(name, values)?;
        }
        map.end()
    }
}

struct AttributeSetVisitor;

impl<'de> Visitor<'de> for AttributeSetVisitor {
    type Value = AttributeSet;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of attribute names to a value or list of values")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut set = AttributeSet::new();
        while let Some((name, values)) = access.next_entry::<String, AttributeValues>()? {
            set.insert(name, values);
        }
        Ok(set)
    }
}

impl<'de> Deserialize<'de> for AttributeSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(AttributeSetVisitor)
    }
}

// ============================================================================
// Entries and Modifications
// ============================================================================

/// Entry as currently read from the directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedEntry {
    /// Entry DN
    pub dn: Dn,
    /// All attributes returned by the read, including `objectClass`
    pub attributes: AttributeSet,
}

impl ObservedEntry {
    /// Create a new observed entry
    #[must_use]
    pub fn new(dn: Dn, attributes: AttributeSet) -> Self {
        Self { dn, attributes }
    }

    /// Values of `objectClass`
    pub fn object_classes(&self) -> impl Iterator<Item = &str> {
        self.attributes
            .get("objectClass")
            .into_iter()
            .flat_map(AttributeValues::iter)
    }

    /// Check for an object class, ignoring case
    #[must_use]
    pub fn has_object_class(&self, class: &str) -> bool {
        self.object_classes().any(|c| c.eq_ignore_ascii_case(class))
    }

    /// Look up an attribute
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AttributeValues> {
        self.attributes.get(name)
    }
}

/// A single attribute change within a modify request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Modification {
    /// Add values to an attribute (creating it if absent)
    Add {
        attribute: String,
        values: AttributeValues,
    },
    /// Replace all values of an attribute
    Replace {
        attribute: String,
        values: AttributeValues,
    },
    /// Delete values; an empty value list deletes the whole attribute
    Delete {
        attribute: String,
        values: AttributeValues,
    },
}

impl Modification {
    /// Attribute the modification applies to
    #[must_use]
    pub fn attribute(&self) -> &str {
        match self {
            Modification::Add { attribute, .. }
            | Modification::Replace { attribute, .. }
            | Modification::Delete { attribute, .. } => attribute,
        }
    }

    /// Values carried by the modification
    #[must_use]
    pub fn values(&self) -> &AttributeValues {
        match self {
            Modification::Add { values, .. }
            | Modification::Replace { values, .. }
            | Modification::Delete { values, .. } => values,
        }
    }
}

impl fmt::Display for Modification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (op, attribute, values) = match self {
            Modification::Add { attribute, values } => ("add", attribute, values),
            Modification::Replace { attribute, values } => ("replace", attribute, values),
            Modification::Delete { attribute, values } => ("delete", attribute, values),
        };
        write!(f, "{op} {attribute}")?;
        if !values.is_empty() {
            write!(f, ": {}", values.as_slice().join(", "))?;
        }
        Ok(())
    }
}

/// Search scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Only the base entry itself
    Base,
    /// Immediate children of the base
    OneLevel,
    /// Base and everything below it
    Subtree,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_set_case_insensitive_lookup() {
        let mut attrs = AttributeSet::new();
        attrs.insert("givenName", "Guest");

        assert_eq!(attrs.get("givenname").and_then(|v| v.first()), Some("Guest"));
        assert!(attrs.contains("GIVENNAME"));
    }

    #[test]
    fn test_attribute_set_replace_keeps_position() {
        let mut attrs = AttributeSet::new();
        attrs.insert("uid", "guest");
        attrs.insert("sn", "User");
        attrs.insert("UID", "visitor");

        let names: Vec<&str> = attrs.names().collect();
        assert_eq!(names, vec!["uid", "sn"]);
        assert_eq!(attrs.get("uid").and_then(|v| v.first()), Some("visitor"));
    }

    #[test]
    fn test_deserialize_scalar_and_list() {
        let attrs: AttributeSet = serde_json::from_str(
            r#"{"uid": "guest", "mail": ["a@example.com", "b@example.com"], "uidNumber": 1000, "active": true}"#,
        )
        .unwrap();

        assert_eq!(attrs.get("uid").unwrap().as_slice(), ["guest"]);
        assert_eq!(attrs.get("mail").unwrap().len(), 2);
        assert_eq!(attrs.get("uidNumber").unwrap().first(), Some("1000"));
        assert_eq!(attrs.get("active").unwrap().first(), Some("TRUE"));
    }

    #[test]
    fn test_deserialize_preserves_order_from_toml() {
        let attrs: AttributeSet = toml::from_str(
            r#"
            uid = "guest"
            sn = "User"
            cn = "Guest User"
            "#,
        )
        .unwrap();

        let names: Vec<&str> = attrs.names().collect();
        assert_eq!(names, vec!["uid", "sn", "cn"]);
    }

    #[test]
    fn test_serialize_single_value_as_string() {
        let attrs: AttributeSet = [
            ("uid", AttributeValues::single("guest")),
            ("mail", AttributeValues::many(["a", "b"])),
        ]
        .into_iter()
        .collect();

        let json = serde_json::to_string(&attrs).unwrap();
        assert_eq!(json, r#"{"uid":"guest","mail":["a","b"]}"#);
    }

    #[test]
    fn test_observed_entry_object_classes() {
        let dn = Dn::parse("uid=guest,dc=example").unwrap();
        let attrs: AttributeSet = [("objectClass", AttributeValues::many(["top", "inetOrgPerson"]))]
            .into_iter()
            .collect();
        let entry = ObservedEntry::new(dn, attrs);

        assert!(entry.has_object_class("inetorgperson"));
        assert!(!entry.has_object_class("posixAccount"));
    }

    #[test]
    fn test_modification_display() {
        let m = Modification::Replace {
            attribute: "sn".to_string(),
            values: AttributeValues::single("User"),
        };
        assert_eq!(m.to_string(), "replace sn: User");
    }
}
