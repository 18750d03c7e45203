//! Distinguished names
//!
//! A `Dn` keeps two renderings of the same name: a display form with
//! insignificant whitespace removed and values re-escaped per RFC 4514, and a
//! normalized key (lowercased attribute types, case-folded values) that is the
//! only thing used for equality, hashing and ordering.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::entry::AttributeSet;
use crate::error::ConfigurationError;

/// One relative distinguished name component (`attr=value`)
#[derive(Debug, Clone)]
struct Rdn {
    attr: String,
    /// Unescaped value
    value: String,
    /// Normalized `attr=value` used for comparisons
    key: String,
}

impl Rdn {
    fn new(attr: &str, value: &str) -> Self {
        let key = format!(
            "{}={}",
            attr.to_ascii_lowercase(),
            escape_value(&fold_value(value))
        );
        Self {
            attr: attr.to_string(),
            value: value.to_string(),
            key,
        }
    }

    fn render(&self) -> String {
        format!("{}={}", self.attr, escape_value(&self.value))
    }
}

/// Distinguished name of a directory entry
#[derive(Debug, Clone)]
pub struct Dn {
    rdns: Vec<Rdn>,
    display: String,
    key: String,
}

impl Dn {
    /// Parse a DN string
    ///
    /// # Errors
    /// Returns `ConfigurationError::MalformedDn` for empty components, components
    /// without `=`, empty attribute types or values, dangling escapes, and
    /// multi-valued RDNs (`cn=a+uid=b`), which are not supported.
    pub fn parse(input: &str) -> Result<Self, ConfigurationError> {
        if input.trim().is_empty() {
            return Err(ConfigurationError::malformed(input, "empty DN"));
        }

        let rdns = split_components(input)?
            .into_iter()
            .map(|component| parse_rdn(component, input))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::from_rdns(rdns))
    }

    fn from_rdns(rdns: Vec<Rdn>) -> Self {
        let display = rdns.iter().map(Rdn::render).collect::<Vec<_>>().join(",");
        let key = rdns
            .iter()
            .map(|r| r.key.as_str())
            .collect::<Vec<_>>()
            .join(",");
        Self { rdns, display, key }
    }

    /// Expand a DN template such as `uid={uid},ou=People,dc=example,dc=com`
    ///
    /// Placeholders take the first value of the named attribute (looked up
    /// case-insensitively) and are escaped before the result is parsed.
    /// `{{` and `}}` produce literal braces.
    ///
    /// # Errors
    /// Returns `MissingTemplateAttribute` when a placeholder names an attribute
    /// without values, or `MalformedDn` if the expanded string does not parse.
    pub fn from_template(
        template: &str,
        attributes: &AttributeSet,
    ) -> Result<Self, ConfigurationError> {
        let mut expanded = String::with_capacity(template.len());
        let mut chars = template.chars().peekable();

        while let Some(ch) = chars.next() {
            match ch {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    expanded.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    expanded.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        name.push(c);
                    }
                    if !closed {
                        return Err(ConfigurationError::malformed(
                            template,
                            "unterminated placeholder",
                        ));
                    }
                    let value = attributes
                        .get(name.trim())
                        .and_then(|v| v.first())
                        .ok_or_else(|| ConfigurationError::MissingTemplateAttribute {
                            template: template.to_string(),
                            attribute: name.trim().to_string(),
                        })?;
                    expanded.push_str(&escape_value(value));
                }
                _ => expanded.push(ch),
            }
        }

        Self::parse(&expanded)
    }

    /// Display form of the DN
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.display
    }

    /// Normalized comparison key
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Attribute type of the leading RDN (`fqdn` in `fqdn=a.example.com,...`)
    #[must_use]
    pub fn rdn_attr(&self) -> &str {
        &self.rdns[0].attr
    }

    /// Unescaped value of the leading RDN
    #[must_use]
    pub fn rdn_value(&self) -> &str {
        &self.rdns[0].value
    }

    /// Number of RDN components
    #[must_use]
    pub fn depth(&self) -> usize {
        self.rdns.len()
    }

    /// Parent DN, or `None` for a single-component DN
    #[must_use]
    pub fn parent(&self) -> Option<Dn> {
        if self.rdns.len() < 2 {
            return None;
        }
        Some(Self::from_rdns(self.rdns[1..].to_vec()))
    }

    /// Build a child DN `attr=value,<self>`
    #[must_use]
    pub fn child(&self, attr: &str, value: &str) -> Dn {
        let mut rdns = Vec::with_capacity(self.rdns.len() + 1);
        rdns.push(Rdn::new(attr, value));
        rdns.extend(self.rdns.iter().cloned());
        Self::from_rdns(rdns)
    }

    /// Check if this DN sits strictly below `base`
    #[must_use]
    pub fn is_descendant_of(&self, base: &Dn) -> bool {
        let offset = match self.rdns.len().checked_sub(base.rdns.len()) {
            Some(0) | None => return false,
            Some(n) => n,
        };
        self.rdns[offset..]
            .iter()
            .zip(&base.rdns)
            .all(|(a, b)| a.key == b.key)
    }

    /// Check if this DN is an immediate child of `base`
    #[must_use]
    pub fn is_child_of(&self, base: &Dn) -> bool {
        self.rdns.len() == base.rdns.len() + 1 && self.is_descendant_of(base)
    }
}

impl PartialEq for Dn {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Dn {}

impl Hash for Dn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl PartialOrd for Dn {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Dn {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

impl FromStr for Dn {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Dn {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.display)
    }
}

impl<'de> Deserialize<'de> for Dn {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Dn::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Escape a DN attribute value per RFC 4514
#[must_use]
pub fn escape_value(value: &str) -> String {
    let count = value.chars().count();
    let mut result = String::with_capacity(value.len() + 4);

    for (i, ch) in value.chars().enumerate() {
        let is_first = i == 0;
        let is_last = i + 1 == count;

        match ch {
            ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=' => {
                result.push('\\');
                result.push(ch);
            }
            '\0' => result.push_str("\\00"),
            ' ' if is_first || is_last => result.push_str("\\20"),
            '#' if is_first => result.push_str("\\23"),
            _ => result.push(ch),
        }
    }

    result
}

/// Case-fold a value and collapse runs of whitespace
fn fold_value(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Split on unescaped commas
fn split_components(input: &str) -> Result<Vec<&str>, ConfigurationError> {
    let mut components = Vec::new();
    let mut start = 0;
    let mut escaped = false;

    for (idx, ch) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            ',' => {
                components.push(&input[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }

    if escaped {
        return Err(ConfigurationError::malformed(input, "dangling escape"));
    }
    components.push(&input[start..]);

    Ok(components)
}

fn parse_rdn(component: &str, full: &str) -> Result<Rdn, ConfigurationError> {
    let (attr, raw_value) = component
        .split_once('=')
        .ok_or_else(|| ConfigurationError::malformed(full, format!("'{component}' has no '='")))?;

    let attr = attr.trim();
    if attr.is_empty() {
        return Err(ConfigurationError::malformed(full, "empty attribute type"));
    }
    if !attr
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
    {
        return Err(ConfigurationError::malformed(
            full,
            format!("invalid attribute type '{attr}'"),
        ));
    }

    if has_unescaped(raw_value, '+') {
        return Err(ConfigurationError::malformed(
            full,
            format!("multi-valued RDN '{}' is not supported", component.trim()),
        ));
    }

    // Unescaped surrounding spaces are insignificant; an escaped trailing
    // space must survive the trim.
    let mut raw = raw_value.trim_start().trim_end().to_string();
    let trailing_backslashes = raw.chars().rev().take_while(|c| *c == '\\').count();
    if trailing_backslashes % 2 == 1 && raw_value.trim_start().len() > raw.len() {
        raw.push(' ');
    }

    let value = unescape(&raw).map_err(|reason| ConfigurationError::malformed(full, reason))?;
    if value.is_empty() {
        return Err(ConfigurationError::malformed(
            full,
            format!("empty value for '{attr}'"),
        ));
    }

    Ok(Rdn::new(attr, &value))
}

fn has_unescaped(raw: &str, needle: char) -> bool {
    let mut escaped = false;
    for ch in raw.chars() {
        match ch {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            c if c == needle => return true,
            _ => {}
        }
    }
    false
}

fn unescape(raw: &str) -> Result<String, String> {
    let mut bytes = Vec::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            continue;
        }

        let first = chars.next().ok_or_else(|| "dangling escape".to_string())?;
        let hex_pair = first
            .to_digit(16)
            .zip(chars.peek().and_then(|c| c.to_digit(16)));
        match hex_pair {
            Some((hi, lo)) => {
                chars.next();
                #[allow(clippy::cast_possible_truncation)]
                let byte = (hi * 16 + lo) as u8;
                bytes.push(byte);
            }
            None => {
                let mut buf = [0u8; 4];
                bytes.extend_from_slice(first.encode_utf8(&mut buf).as_bytes());
            }
        }
    }

    String::from_utf8(bytes).map_err(|_| "escape sequence is not valid UTF-8".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::AttributeValues;

    #[test]
    fn test_parse_normalizes_whitespace_and_case() {
        let a = Dn::parse("uid=guest, ou=People ,dc=example,dc=com").unwrap();
        let b = Dn::parse("UID=Guest,OU=people,DC=Example,DC=COM").unwrap();

        assert_eq!(a, b);
        assert_eq!(a.as_str(), "uid=guest,ou=People,dc=example,dc=com");
        assert_eq!(a.key(), "uid=guest,ou=people,dc=example,dc=com");
    }

    #[test]
    fn test_multi_valued_rdn_is_rejected() {
        let err = Dn::parse("cn=a+uid=b,dc=example,dc=com").unwrap_err();
        assert!(matches!(err, ConfigurationError::MalformedDn { .. }));

        let dn = Dn::parse(r"cn=a\+b,dc=example,dc=com").unwrap();
        assert_eq!(dn.rdn_value(), "a+b");
        assert_eq!(dn.as_str(), r"cn=a\+b,dc=example,dc=com");
    }

    #[test]
    fn test_parse_escaped_comma() {
        let dn = Dn::parse(r"cn=Doe\, John,ou=People,dc=example,dc=com").unwrap();

        assert_eq!(dn.depth(), 4);
        assert_eq!(dn.rdn_value(), "Doe, John");
        assert_eq!(dn.as_str(), r"cn=Doe\, John,ou=People,dc=example,dc=com");
    }

    #[test]
    fn test_parse_hex_escape() {
        let dn = Dn::parse(r"cn=Doe\2C John,dc=example").unwrap();
        assert_eq!(dn.rdn_value(), "Doe, John");
        assert_eq!(dn, Dn::parse(r"cn=Doe\, John,dc=example").unwrap());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(Dn::parse("").is_err());
        assert!(Dn::parse("uid=guest,,dc=com").is_err());
        assert!(Dn::parse("guest,dc=com").is_err());
        assert!(Dn::parse("uid=,dc=com").is_err());
        assert!(Dn::parse(r"uid=guest\").is_err());
    }

    #[test]
    fn test_escaped_trailing_space_is_kept() {
        let dn = Dn::parse(r"cn=trailing\ ,dc=example").unwrap();
        assert_eq!(dn.rdn_value(), "trailing ");
    }

    #[test]
    fn test_descendant_checks() {
        let base = Dn::parse("cn=hostgroups,cn=accounts,dc=example,dc=com").unwrap();
        let group = Dn::parse("cn=web,cn=hostgroups,cn=accounts,dc=example,dc=com").unwrap();
        let other = Dn::parse("cn=web,cn=groups,cn=accounts,dc=example,dc=com").unwrap();

        assert!(group.is_descendant_of(&base));
        assert!(group.is_child_of(&base));
        assert!(!base.is_descendant_of(&base));
        assert!(!other.is_descendant_of(&base));
        assert_eq!(group.parent().unwrap(), base);
    }

    #[test]
    fn test_child() {
        let base = Dn::parse("cn=computers,dc=example,dc=com").unwrap();
        let host = base.child("fqdn", "web1.example.com");

        assert_eq!(host.as_str(), "fqdn=web1.example.com,cn=computers,dc=example,dc=com");
        assert_eq!(host.rdn_attr(), "fqdn");
    }

    #[test]
    fn test_template_expansion() {
        let mut attrs = AttributeSet::new();
        attrs.insert("uid", AttributeValues::single("guest"));
        attrs.insert("cn", AttributeValues::single("Doe, John"));

        let dn = Dn::from_template("uid={uid},ou=People,dc=example,dc=com", &attrs).unwrap();
        assert_eq!(dn.as_str(), "uid=guest,ou=People,dc=example,dc=com");

        let dn = Dn::from_template("cn={CN},dc=example", &attrs).unwrap();
        assert_eq!(dn.rdn_value(), "Doe, John");
    }

    #[test]
    fn test_template_missing_attribute() {
        let attrs = AttributeSet::new();
        let err = Dn::from_template("uid={uid},dc=example", &attrs).unwrap_err();

        assert!(matches!(
            err,
            ConfigurationError::MissingTemplateAttribute { ref attribute, .. } if attribute == "uid"
        ));
    }

    #[test]
    fn test_escape_value() {
        assert_eq!(escape_value("a,b"), r"a\,b");
        assert_eq!(escape_value(" lead"), r"\20lead");
        assert_eq!(escape_value("#tag"), r"\23tag");
        assert_eq!(escape_value("tail "), r"tail\20");
        assert_eq!(escape_value("plain"), "plain");
    }

    #[test]
    fn test_serde_roundtrip_uses_display_form() {
        let dn: Dn = serde_json::from_str("\"uid=guest, dc=example\"").unwrap();
        assert_eq!(serde_json::to_string(&dn).unwrap(), "\"uid=guest,dc=example\"");
    }
}
