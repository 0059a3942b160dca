//! Object Identifier representation and SNMP lexicographic ordering.
//!
//! The wire form of an OID is a dotted-decimal string (`1.3.6.1.2.1.1.1.0`).
//! Internally every OID is also held as a canonical byte-string whose
//! bytewise ordering agrees with SNMP's numeric lexicographic order: each
//! sub-identifier is encoded as a fixed-width big-endian `u32`, so `...4.9`
//! sorts before `...4.10` and a prefix OID always sorts before any of its
//! own extensions.

use std::cmp::Ordering;
use std::fmt;

use crate::error::{Error, Result};

/// An SNMP Object Identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Oid {
    components: Vec<u32>,
}

impl Oid {
    /// Builds an OID from its numeric components. Does not validate;
    /// use [`Oid::parse`] for untrusted input.
    pub fn new(components: Vec<u32>) -> Self {
        Self { components }
    }

    /// Parses and validates a dotted-decimal OID string.
    ///
    /// Rejects empty strings, leading dots (other than the single leading
    /// dot conventionally used to denote an absolute OID -- see
    /// [`Oid::parse_query`]), empty sub-identifiers (`1..2`), and
    /// non-numeric components.
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(Error::validation("empty OID"));
        }
        let mut components = Vec::new();
        for part in s.split('.') {
            if part.is_empty() {
                return Err(Error::validation(format!(
                    "OID {s:?} has an empty sub-identifier"
                )));
            }
            let value: u32 = part
                .parse()
                .map_err(|_| Error::validation(format!("OID {s:?} has a non-numeric component")))?;
            components.push(value);
        }
        if components.is_empty() {
            return Err(Error::validation(format!("OID {s:?} has no components")));
        }
        Ok(Self { components })
    }

    /// Parses an incoming query OID the way GetNext/GetBulk lookups do:
    /// strips at most one leading `.`, then validates normally.
    ///
    /// Resolves the "leading `.0`" open question from the original source:
    /// at most one leading separator is stripped; an embedded empty
    /// sub-identifier anywhere else in the string is still rejected.
    pub fn parse_query(s: &str) -> Result<Self> {
        let stripped = s.strip_prefix('.').unwrap_or(s);
        Self::parse(stripped)
    }

    pub fn components(&self) -> &[u32] {
        &self.components
    }

    pub fn append(&self, component: u32) -> Self {
        let mut components = self.components.clone();
        components.push(component);
        Self { components }
    }

    pub fn is_child_of(&self, parent: &Oid) -> bool {
        self.components.len() > parent.components.len()
            && self.components[..parent.components.len()] == parent.components[..]
    }

    /// Canonical byte-string encoding: each sub-identifier as a 4-byte
    /// big-endian `u32`. Bytewise comparison of two encodings agrees with
    /// SNMP numeric lexicographic order on the source OIDs.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.components.len() * 4);
        for c in &self.components {
            out.extend_from_slice(&c.to_be_bytes());
        }
        out
    }

    /// Three-way comparison matching SNMP lexicographic OID order.
    pub fn compare(&self, other: &Oid) -> Ordering {
        self.to_bytes().cmp(&other.to_bytes())
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for c in &self.components {
            if !first {
                write!(f, ".")?;
            }
            write!(f, "{c}")?;
            first = false;
        }
        Ok(())
    }
}

impl PartialOrd for Oid {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Oid {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl std::str::FromStr for Oid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Oid::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_displays() {
        let oid = Oid::parse("1.3.6.1.2.1.1.1.0").unwrap();
        assert_eq!(oid.components(), &[1, 3, 6, 1, 2, 1, 1, 1, 0]);
        assert_eq!(oid.to_string(), "1.3.6.1.2.1.1.1.0");
    }

    #[test]
    fn rejects_malformed_oids() {
        assert!(Oid::parse("").is_err());
        assert!(Oid::parse("1..2").is_err());
        assert!(Oid::parse("1.3.a.1").is_err());
        assert!(Oid::parse(".1.3.6.1").is_err());
    }

    #[test]
    fn parse_query_strips_one_leading_dot() {
        let a = Oid::parse_query(".1.3.6.1").unwrap();
        let b = Oid::parse("1.3.6.1").unwrap();
        assert_eq!(a, b);
        assert!(Oid::parse_query("1..3.6.1").is_err());
    }

    #[test]
    fn prefix_orders_before_extension() {
        let a = Oid::parse("1.3.6.1.4").unwrap();
        let b = Oid::parse("1.3.6.1.4.0").unwrap();
        let c = Oid::parse("1.3.6.1.4.1").unwrap();
        let d = Oid::parse("1.3.6.1.5").unwrap();
        assert_eq!(a.compare(&b), Ordering::Less);
        assert_eq!(b.compare(&c), Ordering::Less);
        assert_eq!(c.compare(&d), Ordering::Less);
    }

    #[test]
    fn numeric_not_digit_lexicographic_order() {
        let c = Oid::parse("1.3.6.1.4.9").unwrap();
        let d = Oid::parse("1.3.6.1.4.10").unwrap();
        assert_eq!(c.compare(&d), Ordering::Less);
    }

    #[test]
    fn is_child_of() {
        let parent = Oid::parse("1.3.6.1.2.1.1").unwrap();
        let child = Oid::parse("1.3.6.1.2.1.1.1").unwrap();
        assert!(child.is_child_of(&parent));
        assert!(!parent.is_child_of(&child));
        assert!(!parent.is_child_of(&parent));
    }
}
