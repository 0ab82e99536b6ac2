//! Migration versions and their total order.
//!
//! A version is a sequence of elements split on `.`, `-` or `_`. Numeric
//! elements compare as arbitrary-precision integers, text elements compare
//! lexically. Missing trailing elements count as numeric zero, so `1`, `1.0`
//! and `1.0.0` are the same version.

use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid version '{input}': {reason}")]
pub struct VersionParseError {
    pub input: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Element {
    /// Digits with leading zeros stripped ("0" for zero)
    Numeric(String),
    Text(String),
}

impl Element {
    fn zero() -> Self {
        Element::Numeric("0".to_string())
    }

    fn is_zero(&self) -> bool {
        matches!(self, Element::Numeric(n) if n == "0")
    }

    fn compare(&self, other: &Element) -> Ordering {
        match (self, other) {
            (Element::Numeric(a), Element::Numeric(b)) => {
                a.len().cmp(&b.len()).then_with(|| a.cmp(b))
            }
            (Element::Text(a), Element::Text(b)) => a.cmp(b),
            (Element::Numeric(_), Element::Text(_)) => Ordering::Less,
            (Element::Text(_), Element::Numeric(_)) => Ordering::Greater,
        }
    }
}

#[derive(Debug, Clone)]
enum Repr {
    Empty,
    Latest,
    Real { display: String, elements: Vec<Element> },
}

#[derive(Debug, Clone)]
pub struct MigrationVersion(Repr);

impl MigrationVersion {
    /// Sorts before every real version.
    pub const EMPTY: MigrationVersion = MigrationVersion(Repr::Empty);
    /// Sorts after every real version.
    pub const LATEST: MigrationVersion = MigrationVersion(Repr::Latest);

    pub fn parse(input: &str) -> Result<Self, VersionParseError> {
        let trimmed = input.trim();
        let err = |reason: &str| VersionParseError {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        if trimmed.is_empty() {
            return Err(err("version is empty"));
        }
        if trimmed.eq_ignore_ascii_case("latest") {
            return Ok(Self::LATEST);
        }

        let display = trimmed.replace('_', ".");
        let mut elements = Vec::new();
        for part in display.split(['.', '-']) {
            if part.is_empty() {
                return Err(err("contains an empty element"));
            }
            if part.chars().all(|c| c.is_ascii_digit()) {
                let stripped = part.trim_start_matches('0');
                elements.push(Element::Numeric(if stripped.is_empty() {
                    "0".to_string()
                } else {
                    stripped.to_string()
                }));
            } else if part.chars().all(|c| c.is_ascii_alphanumeric()) {
                elements.push(Element::Text(part.to_string()));
            } else {
                return Err(err("elements may only contain letters and digits"));
            }
        }

        Ok(MigrationVersion(Repr::Real { display, elements }))
    }

    pub fn is_empty_sentinel(&self) -> bool {
        matches!(self.0, Repr::Empty)
    }

    pub fn is_latest(&self) -> bool {
        matches!(self.0, Repr::Latest)
    }

    /// Elements with trailing zeros removed; equal versions share this form.
    fn normalized(&self) -> &[Element] {
        match &self.0 {
            Repr::Real { elements, .. } => {
                let mut end = elements.len();
                while end > 0 && elements[end - 1].is_zero() {
                    end -= 1;
                }
                &elements[..end]
            }
            _ => &[],
        }
    }
}

impl Ord for MigrationVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        match (&self.0, &other.0) {
            (Repr::Empty, Repr::Empty) | (Repr::Latest, Repr::Latest) => Ordering::Equal,
            (Repr::Empty, _) | (_, Repr::Latest) => Ordering::Less,
            (_, Repr::Empty) | (Repr::Latest, _) => Ordering::Greater,
            (Repr::Real { elements: a, .. }, Repr::Real { elements: b, .. }) => {
                let zero = Element::zero();
                for i in 0..a.len().max(b.len()) {
                    let left = a.get(i).unwrap_or(&zero);
                    let right = b.get(i).unwrap_or(&zero);
                    match left.compare(right) {
                        Ordering::Equal => continue,
                        unequal => return unequal,
                    }
                }
                Ordering::Equal
            }
        }
    }
}

impl PartialOrd for MigrationVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for MigrationVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MigrationVersion {}

impl Hash for MigrationVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.0 {
            Repr::Empty => 0u8.hash(state),
            Repr::Latest => 1u8.hash(state),
            Repr::Real { .. } => {
                2u8.hash(state);
                self.normalized().hash(state);
            }
        }
    }
}

impl fmt::Display for MigrationVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Repr::Empty => write!(f, "<< Empty Schema >>"),
            Repr::Latest => write!(f, "<< Latest Version >>"),
            Repr::Real { display, .. } => write!(f, "{}", display),
        }
    }
}

impl FromStr for MigrationVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MigrationVersion::parse(s)
    }
}

impl Serialize for MigrationVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashSet;

    fn v(s: &str) -> MigrationVersion {
        MigrationVersion::parse(s).unwrap()
    }

    #[rstest]
    #[case("1", "1.0")]
    #[case("1", "1.0.0")]
    #[case("1.0", "1.0.0")]
    #[case("1_1", "1.1")]
    #[case("01.002", "1.2")]
    #[case("2-1", "2.1")]
    fn test_equal_versions(#[case] a: &str, #[case] b: &str) {
        assert_eq!(v(a), v(b));
        assert_eq!(v(a).cmp(&v(b)), Ordering::Equal);
    }

    #[rstest]
    #[case("1.1", "1.1.0.1")]
    #[case("9", "10")]
    #[case("1.9", "1.10")]
    #[case("1", "2")]
    #[case("1.0.1", "1.1")]
    #[case("99999999999999999999", "100000000000000000000")]
    #[case("1.a", "1.b")]
    #[case("1.5", "1.a")]
    fn test_ordering(#[case] lower: &str, #[case] higher: &str) {
        assert!(v(lower) < v(higher), "{} should sort before {}", lower, higher);
        assert!(v(higher) > v(lower));
    }

    #[test]
    fn test_sentinels() {
        let real = v("1.2.3");
        assert!(MigrationVersion::EMPTY < real);
        assert!(real < MigrationVersion::LATEST);
        assert!(MigrationVersion::EMPTY < MigrationVersion::LATEST);
        assert_eq!(MigrationVersion::EMPTY, MigrationVersion::EMPTY);
        assert_eq!(MigrationVersion::LATEST, v("latest"));
        assert!(MigrationVersion::EMPTY.is_empty_sentinel());
    }

    #[test]
    fn test_hash_consistent_with_equality() {
        let mut set = HashSet::new();
        set.insert(v("1"));
        assert!(set.contains(&v("1.0")));
        assert!(set.contains(&v("1.0.0")));
        assert!(!set.contains(&v("1.0.1")));
    }

    #[test]
    fn test_sorting_is_total() {
        let mut versions = vec![v("10"), v("1.1"), v("2"), v("1"), v("1.1.0.1"), v("9")];
        versions.push(MigrationVersion::LATEST);
        versions.push(MigrationVersion::EMPTY);
        versions.sort();
        let rendered: Vec<String> = versions.iter().map(|v| v.to_string()).collect();
        assert_eq!(
            rendered,
            vec![
                "<< Empty Schema >>",
                "1",
                "1.1",
                "1.1.0.1",
                "2",
                "9",
                "10",
                "<< Latest Version >>"
            ]
        );
    }

    #[rstest]
    #[case("")]
    #[case("1..2")]
    #[case("1.")]
    #[case("1.2$")]
    fn test_invalid_versions(#[case] input: &str) {
        assert!(MigrationVersion::parse(input).is_err());
    }

    #[test]
    fn test_display_uses_dots() {
        assert_eq!(v("1_2_3").to_string(), "1.2.3");
    }
}
