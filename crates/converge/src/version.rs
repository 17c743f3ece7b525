//! Dotted numeric versions for release and kernel gating
//!
//! Release identifiers such as `9.10`, `16.04` and kernel strings such as
//! `4.15.0-112-generic` must order numerically. A string comparison puts
//! `"9.10"` after `"16.04"`; [`Version`] does not.

use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A parsed version: leading dot-separated numbers plus whatever followed
#[derive(Debug, Clone)]
pub struct Version {
    components: Vec<u64>,
    suffix: String,
}

impl Version {
    /// Build a version from numeric components
    pub fn new(components: &[u64]) -> Self {
        Self {
            components: components.to_vec(),
            suffix: String::new(),
        }
    }

    /// Parse a version string
    ///
    /// The numeric prefix is read up to the first character that is neither
    /// a digit nor a dot. Anything after it is kept only for display.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let invalid = || Error::InvalidVersion {
            input: input.to_string(),
        };

        if !trimmed.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(invalid());
        }

        let end = trimmed
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(trimmed.len());
        let (numeric, suffix) = trimmed.split_at(end);

        let components = numeric
            .split('.')
            .filter(|part| !part.is_empty())
            .map(|part| part.parse::<u64>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            components,
            suffix: suffix.to_string(),
        })
    }

    pub fn components(&self) -> &[u64] {
        &self.components
    }

    /// Major component (first number)
    pub fn major(&self) -> u64 {
        self.components.first().copied().unwrap_or(0)
    }

    /// Whether `self >= other`, with `other` given as a literal like `"15.04"`
    ///
    /// An unparseable `other` compares as `0`.
    pub fn at_least(&self, other: &str) -> bool {
        let other = Self::parse(other).unwrap_or_else(|_| Self::new(&[0]));
        *self >= other
    }

    fn component(&self, index: usize) -> u64 {
        self.components.get(index).copied().unwrap_or(0)
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.components.len().max(other.components.len());
        (0..len)
            .map(|i| self.component(i).cmp(&other.component(i)))
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let numeric: Vec<String> = self.components.iter().map(u64::to_string).collect();
        write!(f, "{}{}", numeric.join("."), self.suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_numeric_not_lexicographic() {
        assert!("9.10" > "16.04", "string order is the trap");
        assert!(v("9.10") < v("16.04"));
        assert!(v("16.04") < v("18.04"));
        assert!(v("9.10") < v("18.04"));
    }

    #[test]
    fn test_kernel_string() {
        let kernel = v("4.15.0-112-generic");
        assert_eq!(kernel.components(), &[4, 15, 0]);
        assert!(kernel >= v("4.9"));
        assert!(v("3.13.0-170-generic") < v("4.9"));
        assert_eq!(kernel.to_string(), "4.15.0-112-generic");
    }

    #[test]
    fn test_missing_components_are_zero() {
        assert_eq!(v("4.9"), v("4.9.0"));
        assert_eq!(v("16.04"), v("16.4"));
        assert!(v("4.9.1") > v("4.9"));
    }

    #[test]
    fn test_at_least() {
        assert!(v("15.04").at_least("15.04"));
        assert!(v("16.04").at_least("15.04"));
        assert!(!v("14.04").at_least("15.04"));
        assert!(v("10").at_least("9.10"));
    }

    #[test]
    fn test_invalid_versions() {
        assert!(Version::parse("").is_err());
        assert!(Version::parse("n/a").is_err());
        assert!(Version::parse("bullseye").is_err());
        assert!("99999999999999999999999".parse::<Version>().is_err());
    }

    #[test]
    fn test_whitespace_and_trailing_dot() {
        assert_eq!(v("  18.04\n"), v("18.04"));
        assert_eq!(v("10.").components(), &[10]);
        assert_eq!(v("10.").major(), 10);
    }
}
