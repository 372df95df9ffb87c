//! Domain names and the resource names derived from them.

use crate::errors::{Result, RotatorError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

static LABEL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?$").expect("valid label regex")
});

const MAX_DOMAIN_LENGTH: usize = 253;

/// A validated, normalized fully-qualified hostname.
///
/// Normalization trims whitespace, lowercases and drops one trailing dot. Only ASCII
/// letter-digit-hyphen labels are accepted, so internationalized names must be given in
/// their punycode (`xn--`) form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Domain(String);

impl Domain {
    /// Parse and normalize a hostname
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let normalized = trimmed.strip_suffix('.').unwrap_or(trimmed).to_ascii_lowercase();

        if normalized.is_empty() {
            return Err(RotatorError::validation_field("domain cannot be empty", "domains"));
        }
        if !normalized.is_ascii() {
            return Err(RotatorError::validation_field(
                format!("domain '{}' must be given in punycode (xn--) form", raw.trim()),
                "domains",
            ));
        }
        if normalized.len() > MAX_DOMAIN_LENGTH {
            return Err(RotatorError::validation_field(
                format!("domain '{}' exceeds {} characters", normalized, MAX_DOMAIN_LENGTH),
                "domains",
            ));
        }

        let labels: Vec<&str> = normalized.split('.').collect();
        if labels.len() < 2 {
            return Err(RotatorError::validation_field(
                format!("domain '{}' must have at least two labels", normalized),
                "domains",
            ));
        }
        if let Some(bad) = labels.iter().find(|label| !LABEL_REGEX.is_match(label)) {
            return Err(RotatorError::validation_field(
                format!("domain '{}' has an invalid label '{}'", normalized, bad),
                "domains",
            ));
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Names the owning DNS zone could have, from the two-label root out to the full
    /// hostname.
    ///
    /// Walking outward lets multi-label public suffixes (`example.co.uk`) resolve without
    /// a suffix list: `co.uk` is simply not a zone the provider knows.
    pub fn zone_candidates(&self) -> Vec<&str> {
        let mut candidates: Vec<&str> = self
            .0
            .match_indices('.')
            .map(|(idx, _)| &self.0[idx + 1..])
            .filter(|suffix| suffix.contains('.'))
            .collect();
        candidates.reverse();
        candidates.push(&self.0);
        candidates
    }

    /// Resource id shared by the domain's DNS authorization and map entry
    pub fn slug(&self) -> String {
        slug(&self.0)
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Domain {
    type Error = RotatorError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Domain> for String {
    fn from(domain: Domain) -> Self {
        domain.0
    }
}

/// Derive a resource id from a hostname by replacing every `.` with `-`.
///
/// Authorization names and certificate map entry names both come from here.
pub fn slug(hostname: &str) -> String {
    hostname.replace('.', "-")
}
