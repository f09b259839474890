//! Customer and recipient models
//!
//! Customers are read-only to this engine; they are written by the store-side
//! CRM. The dispatcher only needs the fields the audience filter touches plus
//! a deliverable phone number.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Customer gender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gender::Male => write!(f, "male"),
            Gender::Female => write!(f, "female"),
        }
    }
}

impl Gender {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "male" | "m" => Some(Gender::Male),
            "female" | "f" => Some(Gender::Female),
            _ => None,
        }
    }
}

/// Customer entity (read-only view)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    /// Unique identifier
    pub id: Uuid,

    /// Owning store
    pub store_id: Uuid,

    /// Phone number in canonical local format (digits only, leading 0)
    pub phone: Option<String>,

    /// Display name, substituted into message templates
    pub name: Option<String>,

    pub gender: Option<Gender>,

    /// Four-digit birth year
    pub birth_year: Option<i32>,

    /// Top-level region (province / metropolitan city)
    pub region_province: Option<String>,

    /// Second-level region (district)
    pub region_district: Option<String>,

    /// Number of recorded visits
    pub visit_count: i32,

    pub created_at: DateTime<Utc>,

    pub last_visit_at: Option<DateTime<Utc>>,
}

/// A resolved campaign recipient: the minimal projection the fan-out needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub customer_id: Uuid,

    /// Normalized phone number
    pub phone: String,

    /// Name for `{name}` template substitution
    pub name: Option<String>,
}

/// Normalize a phone number to canonical local format.
///
/// Strips every non-digit character, converts a leading country code 82
/// to the domestic 0 prefix, and ensures the result starts with 0.
pub fn normalize_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    if let Some(rest) = digits.strip_prefix("82") {
        return format!("0{}", rest);
    }

    if digits.starts_with('0') {
        digits
    } else {
        format!("0{}", digits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_separators() {
        assert_eq!(normalize_phone("010-1234-5678"), "01012345678");
        assert_eq!(normalize_phone("010 1234 5678"), "01012345678");
    }

    #[test]
    fn test_normalize_country_code() {
        assert_eq!(normalize_phone("+82-10-1234-5678"), "01012345678");
        assert_eq!(normalize_phone("821012345678"), "01012345678");
    }

    #[test]
    fn test_normalize_already_canonical() {
        assert_eq!(normalize_phone("01012345678"), "01012345678");
    }

    #[test]
    fn test_normalize_missing_leading_zero() {
        assert_eq!(normalize_phone("1012345678"), "01012345678");
    }

    #[test]
    fn test_gender_parse() {
        assert_eq!(Gender::from_str("FEMALE"), Some(Gender::Female));
        assert_eq!(Gender::from_str("m"), Some(Gender::Male));
        assert_eq!(Gender::from_str("other"), None);
    }
}
