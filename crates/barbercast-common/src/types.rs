//! Common types for Barbercast

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for campaigns
pub type CampaignId = Uuid;

/// Unique identifier for campaign contacts
pub type ContactId = Uuid;

/// Country calling code prepended to recipient numbers (Brazil)
pub const DEFAULT_COUNTRY_CODE: &str = "55";

/// A recipient phone number in gateway form: digits only, country code first
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Normalize a free-form number.
    ///
    /// Every non-digit is dropped and `country_code` is prepended unless the
    /// digits already start with it. Returns `None` when no digits remain.
    pub fn normalize(raw: &str, country_code: &str) -> Option<Self> {
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            return None;
        }

        if digits.starts_with(country_code) {
            Some(Self(digits))
        } else {
            Some(Self(format!("{}{}", country_code, digits)))
        }
    }

    /// Get the number as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for PhoneNumber {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::normalize(s, DEFAULT_COUNTRY_CODE)
            .ok_or_else(|| crate::Error::Validation("Invalid phone number".to_string()))
    }
}
