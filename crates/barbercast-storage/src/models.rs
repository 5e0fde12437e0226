//! Database models

use barbercast_common::types::{CampaignId, ContactId};
use barbercast_common::{Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ============================================================================
// Campaigns
// ============================================================================

/// Campaign status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Sending,
    Paused,
    Completed,
    Failed,
}

impl CampaignStatus {
    /// Completed and failed campaigns never send again
    pub fn is_terminal(&self) -> bool {
        matches!(self, CampaignStatus::Completed | CampaignStatus::Failed)
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CampaignStatus::Draft => write!(f, "draft"),
            CampaignStatus::Sending => write!(f, "sending"),
            CampaignStatus::Paused => write!(f, "paused"),
            CampaignStatus::Completed => write!(f, "completed"),
            CampaignStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for CampaignStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "draft" => Ok(CampaignStatus::Draft),
            "sending" => Ok(CampaignStatus::Sending),
            "paused" => Ok(CampaignStatus::Paused),
            "completed" => Ok(CampaignStatus::Completed),
            "failed" => Ok(CampaignStatus::Failed),
            _ => Err(format!("Invalid campaign status: {}", s)),
        }
    }
}

/// Campaign model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub name: String,
    /// Message template with `{{name}}` placeholders
    pub message: String,
    pub image_url: Option<String>,
    pub button_text: Option<String>,
    pub button_url: Option<String>,
    pub status: String,
    pub sent_count: i32,
    #[serde(skip)]
    pub claim_token: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Call-to-action button attached to a campaign message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallToAction<'a> {
    pub text: &'a str,
    pub url: &'a str,
}

impl Campaign {
    /// Get status enum
    pub fn status_enum(&self) -> Option<CampaignStatus> {
        self.status.parse().ok()
    }

    /// The image to send with the message, if any
    pub fn image(&self) -> Option<&str> {
        self.image_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    /// The call-to-action button, present only when both text and URL are set
    pub fn call_to_action(&self) -> Option<CallToAction<'_>> {
        let text = self.button_text.as_deref().map(str::trim).unwrap_or("");
        let url = self.button_url.as_deref().map(str::trim).unwrap_or("");
        if text.is_empty() || url.is_empty() {
            None
        } else {
            Some(CallToAction { text, url })
        }
    }
}

// ============================================================================
// Contacts
// ============================================================================

/// Contact delivery status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactStatus {
    Pending,
    Sent,
    Failed,
}

impl std::fmt::Display for ContactStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContactStatus::Pending => write!(f, "pending"),
            ContactStatus::Sent => write!(f, "sent"),
            ContactStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for ContactStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ContactStatus::Pending),
            "sent" => Ok(ContactStatus::Sent),
            "failed" => Ok(ContactStatus::Failed),
            _ => Err(format!("Invalid contact status: {}", s)),
        }
    }
}

/// Campaign contact (recipient) model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub campaign_id: CampaignId,
    pub name: Option<String>,
    /// Free-form phone number, normalized at send time
    pub phone: String,
    pub status: String,
    pub error_message: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Contact {
    /// Get status enum
    pub fn status_enum(&self) -> Option<ContactStatus> {
        self.status.parse().ok()
    }
}

/// Contact counts per delivery status for one campaign
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactCounts {
    pub pending: i64,
    pub sent: i64,
    pub failed: i64,
}

impl ContactCounts {
    pub fn total(&self) -> i64 {
        self.pending + self.sent + self.failed
    }

    /// Share of contacts that reached a terminal status
    pub fn progress_percentage(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            ((self.sent + self.failed) as f64 / total as f64) * 100.0
        }
    }
}

// ============================================================================
// Protection settings
// ============================================================================

pub const DEFAULT_MIN_DELAY_SECONDS: u32 = 8;
pub const DEFAULT_MAX_DELAY_SECONDS: u32 = 15;
pub const DEFAULT_DAILY_LIMIT: u32 = 100;
pub const DEFAULT_PAUSE_EVERY_N_MESSAGES: u32 = 10;
pub const DEFAULT_PAUSE_DURATION_SECONDS: u32 = 60;
pub const DEFAULT_ALLOWED_START_HOUR: u32 = 8;
pub const DEFAULT_ALLOWED_END_HOUR: u32 = 20;
pub const DEFAULT_MAX_CONSECUTIVE_ERRORS: u32 = 3;
pub const MAX_WARMUP_DAY: u32 = 5;

/// Raw `marketing_settings` row; configuration columns may be NULL
#[derive(Debug, Clone, FromRow)]
pub struct ProtectionSettingsRow {
    pub id: Uuid,
    pub is_enabled: Option<bool>,
    pub min_delay_seconds: Option<i32>,
    pub max_delay_seconds: Option<i32>,
    pub daily_limit: Option<i32>,
    pub warmup_enabled: Option<bool>,
    pub warmup_day: Option<i32>,
    pub pause_every_n_messages: Option<i32>,
    pub pause_duration_seconds: Option<i32>,
    pub allowed_start_hour: Option<i32>,
    pub allowed_end_hour: Option<i32>,
    pub messages_sent_today: i32,
    pub last_reset_date: Option<NaiveDate>,
    pub consecutive_errors: i32,
    pub max_consecutive_errors: Option<i32>,
    pub updated_at: DateTime<Utc>,
}

/// Per-installation sending protection with defaults applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectionSettings {
    pub id: Uuid,
    pub is_enabled: bool,
    pub min_delay_seconds: u32,
    pub max_delay_seconds: u32,
    pub daily_limit: u32,
    pub warmup_enabled: bool,
    pub warmup_day: u32,
    pub pause_every_n_messages: u32,
    pub pause_duration_seconds: u32,
    pub allowed_start_hour: u32,
    pub allowed_end_hour: u32,
    pub messages_sent_today: u32,
    pub last_reset_date: Option<NaiveDate>,
    pub consecutive_errors: u32,
    pub max_consecutive_errors: u32,
}

impl Default for ProtectionSettings {
    fn default() -> Self {
        Self {
            id: Uuid::nil(),
            is_enabled: false,
            min_delay_seconds: DEFAULT_MIN_DELAY_SECONDS,
            max_delay_seconds: DEFAULT_MAX_DELAY_SECONDS,
            daily_limit: DEFAULT_DAILY_LIMIT,
            warmup_enabled: true,
            warmup_day: 1,
            pause_every_n_messages: DEFAULT_PAUSE_EVERY_N_MESSAGES,
            pause_duration_seconds: DEFAULT_PAUSE_DURATION_SECONDS,
            allowed_start_hour: DEFAULT_ALLOWED_START_HOUR,
            allowed_end_hour: DEFAULT_ALLOWED_END_HOUR,
            messages_sent_today: 0,
            last_reset_date: None,
            consecutive_errors: 0,
            max_consecutive_errors: DEFAULT_MAX_CONSECUTIVE_ERRORS,
        }
    }
}

fn non_negative(value: Option<i32>, default: u32) -> u32 {
    value.and_then(|v| u32::try_from(v).ok()).unwrap_or(default)
}

impl From<ProtectionSettingsRow> for ProtectionSettings {
    fn from(row: ProtectionSettingsRow) -> Self {
        let min_delay_seconds = non_negative(row.min_delay_seconds, DEFAULT_MIN_DELAY_SECONDS);
        let max_delay_seconds = non_negative(row.max_delay_seconds, DEFAULT_MAX_DELAY_SECONDS)
            .max(min_delay_seconds);

        Self {
            id: row.id,
            is_enabled: row.is_enabled.unwrap_or(false),
            min_delay_seconds,
            max_delay_seconds,
            daily_limit: non_negative(row.daily_limit, DEFAULT_DAILY_LIMIT),
            warmup_enabled: row.warmup_enabled.unwrap_or(true),
            warmup_day: non_negative(row.warmup_day, 1).max(1),
            pause_every_n_messages: non_negative(
                row.pause_every_n_messages,
                DEFAULT_PAUSE_EVERY_N_MESSAGES,
            ),
            pause_duration_seconds: non_negative(
                row.pause_duration_seconds,
                DEFAULT_PAUSE_DURATION_SECONDS,
            ),
            allowed_start_hour: non_negative(row.allowed_start_hour, DEFAULT_ALLOWED_START_HOUR),
            allowed_end_hour: non_negative(row.allowed_end_hour, DEFAULT_ALLOWED_END_HOUR),
            messages_sent_today: non_negative(Some(row.messages_sent_today), 0),
            last_reset_date: row.last_reset_date,
            consecutive_errors: non_negative(Some(row.consecutive_errors), 0),
            max_consecutive_errors: non_negative(
                row.max_consecutive_errors,
                DEFAULT_MAX_CONSECUTIVE_ERRORS,
            ),
        }
    }
}

/// Partial update of the protection configuration. Counters are not writable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProtectionSettings {
    pub is_enabled: Option<bool>,
    pub min_delay_seconds: Option<u32>,
    pub max_delay_seconds: Option<u32>,
    pub daily_limit: Option<u32>,
    pub warmup_enabled: Option<bool>,
    pub warmup_day: Option<u32>,
    pub pause_every_n_messages: Option<u32>,
    pub pause_duration_seconds: Option<u32>,
    pub allowed_start_hour: Option<u32>,
    pub allowed_end_hour: Option<u32>,
    pub max_consecutive_errors: Option<u32>,
}

impl UpdateProtectionSettings {
    /// Apply the update to `current` and validate the merged result
    pub fn apply_to(&self, current: &ProtectionSettings) -> Result<ProtectionSettings> {
        let mut next = current.clone();

        if let Some(v) = self.is_enabled {
            next.is_enabled = v;
        }
        if let Some(v) = self.min_delay_seconds {
            next.min_delay_seconds = v;
        }
        if let Some(v) = self.max_delay_seconds {
            next.max_delay_seconds = v;
        }
        if let Some(v) = self.daily_limit {
            next.daily_limit = v;
        }
        if let Some(v) = self.warmup_enabled {
            next.warmup_enabled = v;
        }
        if let Some(v) = self.warmup_day {
            next.warmup_day = v;
        }
        if let Some(v) = self.pause_every_n_messages {
            next.pause_every_n_messages = v;
        }
        if let Some(v) = self.pause_duration_seconds {
            next.pause_duration_seconds = v;
        }
        if let Some(v) = self.allowed_start_hour {
            next.allowed_start_hour = v;
        }
        if let Some(v) = self.allowed_end_hour {
            next.allowed_end_hour = v;
        }
        if let Some(v) = self.max_consecutive_errors {
            next.max_consecutive_errors = v;
        }

        if next.min_delay_seconds > next.max_delay_seconds {
            return Err(Error::Validation(
                "min_delay_seconds must not exceed max_delay_seconds".to_string(),
            ));
        }
        if next.daily_limit == 0 {
            return Err(Error::Validation("daily_limit must be at least 1".to_string()));
        }
        if !(1..=MAX_WARMUP_DAY).contains(&next.warmup_day) {
            return Err(Error::Validation(format!(
                "warmup_day must be between 1 and {}",
                MAX_WARMUP_DAY
            )));
        }
        if next.allowed_start_hour > 23 {
            return Err(Error::Validation(
                "allowed_start_hour must be between 0 and 23".to_string(),
            ));
        }
        if next.allowed_end_hour > 24 {
            return Err(Error::Validation(
                "allowed_end_hour must be between 0 and 24".to_string(),
            ));
        }
        if next.max_consecutive_errors == 0 {
            return Err(Error::Validation(
                "max_consecutive_errors must be at least 1".to_string(),
            ));
        }

        Ok(next)
    }
}

// ============================================================================
// Messaging gateway
// ============================================================================

/// Stored ChatPro gateway configuration
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub id: Uuid,
    pub enabled: bool,
    pub api_endpoint: Option<String>,
    #[serde(skip_serializing)]
    pub api_token: Option<String>,
    pub instance_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl GatewayConfig {
    /// Enabled and carrying both an endpoint and a token
    pub fn is_configured(&self) -> bool {
        let filled = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        self.enabled && filled(&self.api_endpoint) && filled(&self.api_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn empty_row() -> ProtectionSettingsRow {
        ProtectionSettingsRow {
            id: Uuid::new_v4(),
            is_enabled: None,
            min_delay_seconds: None,
            max_delay_seconds: None,
            daily_limit: None,
            warmup_enabled: None,
            warmup_day: None,
            pause_every_n_messages: None,
            pause_duration_seconds: None,
            allowed_start_hour: None,
            allowed_end_hour: None,
            messages_sent_today: 0,
            last_reset_date: None,
            consecutive_errors: 0,
            max_consecutive_errors: None,
            updated_at: Utc::now(),
        }
    }

    fn campaign() -> Campaign {
        Campaign {
            id: Uuid::new_v4(),
            name: "Promo".to_string(),
            message: "Hi {{name}}".to_string(),
            image_url: None,
            button_text: None,
            button_url: None,
            status: "draft".to_string(),
            sent_count: 0,
            claim_token: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn test_settings_defaults_for_null_columns() {
        let row = empty_row();
        let id = row.id;
        let settings = ProtectionSettings::from(row);

        assert_eq!(
            settings,
            ProtectionSettings {
                id,
                ..ProtectionSettings::default()
            }
        );
    }

    #[test]
    fn test_settings_clamps_bad_values() {
        let mut row = empty_row();
        row.min_delay_seconds = Some(20);
        row.max_delay_seconds = Some(5);
        row.warmup_day = Some(0);
        row.daily_limit = Some(-4);

        let settings = ProtectionSettings::from(row);
        assert_eq!(settings.min_delay_seconds, 20);
        assert_eq!(settings.max_delay_seconds, 20);
        assert_eq!(settings.warmup_day, 1);
        assert_eq!(settings.daily_limit, DEFAULT_DAILY_LIMIT);
    }

    #[test]
    fn test_update_validation() {
        let current = ProtectionSettings::default();

        let ok = UpdateProtectionSettings {
            is_enabled: Some(true),
            daily_limit: Some(250),
            ..Default::default()
        }
        .apply_to(&current)
        .unwrap();
        assert!(ok.is_enabled);
        assert_eq!(ok.daily_limit, 250);
        assert_eq!(ok.messages_sent_today, current.messages_sent_today);

        let bad_delay = UpdateProtectionSettings {
            min_delay_seconds: Some(30),
            ..Default::default()
        };
        assert!(bad_delay.apply_to(&current).is_err());

        let bad_day = UpdateProtectionSettings {
            warmup_day: Some(6),
            ..Default::default()
        };
        assert!(bad_day.apply_to(&current).is_err());

        let bad_hour = UpdateProtectionSettings {
            allowed_end_hour: Some(25),
            ..Default::default()
        };
        assert!(bad_hour.apply_to(&current).is_err());
    }

    #[test]
    fn test_call_to_action_requires_text_and_url() {
        let mut c = campaign();
        assert!(c.call_to_action().is_none());

        c.button_text = Some("Book now".to_string());
        assert!(c.call_to_action().is_none());

        c.button_url = Some(" https://barber.example/book ".to_string());
        assert_eq!(
            c.call_to_action(),
            Some(CallToAction {
                text: "Book now",
                url: "https://barber.example/book"
            })
        );
    }

    #[test]
    fn test_blank_image_is_ignored() {
        let mut c = campaign();
        c.image_url = Some("   ".to_string());
        assert!(c.image().is_none());

        c.image_url = Some("https://cdn.example/promo.png".to_string());
        assert_eq!(c.image(), Some("https://cdn.example/promo.png"));
    }

    #[test]
    fn test_gateway_configured() {
        let mut config = GatewayConfig {
            id: Uuid::new_v4(),
            enabled: true,
            api_endpoint: Some("https://v5.chatpro.com.br/chatpro-abc".to_string()),
            api_token: Some(" ".to_string()),
            instance_id: None,
            updated_at: Utc::now(),
        };
        assert!(!config.is_configured());

        config.api_token = Some("token".to_string());
        assert!(config.is_configured());

        config.enabled = false;
        assert!(!config.is_configured());
    }

    #[test]
    fn test_status_roundtrip_strings() {
        assert_eq!("paused".parse::<CampaignStatus>(), Ok(CampaignStatus::Paused));
        assert!(CampaignStatus::Completed.is_terminal());
        assert!(!CampaignStatus::Paused.is_terminal());
        assert_eq!(ContactStatus::Failed.to_string(), "failed");
    }
}
