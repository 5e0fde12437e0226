//! Sending protection - daily quota, warmup ramp, sending hours and the
//! consecutive-error circuit breaker

use barbercast_common::Result;
use barbercast_storage::models::{ProtectionSettings, MAX_WARMUP_DAY};
use barbercast_storage::repository::SettingsRepository;
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Daily cap per warmup day, day 1 first
pub const WARMUP_SCHEDULE: [u32; 5] = [20, 35, 50, 75, 100];

/// The cap for today after warmup scaling.
///
/// With warmup on, day `d` (1-5) is capped at `min(WARMUP_SCHEDULE[d], daily_limit)`;
/// past day 5, or with warmup off, the cap is `daily_limit`.
pub fn effective_daily_limit(settings: &ProtectionSettings) -> u32 {
    if !settings.warmup_enabled {
        return settings.daily_limit;
    }

    let day = settings.warmup_day.max(1) as usize;
    match WARMUP_SCHEDULE.get(day - 1) {
        Some(cap) => (*cap).min(settings.daily_limit),
        None => settings.daily_limit,
    }
}

/// Messages still allowed today
pub fn remaining_today(settings: &ProtectionSettings) -> u32 {
    effective_daily_limit(settings).saturating_sub(settings.messages_sent_today)
}

/// Whether `hour` falls in `[allowed_start_hour, allowed_end_hour)`.
/// A start after the end describes a window across midnight.
pub fn within_sending_hours(settings: &ProtectionSettings, hour: u32) -> bool {
    let (start, end) = (settings.allowed_start_hour, settings.allowed_end_hour);
    if start <= end {
        hour >= start && hour < end
    } else {
        hour >= start || hour < end
    }
}

/// Whether the error streak has reached the configured maximum
pub fn circuit_open(settings: &ProtectionSettings) -> bool {
    settings.consecutive_errors >= settings.max_consecutive_errors
}

/// The settings after the first run of `today`, or `None` if the counters
/// were already reset today.
///
/// This is the in-process statement of what the settings repository does in
/// one conditional update.
pub fn daily_rollover(
    settings: &ProtectionSettings,
    today: NaiveDate,
) -> Option<ProtectionSettings> {
    if settings.last_reset_date == Some(today) {
        return None;
    }

    let warmup_day = match settings.last_reset_date {
        None => settings.warmup_day,
        Some(_) if settings.warmup_day >= MAX_WARMUP_DAY => settings.warmup_day,
        Some(_) => settings.warmup_day + 1,
    };

    Some(ProtectionSettings {
        messages_sent_today: 0,
        consecutive_errors: 0,
        warmup_day,
        last_reset_date: Some(today),
        ..settings.clone()
    })
}

/// Serialized access point for the protection counters.
///
/// Every mutation goes through one atomic repository call and the ledger
/// keeps the row it returned, so reads never drift from what is stored.
pub struct ProtectionLedger {
    repo: Arc<dyn SettingsRepository>,
    settings: ProtectionSettings,
}

impl ProtectionLedger {
    /// Load the settings row. `None` when the installation has none.
    pub async fn load(repo: Arc<dyn SettingsRepository>) -> Result<Option<Self>> {
        let settings = repo.get().await?;
        Ok(settings.map(|settings| Self { repo, settings }))
    }

    pub fn settings(&self) -> &ProtectionSettings {
        &self.settings
    }

    pub fn effective_daily_limit(&self) -> u32 {
        effective_daily_limit(&self.settings)
    }

    pub fn remaining_today(&self) -> u32 {
        remaining_today(&self.settings)
    }

    pub fn circuit_open(&self) -> bool {
        circuit_open(&self.settings)
    }

    /// Apply the daily rollover for `today`. Returns true if it happened now.
    pub async fn roll_over(&mut self, today: NaiveDate) -> Result<bool> {
        match self.repo.roll_over(self.settings.id, today).await? {
            Some(settings) => {
                info!(
                    date = %today,
                    warmup_day = settings.warmup_day,
                    "Daily sending counters reset"
                );
                self.settings = settings;
                Ok(true)
            }
            None => {
                debug!(date = %today, "Daily counters already reset");
                // Another run may have reset them; pick up the stored values
                if let Some(settings) = self.repo.get().await? {
                    self.settings = settings;
                }
                Ok(false)
            }
        }
    }

    /// Take a slot of today's quota before a send. With `enforce_limit` off
    /// (test sends) the slot is granted past the limit. Returns false when
    /// the quota is used up, possibly by a concurrent run.
    pub async fn reserve_send(&mut self, enforce_limit: bool) -> Result<bool> {
        let limit = enforce_limit.then(|| self.effective_daily_limit());
        match self.repo.reserve_send(self.settings.id, limit).await? {
            Some(settings) => {
                self.settings = settings;
                Ok(true)
            }
            None => {
                debug!(limit = ?limit, "Daily quota used up");
                if let Some(settings) = self.repo.get().await? {
                    self.settings = settings;
                }
                Ok(false)
            }
        }
    }

    pub async fn record_success(&mut self) -> Result<()> {
        self.settings = self.repo.record_success(self.settings.id).await?;
        Ok(())
    }

    pub async fn record_failure(&mut self) -> Result<()> {
        self.settings = self.repo.record_failure(self.settings.id).await?;
        if self.circuit_open() {
            warn!(
                consecutive_errors = self.settings.consecutive_errors,
                max_consecutive_errors = self.settings.max_consecutive_errors,
                "Consecutive error limit reached"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn settings() -> ProtectionSettings {
        ProtectionSettings {
            is_enabled: true,
            ..ProtectionSettings::default()
        }
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn test_warmup_schedule_caps() {
        let mut s = settings();
        s.daily_limit = 1000;

        let caps: Vec<u32> = (1..=5)
            .map(|day| {
                s.warmup_day = day;
                effective_daily_limit(&s)
            })
            .collect();
        assert_eq!(caps, vec![20, 35, 50, 75, 100]);

        s.warmup_day = 6;
        assert_eq!(effective_daily_limit(&s), 1000);
    }

    #[test]
    fn test_warmup_respects_lower_daily_limit() {
        let mut s = settings();
        s.daily_limit = 40;

        for (day, expected) in [(1, 20), (2, 35), (3, 40), (4, 40), (5, 40), (9, 40)] {
            s.warmup_day = day;
            assert_eq!(effective_daily_limit(&s), expected, "day {}", day);
        }
    }

    #[test]
    fn test_warmup_is_monotonic() {
        let mut s = settings();
        s.daily_limit = 80;
        let mut previous = 0;
        for day in 1..=7 {
            s.warmup_day = day;
            let cap = effective_daily_limit(&s);
            assert!(cap >= previous);
            previous = cap;
        }
    }

    #[test]
    fn test_warmup_disabled_uses_daily_limit() {
        let mut s = settings();
        s.warmup_enabled = false;
        s.warmup_day = 1;
        s.daily_limit = 300;
        assert_eq!(effective_daily_limit(&s), 300);
    }

    #[test]
    fn test_remaining_today_saturates() {
        let mut s = settings();
        s.warmup_day = 1;
        s.messages_sent_today = 15;
        assert_eq!(remaining_today(&s), 5);

        s.messages_sent_today = 25;
        assert_eq!(remaining_today(&s), 0);
    }

    #[test]
    fn test_sending_hours_window() {
        let mut s = settings();
        s.allowed_start_hour = 8;
        s.allowed_end_hour = 20;

        assert!(!within_sending_hours(&s, 7));
        assert!(within_sending_hours(&s, 8));
        assert!(within_sending_hours(&s, 19));
        assert!(!within_sending_hours(&s, 20));
    }

    #[test]
    fn test_sending_hours_across_midnight() {
        let mut s = settings();
        s.allowed_start_hour = 22;
        s.allowed_end_hour = 2;

        assert!(within_sending_hours(&s, 23));
        assert!(within_sending_hours(&s, 1));
        assert!(!within_sending_hours(&s, 2));
        assert!(!within_sending_hours(&s, 12));
    }

    #[test]
    fn test_circuit_open_at_threshold() {
        let mut s = settings();
        s.max_consecutive_errors = 3;
        s.consecutive_errors = 2;
        assert!(!circuit_open(&s));
        s.consecutive_errors = 3;
        assert!(circuit_open(&s));
    }

    #[test]
    fn test_rollover_is_idempotent_within_a_day() {
        let mut s = settings();
        s.last_reset_date = Some(date(10));
        s.warmup_day = 2;
        s.messages_sent_today = 30;
        s.consecutive_errors = 2;

        let rolled = daily_rollover(&s, date(11)).unwrap();
        assert_eq!(rolled.messages_sent_today, 0);
        assert_eq!(rolled.consecutive_errors, 0);
        assert_eq!(rolled.warmup_day, 3);
        assert_eq!(rolled.last_reset_date, Some(date(11)));

        let mut later = rolled.clone();
        later.messages_sent_today = 12;
        assert_eq!(daily_rollover(&later, date(11)), None);
    }

    #[test]
    fn test_rollover_caps_warmup_day() {
        let mut s = settings();
        s.last_reset_date = Some(date(10));
        s.warmup_day = 5;

        let rolled = daily_rollover(&s, date(14)).unwrap();
        assert_eq!(rolled.warmup_day, 5);
    }

    #[test]
    fn test_first_rollover_keeps_warmup_day() {
        let mut s = settings();
        s.last_reset_date = None;
        s.warmup_day = 1;
        s.messages_sent_today = 4;

        let rolled = daily_rollover(&s, date(10)).unwrap();
        assert_eq!(rolled.warmup_day, 1);
        assert_eq!(rolled.messages_sent_today, 0);
    }
}
