//! Wall-clock access

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Calendar date of `instant` in `tz`
pub fn local_date(instant: DateTime<Utc>, tz: Tz) -> NaiveDate {
    instant.with_timezone(&tz).date_naive()
}

/// Hour of day (0-23) of `instant` in `tz`
pub fn local_hour(instant: DateTime<Utc>, tz: Tz) -> u32 {
    instant.with_timezone(&tz).hour()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_local_time_in_sao_paulo() {
        // 02:30 UTC is still the previous evening in Sao Paulo (UTC-3)
        let instant = Utc.with_ymd_and_hms(2024, 3, 12, 2, 30, 0).unwrap();
        let tz = chrono_tz::America::Sao_Paulo;

        assert_eq!(local_hour(instant, tz), 23);
        assert_eq!(
            local_date(instant, tz),
            NaiveDate::from_ymd_opt(2024, 3, 11).unwrap()
        );
    }
}
