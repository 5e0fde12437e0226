//! Protection settings repository
//!
//! Counter changes are single conditional `UPDATE ... RETURNING` statements,
//! so concurrent dispatcher runs never lose increments. A send takes its
//! quota slot before the gateway call, which keeps concurrent runs within
//! the daily limit.

use crate::db::DatabasePool;
use crate::models::{ProtectionSettings, ProtectionSettingsRow, UpdateProtectionSettings};
use async_trait::async_trait;
use barbercast_common::{Error, Result};
use chrono::NaiveDate;
use uuid::Uuid;

/// Protection settings repository trait
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    /// Load the installation's settings row
    async fn get(&self) -> Result<Option<ProtectionSettings>>;

    /// Reset the daily counters if `today` differs from the last reset date.
    ///
    /// Returns the new settings when a rollover happened, `None` when the
    /// counters were already reset today. `warmup_day` advances by one
    /// (capped at 5) except on the very first reset.
    async fn roll_over(&self, id: Uuid, today: NaiveDate) -> Result<Option<ProtectionSettings>>;

    /// Take one slot of today's quota before a send.
    ///
    /// Returns `None` when `messages_sent_today` already reached `limit`.
    /// Without a limit the slot is always granted.
    async fn reserve_send(&self, id: Uuid, limit: Option<u32>)
        -> Result<Option<ProtectionSettings>>;

    /// Keep the reserved slot and clear the error streak
    async fn record_success(&self, id: Uuid) -> Result<ProtectionSettings>;

    /// Give the reserved slot back and extend the error streak by one
    async fn record_failure(&self, id: Uuid) -> Result<ProtectionSettings>;

    /// Write configuration columns; counters are left untouched
    async fn update(&self, id: Uuid, input: UpdateProtectionSettings)
        -> Result<Option<ProtectionSettings>>;
}

/// Database settings repository
pub struct DbSettingsRepository {
    pool: DatabasePool,
}

impl DbSettingsRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    fn to_i32(value: Option<u32>) -> Option<i32> {
        value.map(|v| i32::try_from(v).unwrap_or(i32::MAX))
    }
}

#[async_trait]
impl SettingsRepository for DbSettingsRepository {
    async fn get(&self) -> Result<Option<ProtectionSettings>> {
        let row = sqlx::query_as::<_, ProtectionSettingsRow>(
            "SELECT * FROM marketing_settings ORDER BY created_at ASC LIMIT 1",
        )
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(row.map(ProtectionSettings::from))
    }

    async fn roll_over(&self, id: Uuid, today: NaiveDate) -> Result<Option<ProtectionSettings>> {
        let row = sqlx::query_as::<_, ProtectionSettingsRow>(
            r#"
            UPDATE marketing_settings SET
                messages_sent_today = 0,
                consecutive_errors = 0,
                warmup_day = CASE
                    WHEN last_reset_date IS NULL THEN COALESCE(warmup_day, 1)
                    WHEN COALESCE(warmup_day, 1) >= 5 THEN warmup_day
                    ELSE COALESCE(warmup_day, 1) + 1
                END,
                last_reset_date = $2,
                updated_at = NOW()
            WHERE id = $1
              AND (last_reset_date IS NULL OR last_reset_date <> $2)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(today)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(row.map(ProtectionSettings::from))
    }

    async fn reserve_send(
        &self,
        id: Uuid,
        limit: Option<u32>,
    ) -> Result<Option<ProtectionSettings>> {
        let row = sqlx::query_as::<_, ProtectionSettingsRow>(
            r#"
            UPDATE marketing_settings SET
                messages_sent_today = messages_sent_today + 1,
                updated_at = NOW()
            WHERE id = $1
              AND ($2::INTEGER IS NULL OR messages_sent_today < $2)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(Self::to_i32(limit))
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(row.map(ProtectionSettings::from))
    }

    async fn record_success(&self, id: Uuid) -> Result<ProtectionSettings> {
        sqlx::query_as::<_, ProtectionSettingsRow>(
            r#"
            UPDATE marketing_settings SET
                consecutive_errors = 0,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?
        .map(ProtectionSettings::from)
        .ok_or_else(|| Error::NotFound(format!("Marketing settings {}", id)))
    }

    async fn record_failure(&self, id: Uuid) -> Result<ProtectionSettings> {
        sqlx::query_as::<_, ProtectionSettingsRow>(
            r#"
            UPDATE marketing_settings SET
                messages_sent_today = GREATEST(messages_sent_today - 1, 0),
                consecutive_errors = consecutive_errors + 1,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?
        .map(ProtectionSettings::from)
        .ok_or_else(|| Error::NotFound(format!("Marketing settings {}", id)))
    }

    async fn update(
        &self,
        id: Uuid,
        input: UpdateProtectionSettings,
    ) -> Result<Option<ProtectionSettings>> {
        let row = sqlx::query_as::<_, ProtectionSettingsRow>(
            r#"
            UPDATE marketing_settings SET
                is_enabled = COALESCE($2, is_enabled),
                min_delay_seconds = COALESCE($3, min_delay_seconds),
                max_delay_seconds = COALESCE($4, max_delay_seconds),
                daily_limit = COALESCE($5, daily_limit),
                warmup_enabled = COALESCE($6, warmup_enabled),
                warmup_day = COALESCE($7, warmup_day),
                pause_every_n_messages = COALESCE($8, pause_every_n_messages),
                pause_duration_seconds = COALESCE($9, pause_duration_seconds),
                allowed_start_hour = COALESCE($10, allowed_start_hour),
                allowed_end_hour = COALESCE($11, allowed_end_hour),
                max_consecutive_errors = COALESCE($12, max_consecutive_errors),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(input.is_enabled)
        .bind(Self::to_i32(input.min_delay_seconds))
        .bind(Self::to_i32(input.max_delay_seconds))
        .bind(Self::to_i32(input.daily_limit))
        .bind(input.warmup_enabled)
        .bind(Self::to_i32(input.warmup_day))
        .bind(Self::to_i32(input.pause_every_n_messages))
        .bind(Self::to_i32(input.pause_duration_seconds))
        .bind(Self::to_i32(input.allowed_start_hour))
        .bind(Self::to_i32(input.allowed_end_hour))
        .bind(Self::to_i32(input.max_consecutive_errors))
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(row.map(ProtectionSettings::from))
    }
}
