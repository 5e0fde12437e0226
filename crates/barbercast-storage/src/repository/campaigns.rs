//! Campaign repository

use crate::db::DatabasePool;
use crate::models::{Campaign, CampaignStatus};
use async_trait::async_trait;
use barbercast_common::types::CampaignId;
use barbercast_common::{Error, Result};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Campaign repository trait
#[async_trait]
pub trait CampaignRepository: Send + Sync {
    async fn get(&self, id: CampaignId) -> Result<Option<Campaign>>;

    /// Atomically move a draft, paused or stale sending campaign to `sending`.
    /// Returns the new claim token, or `None` when another run holds it.
    async fn claim_for_sending(
        &self,
        id: CampaignId,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<Option<Uuid>>;

    /// Refresh a held claim. Returns false once another run has taken it over.
    async fn renew_claim(&self, id: CampaignId, claim: Uuid, now: DateTime<Utc>) -> Result<bool>;

    /// Increment the cumulative sent counter, returning the new value
    async fn increment_sent(&self, id: CampaignId, now: DateTime<Utc>) -> Result<i32>;

    /// Persist the run outcome and drop the claim. Terminal statuses also
    /// stamp `completed_at`. Returns false when the claim was no longer held.
    async fn release(
        &self,
        id: CampaignId,
        claim: Uuid,
        status: CampaignStatus,
        now: DateTime<Utc>,
    ) -> Result<bool>;
}

/// Database campaign repository
pub struct DbCampaignRepository {
    pool: DatabasePool,
}

impl DbCampaignRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CampaignRepository for DbCampaignRepository {
    async fn get(&self, id: CampaignId) -> Result<Option<Campaign>> {
        sqlx::query_as::<_, Campaign>("SELECT * FROM marketing_campaigns WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn claim_for_sending(
        &self,
        id: CampaignId,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<Option<Uuid>> {
        let claim = Uuid::new_v4();
        let result = sqlx::query(
            r#"
            UPDATE marketing_campaigns SET
                status = 'sending',
                claim_token = $2,
                started_at = COALESCE(started_at, $3),
                updated_at = $3
            WHERE id = $1
              AND (
                status IN ('draft', 'paused')
                OR (status = 'sending' AND updated_at < $4)
              )
            "#,
        )
        .bind(id)
        .bind(claim)
        .bind(now)
        .bind(stale_before)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok((result.rows_affected() > 0).then_some(claim))
    }

    async fn renew_claim(&self, id: CampaignId, claim: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE marketing_campaigns SET updated_at = $3
            WHERE id = $1 AND status = 'sending' AND claim_token = $2
            "#,
        )
        .bind(id)
        .bind(claim)
        .bind(now)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn increment_sent(&self, id: CampaignId, now: DateTime<Utc>) -> Result<i32> {
        let row: Option<(i32,)> = sqlx::query_as(
            r#"
            UPDATE marketing_campaigns SET
                sent_count = sent_count + 1,
                updated_at = $2
            WHERE id = $1
            RETURNING sent_count
            "#,
        )
        .bind(id)
        .bind(now)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        row.map(|(count,)| count)
            .ok_or_else(|| Error::NotFound(format!("Campaign {}", id)))
    }

    async fn release(
        &self,
        id: CampaignId,
        claim: Uuid,
        status: CampaignStatus,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let completed_at = status.is_terminal().then_some(now);

        let result = sqlx::query(
            r#"
            UPDATE marketing_campaigns SET
                status = $3,
                claim_token = NULL,
                completed_at = COALESCE($4, completed_at),
                updated_at = $5
            WHERE id = $1 AND claim_token = $2
            "#,
        )
        .bind(id)
        .bind(claim)
        .bind(status.to_string())
        .bind(completed_at)
        .bind(now)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}
