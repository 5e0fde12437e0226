//! Campaign contact repository

use crate::db::DatabasePool;
use crate::models::{Contact, ContactCounts};
use async_trait::async_trait;
use barbercast_common::types::{CampaignId, ContactId};
use barbercast_common::{Error, Result};
use chrono::{DateTime, Utc};

/// Contact repository trait
#[async_trait]
pub trait ContactRepository: Send + Sync {
    /// Pending contacts in insertion order, at most `limit`
    async fn list_pending(&self, campaign_id: CampaignId, limit: i64) -> Result<Vec<Contact>>;

    /// Mark a pending contact as sent. Returns false if it was not pending.
    async fn mark_sent(&self, id: ContactId, sent_at: DateTime<Utc>) -> Result<bool>;

    /// Mark a pending contact as failed. Returns false if it was not pending.
    async fn mark_failed(&self, id: ContactId, error: &str) -> Result<bool>;

    async fn count_by_status(&self, campaign_id: CampaignId) -> Result<ContactCounts>;
}

/// Database contact repository
pub struct DbContactRepository {
    pool: DatabasePool,
}

impl DbContactRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContactRepository for DbContactRepository {
    async fn list_pending(&self, campaign_id: CampaignId, limit: i64) -> Result<Vec<Contact>> {
        sqlx::query_as::<_, Contact>(
            r#"
            SELECT * FROM marketing_contacts
            WHERE campaign_id = $1 AND status = 'pending'
            ORDER BY created_at ASC, id ASC
            LIMIT $2
            "#,
        )
        .bind(campaign_id)
        .bind(limit)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn mark_sent(&self, id: ContactId, sent_at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE marketing_contacts SET
                status = 'sent',
                sent_at = $2,
                error_message = NULL
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(sent_at)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_failed(&self, id: ContactId, error: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE marketing_contacts SET
                status = 'failed',
                error_message = $2
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_by_status(&self, campaign_id: CampaignId) -> Result<ContactCounts> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT status, COUNT(*) FROM marketing_contacts
            WHERE campaign_id = $1
            GROUP BY status
            "#,
        )
        .bind(campaign_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        let mut counts = ContactCounts::default();
        for (status, count) in rows {
            match status.as_str() {
                "pending" => counts.pending = count,
                "sent" => counts.sent = count,
                "failed" => counts.failed = count,
                _ => {}
            }
        }
        Ok(counts)
    }
}
