//! Messaging gateway configuration repository

use crate::db::DatabasePool;
use crate::models::GatewayConfig;
use async_trait::async_trait;
use barbercast_common::{Error, Result};

/// Gateway configuration repository trait
#[async_trait]
pub trait GatewayConfigRepository: Send + Sync {
    async fn get(&self) -> Result<Option<GatewayConfig>>;
}

/// Database gateway configuration repository
pub struct DbGatewayConfigRepository {
    pool: DatabasePool,
}

impl DbGatewayConfigRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GatewayConfigRepository for DbGatewayConfigRepository {
    async fn get(&self) -> Result<Option<GatewayConfig>> {
        sqlx::query_as::<_, GatewayConfig>(
            r#"
            SELECT id, enabled, api_endpoint, api_token, instance_id, updated_at
            FROM chatpro_config
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }
}
