//! Repository layer for data access

pub mod campaigns;
pub mod contacts;
pub mod gateway_config;
pub mod settings;

// Re-export concrete repository implementations with simple names
pub use campaigns::DbCampaignRepository;
pub use contacts::DbContactRepository;
pub use gateway_config::DbGatewayConfigRepository;
pub use settings::DbSettingsRepository;

// Re-export repository traits
pub use campaigns::CampaignRepository;
pub use contacts::ContactRepository;
pub use gateway_config::GatewayConfigRepository;
pub use settings::SettingsRepository;

use crate::db::DatabasePool;
use std::sync::Arc;

/// The repositories a dispatcher run needs, behind their traits
#[derive(Clone)]
pub struct Repositories {
    pub campaigns: Arc<dyn CampaignRepository>,
    pub contacts: Arc<dyn ContactRepository>,
    pub settings: Arc<dyn SettingsRepository>,
    pub gateway_config: Arc<dyn GatewayConfigRepository>,
}

impl Repositories {
    /// Postgres-backed repositories sharing one pool
    pub fn postgres(pool: DatabasePool) -> Self {
        Self {
            campaigns: Arc::new(DbCampaignRepository::new(pool.clone())),
            contacts: Arc::new(DbContactRepository::new(pool.clone())),
            settings: Arc::new(DbSettingsRepository::new(pool.clone())),
            gateway_config: Arc::new(DbGatewayConfigRepository::new(pool)),
        }
    }
}
