//! Campaign Module - Paced delivery of marketing campaigns

mod dispatcher;
pub mod protection;
mod template;

pub use dispatcher::{
    CampaignDispatcher, DispatchError, DispatchOutcome, DispatchReport, DispatchRequest,
    DispatcherOptions, GatewayHealth,
};
pub use protection::{effective_daily_limit, remaining_today, ProtectionLedger, WARMUP_SCHEDULE};
pub use template::MessageRenderer;
