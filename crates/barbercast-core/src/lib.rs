//! Barbercast Core - WhatsApp campaign dispatching
//!
//! This crate provides the campaign dispatcher with its sending protection
//! (daily quota, warmup, sending hours, circuit breaker), message rendering
//! and the messaging gateway client.

pub mod campaign;
pub mod clock;
pub mod gateway;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use campaign::{
    CampaignDispatcher, DispatchError, DispatchOutcome, DispatchReport, DispatchRequest,
    DispatcherOptions, GatewayHealth, MessageRenderer, ProtectionLedger,
};
pub use clock::{Clock, SystemClock};
pub use gateway::{
    ChatProClient, ChatProConnector, GatewayConnector, GatewayError, GatewayStatus, MessageGateway,
};
