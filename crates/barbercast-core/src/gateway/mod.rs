//! Messaging gateway
//!
//! Outbound WhatsApp delivery goes through a [`MessageGateway`]. The
//! production implementation talks to the ChatPro HTTP API.

pub mod chatpro;

pub use chatpro::{ChatProClient, ChatProConnector};

use async_trait::async_trait;
use barbercast_common::types::PhoneNumber;
use barbercast_storage::models::GatewayConfig;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// Gateway errors
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Gateway not configured")]
    NotConfigured,

    #[error("Gateway request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Gateway returned {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Unexpected gateway response: {0}")]
    Decode(String),
}

/// Result of a connectivity probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GatewayStatus {
    pub connected: bool,
}

/// A messaging gateway able to deliver text and image messages
#[async_trait]
pub trait MessageGateway: Send + Sync {
    /// Probe the session behind the gateway
    async fn status(&self) -> Result<GatewayStatus, GatewayError>;

    async fn send_text(&self, to: &PhoneNumber, message: &str) -> Result<(), GatewayError>;

    /// Send an image from a public URL with `caption` as its text
    async fn send_image(
        &self,
        to: &PhoneNumber,
        image_url: &str,
        caption: &str,
    ) -> Result<(), GatewayError>;
}

/// Builds a gateway from the stored configuration
pub trait GatewayConnector: Send + Sync {
    fn connect(&self, config: &GatewayConfig) -> Result<Arc<dyn MessageGateway>, GatewayError>;
}
