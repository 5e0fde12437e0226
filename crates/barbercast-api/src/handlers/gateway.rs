//! Messaging gateway handlers

use axum::{extract::State, http::StatusCode, Json};
use barbercast_core::GatewayHealth;
use std::sync::Arc;

use super::{error_response, ErrorResponse};
use crate::auth::AppState;

/// Probe the configured WhatsApp gateway
pub async fn gateway_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<GatewayHealth>, (StatusCode, Json<ErrorResponse>)> {
    state
        .dispatcher
        .gateway_health()
        .await
        .map(Json)
        .map_err(error_response)
}
