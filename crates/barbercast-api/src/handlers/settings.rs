//! Sending protection settings handlers

use axum::{extract::State, http::StatusCode, Json};
use barbercast_common::Error;
use barbercast_core::campaign::{effective_daily_limit, remaining_today};
use barbercast_storage::models::{ProtectionSettings, UpdateProtectionSettings};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use super::{error_response, ErrorResponse};
use crate::auth::AppState;

/// Settings plus the limits derived from them
#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    #[serde(flatten)]
    pub settings: ProtectionSettings,
    pub effective_daily_limit: u32,
    pub remaining_today: u32,
}

impl From<ProtectionSettings> for SettingsResponse {
    fn from(settings: ProtectionSettings) -> Self {
        Self {
            effective_daily_limit: effective_daily_limit(&settings),
            remaining_today: remaining_today(&settings),
            settings,
        }
    }
}

fn not_configured() -> Error {
    Error::NotFound("Marketing settings".to_string())
}

/// Get the current protection settings
pub async fn get_settings(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SettingsResponse>, (StatusCode, Json<ErrorResponse>)> {
    let settings = state
        .repos
        .settings
        .get()
        .await
        .map_err(error_response)?
        .ok_or_else(|| error_response(not_configured()))?;

    Ok(Json(settings.into()))
}

/// Update protection configuration; daily counters are not writable
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    Json(input): Json<UpdateProtectionSettings>,
) -> Result<Json<SettingsResponse>, (StatusCode, Json<ErrorResponse>)> {
    let current = state
        .repos
        .settings
        .get()
        .await
        .map_err(error_response)?
        .ok_or_else(|| error_response(not_configured()))?;

    // Reject combinations that would be invalid once merged
    input.apply_to(&current).map_err(error_response)?;

    let updated = state
        .repos
        .settings
        .update(current.id, input)
        .await
        .map_err(error_response)?
        .ok_or_else(|| error_response(not_configured()))?;

    info!(
        enabled = updated.is_enabled,
        daily_limit = updated.daily_limit,
        "Marketing settings updated"
    );

    Ok(Json(updated.into()))
}
