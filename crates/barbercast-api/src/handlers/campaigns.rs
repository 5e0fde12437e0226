//! Campaign handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use barbercast_common::Error;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use super::{error_response, ErrorResponse};
use crate::auth::AppState;

/// Campaign delivery statistics
#[derive(Debug, Serialize)]
pub struct CampaignStatsResponse {
    pub id: Uuid,
    pub name: String,
    pub status: String,
    pub sent_count: i32,
    pub pending: i64,
    pub sent: i64,
    pub failed: i64,
    pub total: i64,
    pub progress_percentage: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Get delivery statistics for a campaign
pub async fn get_campaign_stats(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<CampaignStatsResponse>, (StatusCode, Json<ErrorResponse>)> {
    let campaign = state
        .repos
        .campaigns
        .get(campaign_id)
        .await
        .map_err(error_response)?
        .ok_or_else(|| error_response(Error::NotFound(format!("Campaign {}", campaign_id))))?;

    let counts = state
        .repos
        .contacts
        .count_by_status(campaign_id)
        .await
        .map_err(error_response)?;

    Ok(Json(CampaignStatsResponse {
        id: campaign.id,
        name: campaign.name,
        status: campaign.status,
        sent_count: campaign.sent_count,
        pending: counts.pending,
        sent: counts.sent,
        failed: counts.failed,
        total: counts.total(),
        progress_percentage: counts.progress_percentage(),
        started_at: campaign.started_at,
        completed_at: campaign.completed_at,
    }))
}
