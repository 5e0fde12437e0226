//! Campaign dispatch handler

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use barbercast_core::{DispatchError, DispatchOutcome, DispatchRequest};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::auth::AppState;

/// Body returned once a batch ran
#[derive(Debug, Serialize)]
pub struct DispatchResponse {
    pub success: bool,
    pub status: DispatchOutcome,
    pub sent: u32,
    pub failed: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Body returned when the run was refused or crashed
#[derive(Debug, Serialize)]
pub struct DispatchFailure {
    pub success: bool,
    pub error: String,
}

fn failure(status: StatusCode, error: String) -> Response {
    (
        status,
        Json(DispatchFailure {
            success: false,
            error,
        }),
    )
        .into_response()
}

/// Send one batch of a marketing campaign
pub async fn send_marketing(
    State(state): State<Arc<AppState>>,
    body: Result<Json<DispatchRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => {
            warn!("Rejected dispatch request: {}", rejection.body_text());
            return failure(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };

    match state.dispatcher.dispatch(request).await {
        Ok(report) => {
            let success = report.outcome != DispatchOutcome::Failed;
            let status = if success {
                StatusCode::OK
            } else {
                StatusCode::BAD_REQUEST
            };
            (
                status,
                Json(DispatchResponse {
                    success,
                    status: report.outcome,
                    sent: report.sent,
                    failed: report.failed,
                    message: report.message,
                }),
            )
                .into_response()
        }
        Err(DispatchError::Storage(e)) => {
            error!("Campaign dispatch failed: {}", e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
        Err(e) => {
            info!("Campaign dispatch refused: {}", e);
            let status = StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::BAD_REQUEST);
            failure(status, e.to_string())
        }
    }
}

/// Answer a bare OPTIONS request; real preflights are handled by the CORS layer
pub async fn preflight() -> StatusCode {
    StatusCode::OK
}
