//! API request handlers

pub mod campaigns;
pub mod dispatch;
pub mod gateway;
pub mod health;
pub mod settings;

use axum::{http::StatusCode, Json};
use barbercast_common::Error;
use serde::Serialize;
use tracing::error;

/// Error response
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Map a service error to its status code and JSON body
pub(crate) fn error_response(e: Error) -> (StatusCode, Json<ErrorResponse>) {
    let status =
        StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        error!("Request failed: {}", e);
    }
    (
        status,
        Json(ErrorResponse {
            error: e.code().to_string(),
            message: e.to_string(),
        }),
    )
}
