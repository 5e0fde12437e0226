//! Authentication module

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::{Method, StatusCode},
    middleware::Next,
    response::Response,
    Json,
};
use barbercast_common::{Error, Result};
use barbercast_core::CampaignDispatcher;
use barbercast_storage::{DatabasePool, Repositories};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::handlers::{error_response, ErrorResponse};

/// Dependency probe behind `/health/ready`
#[async_trait]
pub trait ReadinessCheck: Send + Sync {
    async fn check(&self) -> Result<()>;
}

#[async_trait]
impl ReadinessCheck for DatabasePool {
    async fn check(&self) -> Result<()> {
        self.health_check().await
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<CampaignDispatcher>,
    pub repos: Repositories,
    pub readiness: Arc<dyn ReadinessCheck>,
    /// Shared secret required on every non-health route when set
    pub auth_token: Option<String>,
}

/// Extract the caller's token from `Authorization: Bearer` or `apikey`
pub fn extract_token(req: &Request) -> Option<&str> {
    if let Some(auth) = req.headers().get("authorization") {
        if let Ok(auth_str) = auth.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.trim());
            }
        }
    }

    if let Some(key) = req.headers().get("apikey") {
        if let Ok(key_str) = key.to_str() {
            return Some(key_str.trim());
        }
    }

    None
}

/// Authentication middleware
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> std::result::Result<Response, (StatusCode, Json<ErrorResponse>)> {
    let Some(expected) = state.auth_token.as_deref() else {
        return Ok(next.run(request).await);
    };

    // Skip auth for health checks and CORS preflight
    if request.method() == Method::OPTIONS || request.uri().path().starts_with("/health") {
        return Ok(next.run(request).await);
    }

    let token = extract_token(&request).ok_or_else(|| {
        warn!("Missing API token in request to {}", request.uri().path());
        error_response(Error::Auth("Missing API token".to_string()))
    })?;

    if token != expected {
        warn!("Invalid API token in request to {}", request.uri().path());
        return Err(error_response(Error::Auth("Invalid API token".to_string())));
    }

    debug!("Request to {} authenticated", request.uri().path());
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::extract_token;
    use axum::body::Body;
    use axum::extract::Request;

    fn request(header: &str, value: &str) -> Request {
        Request::builder()
            .uri("/send-marketing")
            .header(header, value)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn extracts_bearer_token() {
        let req = request("authorization", "Bearer s3cret");
        assert_eq!(extract_token(&req), Some("s3cret"));
    }

    #[test]
    fn extracts_apikey_header() {
        let req = request("apikey", "s3cret");
        assert_eq!(extract_token(&req), Some("s3cret"));
    }

    #[test]
    fn ignores_other_schemes() {
        let req = request("authorization", "Basic dXNlcjpwYXNz");
        assert_eq!(extract_token(&req), None);
    }
}
