//! API routes

use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, Method,
    },
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{auth_middleware, AppState};
use crate::handlers::{campaigns, dispatch, gateway, health, settings};

/// CORS policy of the dispatch function
fn dispatch_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([
            AUTHORIZATION,
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static("apikey"),
            CONTENT_TYPE,
        ])
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let state = Arc::new(state);

    // Health check routes (no auth required)
    let health_routes = Router::new()
        .route("/", get(health::health))
        .route("/live", get(health::liveness))
        .route("/ready", get(health::readiness))
        .route("/detailed", get(health::health_detailed))
        .with_state(state.clone());

    // Dispatch function, mounted under its serverless path and at the root
    let dispatch_routes = Router::new()
        .route(
            "/functions/v1/send-marketing",
            post(dispatch::send_marketing).options(dispatch::preflight),
        )
        .route(
            "/send-marketing",
            post(dispatch::send_marketing).options(dispatch::preflight),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(dispatch_cors())
        .with_state(state.clone());

    let campaign_routes =
        Router::new().route("/:campaign_id/stats", get(campaigns::get_campaign_stats));

    let settings_routes = Router::new().route(
        "/",
        get(settings::get_settings).put(settings::update_settings),
    );

    let gateway_routes = Router::new().route("/status", get(gateway::gateway_status));

    // API v1 routes with authentication
    let api_v1 = Router::new()
        .nest("/campaigns", campaign_routes)
        .nest("/marketing/settings", settings_routes)
        .nest("/gateway", gateway_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state);

    // Combine all routes
    Router::new()
        .nest("/health", health_routes)
        .nest("/api/v1", api_v1)
        .merge(dispatch_routes)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::http::{HeaderValue, StatusCode};
    use axum_test::TestServer;
    use barbercast_common::Result;
    use barbercast_core::testing::{
        campaign, enabled_settings, gateway_config, FakeConnector, FakeGateway, FixedClock,
        MemoryStore, Probe,
    };
    use barbercast_core::{CampaignDispatcher, DispatcherOptions};
    use barbercast_storage::models::ProtectionSettings;
    use chrono::{NaiveDate, TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use uuid::Uuid;

    use crate::auth::ReadinessCheck;

    struct AlwaysReady;

    #[async_trait]
    impl ReadinessCheck for AlwaysReady {
        async fn check(&self) -> Result<()> {
            Ok(())
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        gateway: Arc<FakeGateway>,
        campaign_id: Uuid,
        server: TestServer,
    }

    fn settings() -> ProtectionSettings {
        ProtectionSettings {
            min_delay_seconds: 0,
            max_delay_seconds: 0,
            pause_every_n_messages: 0,
            last_reset_date: NaiveDate::from_ymd_opt(2024, 3, 11),
            ..enabled_settings()
        }
    }

    fn fixture(contacts: usize, auth_token: Option<&str>) -> Fixture {
        let store = MemoryStore::new();
        let c = campaign("Oi {{name}}!");
        let campaign_id = c.id;
        store.insert_campaign(c);
        for i in 0..contacts {
            let name = format!("Cliente {}", i);
            store.insert_contact(campaign_id, Some(name.as_str()), "11999998888");
        }
        store.set_settings(settings());
        store.set_gateway_config(gateway_config());

        let gateway = FakeGateway::new(Probe::Connected);
        // 14:00 in Sao Paulo
        let clock = Arc::new(FixedClock::at(
            Utc.with_ymd_and_hms(2024, 3, 11, 17, 0, 0).unwrap(),
        ));
        let dispatcher = CampaignDispatcher::new(
            store.repositories(),
            Arc::new(FakeConnector::new(gateway.clone())),
            DispatcherOptions::default(),
        )
        .with_clock(clock);

        let state = AppState {
            dispatcher: Arc::new(dispatcher),
            repos: store.repositories(),
            readiness: Arc::new(AlwaysReady),
            auth_token: auth_token.map(str::to_string),
        };
        let server = TestServer::new(create_router(state)).unwrap();

        Fixture {
            store,
            gateway,
            campaign_id,
            server,
        }
    }

    #[tokio::test]
    async fn dispatch_completes_campaign() {
        let f = fixture(2, None);

        let response = f
            .server
            .post("/functions/v1/send-marketing")
            .json(&json!({ "campaign_id": f.campaign_id }))
            .await;

        assert_eq!(response.status_code(), StatusCode::OK);
        assert_eq!(
            response.json::<Value>(),
            json!({ "success": true, "status": "completed", "sent": 2, "failed": 0 })
        );
        assert_eq!(f.gateway.sent().len(), 2);
    }

    #[tokio::test]
    async fn dispatch_failed_outcome_is_bad_request() {
        let f = fixture(2, None);
        f.gateway.fail_by_default();

        let response = f
            .server
            .post("/send-marketing")
            .json(&json!({ "campaign_id": f.campaign_id }))
            .await;

        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        let body = response.json::<Value>();
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["status"], json!("failed"));
        assert_eq!(body["failed"], json!(2));
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn dispatch_precondition_failure() {
        let f = fixture(1, None);
        f.store.update_settings(|s| s.is_enabled = false);

        let response = f
            .server
            .post("/send-marketing")
            .json(&json!({ "campaign_id": f.campaign_id }))
            .await;

        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.json::<Value>(),
            json!({ "success": false, "error": "marketing disabled" })
        );
    }

    #[tokio::test]
    async fn dispatch_rejects_malformed_body() {
        let f = fixture(1, None);

        let response = f
            .server
            .post("/send-marketing")
            .json(&json!({ "campaign_id": "not-a-uuid" }))
            .await;

        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<Value>()["success"], json!(false));
        assert_eq!(f.gateway.attempts(), 0);
    }

    #[tokio::test]
    async fn dispatch_conflicts_while_sending() {
        let f = fixture(1, None);
        f.store.update_campaign(f.campaign_id, |c| {
            c.status = "sending".to_string();
            c.updated_at = Utc.with_ymd_and_hms(2024, 3, 11, 17, 0, 0).unwrap();
        });

        let response = f
            .server
            .post("/send-marketing")
            .json(&json!({ "campaign_id": f.campaign_id }))
            .await;

        assert_eq!(response.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            response.json::<Value>()["error"],
            json!("campaign already sending")
        );
    }

    #[tokio::test]
    async fn cors_preflight() {
        let f = fixture(0, Some("s3cret"));

        let response = f
            .server
            .method(Method::OPTIONS, "/functions/v1/send-marketing")
            .add_header(
                HeaderName::from_static("origin"),
                HeaderValue::from_static("https://app.example"),
            )
            .add_header(
                HeaderName::from_static("access-control-request-method"),
                HeaderValue::from_static("POST"),
            )
            .await;

        assert_eq!(response.status_code(), StatusCode::OK);
        assert_eq!(response.header("access-control-allow-origin"), "*");
        assert!(response.text().is_empty());
    }

    #[tokio::test]
    async fn token_is_required_when_configured() {
        let f = fixture(1, Some("s3cret"));

        let response = f
            .server
            .post("/send-marketing")
            .json(&json!({ "campaign_id": f.campaign_id }))
            .await;
        assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.json::<Value>(),
            json!({
                "error": "UNAUTHORIZED",
                "message": "Authentication error: Missing API token"
            })
        );
        assert_eq!(f.gateway.attempts(), 0);

        let response = f
            .server
            .get("/api/v1/marketing/settings")
            .add_header(AUTHORIZATION, HeaderValue::from_static("Bearer wrong"))
            .await;
        assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.json::<Value>()["message"],
            json!("Authentication error: Invalid API token")
        );

        let response = f
            .server
            .post("/send-marketing")
            .add_header(
                HeaderName::from_static("apikey"),
                HeaderValue::from_static("s3cret"),
            )
            .json(&json!({ "campaign_id": f.campaign_id }))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);

        let response = f.server.get("/health/ready").await;
        assert_eq!(response.status_code(), StatusCode::OK);
    }

    #[tokio::test]
    async fn campaign_stats() {
        let f = fixture(3, None);
        f.server
            .post("/send-marketing")
            .json(&json!({ "campaign_id": f.campaign_id, "test_mode": true }))
            .await;

        let response = f
            .server
            .get(&format!("/api/v1/campaigns/{}/stats", f.campaign_id))
            .await;

        assert_eq!(response.status_code(), StatusCode::OK);
        let body = response.json::<Value>();
        assert_eq!(body["status"], json!("paused"));
        assert_eq!(body["sent"], json!(1));
        assert_eq!(body["pending"], json!(2));
        assert_eq!(body["total"], json!(3));

        let response = f
            .server
            .get(&format!("/api/v1/campaigns/{}/stats", Uuid::new_v4()))
            .await;
        assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn settings_read_and_update() {
        let f = fixture(0, None);

        let response = f.server.get("/api/v1/marketing/settings").await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let body = response.json::<Value>();
        assert_eq!(body["warmup_day"], json!(1));
        assert_eq!(body["effective_daily_limit"], json!(20));
        assert_eq!(body["remaining_today"], json!(20));

        let response = f
            .server
            .put("/api/v1/marketing/settings")
            .json(&json!({ "min_delay_seconds": 30, "max_delay_seconds": 10 }))
            .await;
        assert_eq!(response.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(response.json::<Value>()["error"], json!("VALIDATION_ERROR"));

        let response = f
            .server
            .put("/api/v1/marketing/settings")
            .json(&json!({ "warmup_enabled": false, "daily_limit": 250 }))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
        assert_eq!(response.json::<Value>()["effective_daily_limit"], json!(250));
        assert_eq!(f.store.settings().unwrap().daily_limit, 250);
    }

    #[tokio::test]
    async fn gateway_status_reports_probe() {
        let f = fixture(0, None);

        let response = f.server.get("/api/v1/gateway/status").await;
        assert_eq!(
            response.json::<Value>(),
            json!({ "configured": true, "connected": true })
        );

        f.gateway.set_probe(Probe::Disconnected);
        let response = f.server.get("/api/v1/gateway/status").await;
        assert_eq!(response.json::<Value>()["connected"], json!(false));
    }

    #[tokio::test]
    async fn health_routes() {
        let f = fixture(0, None);

        assert_eq!(
            f.server.get("/health").await.json::<Value>(),
            json!({ "status": "healthy" })
        );
        assert_eq!(f.server.get("/health/live").await.status_code(), StatusCode::OK);
        let detailed = f.server.get("/health/detailed").await.json::<Value>();
        assert_eq!(detailed["checks"]["database"]["status"], json!("healthy"));
    }
}
