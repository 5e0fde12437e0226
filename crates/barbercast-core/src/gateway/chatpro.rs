//! ChatPro WhatsApp API client

use super::{GatewayConnector, GatewayError, GatewayStatus, MessageGateway};
use async_trait::async_trait;
use barbercast_common::types::PhoneNumber;
use barbercast_storage::models::GatewayConfig;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const STATUS_PATH: &str = "/api/v1/status";
const SEND_MESSAGE_PATH: &str = "/api/v1/send_message";
const SEND_FILE_PATH: &str = "/api/v1/send_message_file_from_url";

/// Longest error body kept in a `Rejected` error
const MAX_ERROR_BODY: usize = 500;

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    number: &'a str,
    message: &'a str,
}

#[derive(Debug, Serialize)]
struct SendFileRequest<'a> {
    number: &'a str,
    url: &'a str,
    caption: &'a str,
}

/// Client for one ChatPro instance
pub struct ChatProClient {
    base_url: String,
    token: String,
    client: Client,
}

impl ChatProClient {
    /// Create a client over a shared HTTP client
    pub fn new(client: Client, base_url: &str, token: &str) -> Self {
        Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            token: token.trim().to_string(),
            client,
        }
    }

    fn build_request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        // ChatPro expects the raw token, no scheme
        self.client
            .request(method, &url)
            .header("Authorization", &self.token)
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<(), GatewayError> {
        let response = self
            .build_request(reqwest::Method::POST, path)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!(path = path, status = status.as_u16(), "Gateway accepted message");
            Ok(())
        } else {
            Err(rejected(response).await)
        }
    }
}

async fn rejected(response: reqwest::Response) -> GatewayError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_else(|e| {
        warn!("Failed to read gateway response body: {}", e);
        String::new()
    });
    GatewayError::Rejected {
        status,
        body: body.chars().take(MAX_ERROR_BODY).collect(),
    }
}

/// Whether a status payload reports a live session.
///
/// `None` when the payload carries no recognizable indicator.
fn connected_from(body: &Value) -> Option<bool> {
    fn indicator(value: &Value) -> Option<bool> {
        if let Some(connected) = value.get("connected").and_then(Value::as_bool) {
            return Some(connected);
        }
        ["status", "state"].iter().find_map(|key| {
            value.get(*key).and_then(Value::as_str).map(|s| {
                matches!(
                    s.to_ascii_lowercase().as_str(),
                    "connected" | "open" | "authenticated"
                )
            })
        })
    }

    indicator(body).or_else(|| body.get("data").and_then(indicator))
}

#[async_trait]
impl MessageGateway for ChatProClient {
    async fn status(&self) -> Result<GatewayStatus, GatewayError> {
        let response = self
            .build_request(reqwest::Method::GET, STATUS_PATH)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(rejected(response).await);
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))?;

        connected_from(&body)
            .map(|connected| GatewayStatus { connected })
            .ok_or_else(|| GatewayError::Decode(format!("no connection state in {}", body)))
    }

    async fn send_text(&self, to: &PhoneNumber, message: &str) -> Result<(), GatewayError> {
        self.post(
            SEND_MESSAGE_PATH,
            &SendMessageRequest {
                number: to.as_str(),
                message,
            },
        )
        .await
    }

    async fn send_image(
        &self,
        to: &PhoneNumber,
        image_url: &str,
        caption: &str,
    ) -> Result<(), GatewayError> {
        self.post(
            SEND_FILE_PATH,
            &SendFileRequest {
                number: to.as_str(),
                url: image_url,
                caption,
            },
        )
        .await
    }
}

/// Builds [`ChatProClient`]s sharing one connection pool
#[derive(Clone)]
pub struct ChatProConnector {
    client: Client,
}

impl ChatProConnector {
    pub fn new(timeout: Duration) -> Result<Self, GatewayError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

impl GatewayConnector for ChatProConnector {
    fn connect(&self, config: &GatewayConfig) -> Result<Arc<dyn MessageGateway>, GatewayError> {
        if !config.is_configured() {
            return Err(GatewayError::NotConfigured);
        }

        match (config.api_endpoint.as_deref(), config.api_token.as_deref()) {
            (Some(endpoint), Some(token)) => Ok(Arc::new(ChatProClient::new(
                self.client.clone(),
                endpoint,
                token,
            ))),
            _ => Err(GatewayError::NotConfigured),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use uuid::Uuid;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> ChatProClient {
        // Trailing slash must not produce a double slash in request paths
        ChatProClient::new(Client::new(), &format!("{}/", server.uri()), "secret-token")
    }

    fn phone() -> PhoneNumber {
        PhoneNumber::normalize("11999998888", "55").unwrap()
    }

    #[tokio::test]
    async fn test_send_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/send_message"))
            .and(header("Authorization", "secret-token"))
            .and(body_json(json!({
                "number": "5511999998888",
                "message": "Oi Ana"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "sent"})))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).send_text(&phone(), "Oi Ana").await.unwrap();
    }

    #[tokio::test]
    async fn test_send_image() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/send_message_file_from_url"))
            .and(body_json(json!({
                "number": "5511999998888",
                "url": "https://cdn.example/promo.png",
                "caption": "Promo"
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .send_image(&phone(), "https://cdn.example/promo.png", "Promo")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_rejected_send_keeps_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/send_message"))
            .respond_with(ResponseTemplate::new(400).set_body_string("x".repeat(800)))
            .mount(&server)
            .await;

        let err = client(&server).send_text(&phone(), "hi").await.unwrap_err();
        match err {
            GatewayError::Rejected { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body.len(), MAX_ERROR_BODY);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_status_connected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/status"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"data": {"state": "OPEN"}})),
            )
            .mount(&server)
            .await;

        let status = client(&server).status().await.unwrap();
        assert!(status.connected);
    }

    #[tokio::test]
    async fn test_status_disconnected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"connected": false})))
            .mount(&server)
            .await;

        let status = client(&server).status().await.unwrap();
        assert!(!status.connected);
    }

    #[tokio::test]
    async fn test_status_without_indicator_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let err = client(&server).status().await.unwrap_err();
        assert!(matches!(err, GatewayError::Decode(_)));
    }

    #[test]
    fn test_connected_from_payloads() {
        assert_eq!(connected_from(&json!({"connected": true})), Some(true));
        assert_eq!(connected_from(&json!({"status": "Authenticated"})), Some(true));
        assert_eq!(connected_from(&json!({"status": "disconnected"})), Some(false));
        assert_eq!(connected_from(&json!({"message": "ok"})), None);
    }

    #[test]
    fn test_connector_requires_configuration() {
        let connector = ChatProConnector::new(Duration::from_secs(5)).unwrap();
        let mut config = GatewayConfig {
            id: Uuid::new_v4(),
            enabled: true,
            api_endpoint: Some("https://v5.chatpro.com.br/chatpro-abc".to_string()),
            api_token: None,
            instance_id: None,
            updated_at: Utc::now(),
        };
        assert!(matches!(
            connector.connect(&config),
            Err(GatewayError::NotConfigured)
        ));

        config.api_token = Some("token".to_string());
        assert!(connector.connect(&config).is_ok());
    }
}
