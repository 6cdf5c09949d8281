//! Out-of-process services reached over HTTP.
//!
//! The request envelope is POSTed as JSON to the service's endpoint and the
//! JSON reply is handed back for normalization. Whatever the remote side
//! answers (envelope, bare data, an HTML error page) ends up as an envelope.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::contract::envelope::RawReply;
use crate::contract::service::{Service, ServiceError};
use crate::contract::types::{RequestEnvelope, ServiceId};

/// Default per-request timeout for remote calls, in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

pub struct RemoteService {
    id: ServiceId,
    endpoint: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl RemoteService {
    pub fn new(id: impl Into<ServiceId>, endpoint: impl Into<String>) -> Result<Self, ServiceError> {
        Self::with_timeout(id, endpoint, Duration::from_millis(DEFAULT_TIMEOUT_MS))
    }

    pub fn with_timeout(
        id: impl Into<ServiceId>,
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::Transport(e.to_string()))?;
        Ok(Self {
            id: id.into(),
            endpoint: endpoint.into(),
            timeout,
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Service for RemoteService {
    fn id(&self) -> &ServiceId {
        &self.id
    }

    async fn invoke(&self, request: RequestEnvelope) -> Result<RawReply, ServiceError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ServiceError::Timeout(self.timeout)
                } else {
                    ServiceError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        match serde_json::from_str::<Value>(&body) {
            Ok(value) if status.is_success() || is_envelope(&value) => Ok(RawReply::Json(value)),
            Err(_) if status.is_success() => Ok(RawReply::Json(Value::String(body))),
            _ => Err(ServiceError::Transport(format!(
                "{} answered HTTP {}",
                self.endpoint,
                status.as_u16()
            ))),
        }
    }
}

/// A non-2xx reply only counts as an answer when it is a response envelope.
/// Any other body on an error status is a gateway or framework error page.
fn is_envelope(value: &Value) -> bool {
    value.get("success").map_or(false, Value::is_boolean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Json, Router};
    use serde_json::json;

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/invoke", addr)
    }

    #[tokio::test]
    async fn test_posts_envelope_and_returns_json() {
        let app = Router::new().route(
            "/invoke",
            post(|Json(req): Json<RequestEnvelope>| async move {
                Json(json!({"success": true, "data": {"echo": req.action}}))
            }),
        );
        let endpoint = spawn(app).await;

        let svc = RemoteService::new("health-death", endpoint).unwrap();
        let reply = svc
            .invoke(RequestEnvelope::with_json("get_death_stats", json!({})))
            .await
            .unwrap();
        assert_eq!(
            reply,
            RawReply::Json(json!({"success": true, "data": {"echo": "get_death_stats"}}))
        );
    }

    #[tokio::test]
    async fn test_non_json_error_page_is_transport_error() {
        let app = Router::new().route(
            "/invoke",
            post(|| async { (axum::http::StatusCode::BAD_GATEWAY, "<html>bad gateway</html>") }),
        );
        let endpoint = spawn(app).await;

        let svc = RemoteService::new("health-death", endpoint).unwrap();
        let err = svc
            .invoke(RequestEnvelope::with_json("x", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Transport(msg) if msg.contains("502")));
    }

    #[tokio::test]
    async fn test_error_status_with_json_body_is_transport_error() {
        let app = Router::new().route(
            "/invoke",
            post(|| async {
                (
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"message": "database connection lost"})),
                )
            }),
        );
        let endpoint = spawn(app).await;

        let svc = RemoteService::new("health-death", endpoint).unwrap();
        let result = svc.invoke(RequestEnvelope::with_json("x", json!({}))).await;
        assert!(matches!(&result, Err(ServiceError::Transport(msg)) if msg.contains("500")));

        let envelope = crate::contract::envelope::normalize(result);
        assert!(!envelope.is_success());
        assert_eq!(
            envelope.error_body().unwrap().code,
            crate::contract::types::ErrorCode::ServiceUnavailable
        );
    }

    #[tokio::test]
    async fn test_error_status_with_envelope_body_is_passed_through() {
        let app = Router::new().route(
            "/invoke",
            post(|| async {
                (
                    axum::http::StatusCode::UNPROCESSABLE_ENTITY,
                    Json(json!({"success": false, "error": "animal A-9 not found"})),
                )
            }),
        );
        let endpoint = spawn(app).await;

        let svc = RemoteService::new("health-death", endpoint).unwrap();
        let reply = svc
            .invoke(RequestEnvelope::with_json("x", json!({})))
            .await
            .unwrap();
        assert_eq!(
            reply,
            RawReply::Json(json!({"success": false, "error": "animal A-9 not found"}))
        );
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        // Bind then drop to get a port nothing listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let svc = RemoteService::with_timeout(
            "health-death",
            format!("http://{}/invoke", addr),
            Duration::from_secs(2),
        )
        .unwrap();
        let err = svc
            .invoke(RequestEnvelope::with_json("x", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Transport(_) | ServiceError::Timeout(_)));
    }
}
