//! HTTP surface of the producer service.
//!
//! - `POST /api/email` checks the body shape, then the token, then the
//!   timestamp, and enqueues the record
//! - `GET /api/health` answers a static liveness string
//!
//! Every email response is a JSON [`EmailResponse`] carrying the correlation
//! id generated for the request.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::{
    clock::{Clock, SystemClock},
    email::{CorrelationId, EmailData},
    publisher::{Publisher, QueueService},
    secret::SecretStore,
    validation::{DefaultValidationHook, ValidationHook, Validator},
};

/// Message of a `200` response.
pub const ACCEPTED_MESSAGE: &str = "Email processed successfully and queued for storage";
/// Message of a `401` response.
pub const INVALID_TOKEN_MESSAGE: &str = "Invalid token";
/// Message of every `400` response.
pub const INVALID_DATA_MESSAGE: &str =
    "Invalid email data - all fields are required and timestamp must be valid";
/// Message of a `500` response.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";
/// Body of `GET /api/health`.
pub const HEALTHY_MESSAGE: &str = "Service is healthy";

/// Request body of `POST /api/email`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailRequest {
    #[serde(default)]
    pub data: Option<EmailData>,
    #[serde(default)]
    pub token: Option<String>,
}

/// Response body of `POST /api/email`, for success and failure alike.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailResponse {
    pub success: bool,
    pub message: String,
    pub correlation_id: CorrelationId,
}

impl EmailResponse {
    /// A `success: true` body.
    pub fn success(message: impl Into<String>, correlation_id: CorrelationId) -> Self {
        Self {
            success: true,
            message: message.into(),
            correlation_id,
        }
    }

    /// A `success: false` body.
    pub fn error(message: impl Into<String>, correlation_id: CorrelationId) -> Self {
        Self {
            success: false,
            message: message.into(),
            correlation_id,
        }
    }
}

/// Shared handler state.
pub struct AppState<ST, S, HK = DefaultValidationHook, C = SystemClock> {
    pub validator: Arc<Validator<ST, HK>>,
    pub publisher: Arc<Publisher<S, C>>,
}

impl<ST, S, HK, C> AppState<ST, S, HK, C> {
    /// Wrap the validator and publisher for sharing across requests.
    pub fn new(validator: Validator<ST, HK>, publisher: Publisher<S, C>) -> Self {
        Self {
            validator: Arc::new(validator),
            publisher: Arc::new(publisher),
        }
    }
}

impl<ST, S, HK, C> Clone for AppState<ST, S, HK, C> {
    fn clone(&self) -> Self {
        Self {
            validator: Arc::clone(&self.validator),
            publisher: Arc::clone(&self.publisher),
        }
    }
}

/// Build the service router with request tracing.
pub fn router<ST, S, HK, C>(state: AppState<ST, S, HK, C>) -> Router
where
    ST: SecretStore + 'static,
    S: QueueService,
    HK: ValidationHook + 'static,
    C: Clock + 'static,
{
    Router::new()
        .route("/api/email", post(submit_email::<ST, S, HK, C>))
        .route("/api/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    HEALTHY_MESSAGE
}

async fn submit_email<ST, S, HK, C>(
    State(state): State<AppState<ST, S, HK, C>>,
    payload: Result<Json<EmailRequest>, JsonRejection>,
) -> (StatusCode, Json<EmailResponse>)
where
    ST: SecretStore + 'static,
    S: QueueService,
    HK: ValidationHook + 'static,
    C: Clock + 'static,
{
    let correlation_id = CorrelationId::generate();
    let (status, message) = handle_email(&state, payload, &correlation_id).await;
    let response = if status.is_success() {
        EmailResponse::success(message, correlation_id)
    } else {
        EmailResponse::error(message, correlation_id)
    };
    (status, Json(response))
}

#[tracing::instrument(skip_all, fields(correlation_id = %correlation_id))]
async fn handle_email<ST, S, HK, C>(
    state: &AppState<ST, S, HK, C>,
    payload: Result<Json<EmailRequest>, JsonRejection>,
    correlation_id: &CorrelationId,
) -> (StatusCode, &'static str)
where
    ST: SecretStore + 'static,
    S: QueueService,
    HK: ValidationHook + 'static,
    C: Clock + 'static,
{
    tracing::info!("Received email processing request");

    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            tracing::warn!(error = %rejection.body_text(), "Malformed request body");
            return (StatusCode::BAD_REQUEST, INVALID_DATA_MESSAGE);
        }
    };

    let Some(token) = request.token.as_deref().filter(|t| !t.trim().is_empty()) else {
        tracing::warn!("Request has no token");
        return (StatusCode::BAD_REQUEST, INVALID_DATA_MESSAGE);
    };

    let Ok(email) = state.validator.validate_fields(request.data.as_ref()) else {
        return (StatusCode::BAD_REQUEST, INVALID_DATA_MESSAGE);
    };

    if state.validator.validate_token(Some(token)).await.is_err() {
        return (StatusCode::UNAUTHORIZED, INVALID_TOKEN_MESSAGE);
    }

    let Ok(email) = state.validator.validate_timestamp(email) else {
        return (StatusCode::BAD_REQUEST, INVALID_DATA_MESSAGE);
    };

    match state.publisher.publish(&email, correlation_id).await {
        Ok(message_id) => {
            tracing::info!(%message_id, "Email processing request completed");
            (StatusCode::OK, ACCEPTED_MESSAGE)
        }
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE),
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, header},
    };
    use http_body_util::BodyExt as _;
    use tower::ServiceExt as _;

    use super::*;
    use crate::{
        email::QueuedMessage,
        secret::{SecretCache, inmemory::InMemorySecretStore},
        transport::{InMemoryQueue, Transport, layers::JsonLayer},
    };

    const TOKEN: &str = "s3cret";

    async fn app(queue: &InMemoryQueue, secrets: &InMemorySecretStore) -> Router {
        let cache = Arc::new(SecretCache::new(secrets.clone()));
        let _ = cache.load().await;
        let validator = Validator::new(cache);
        let publisher = Publisher::new(Transport::new(queue.clone()).layer(JsonLayer));
        router(AppState::new(validator, publisher))
    }

    fn valid_body(token: &str) -> serde_json::Value {
        serde_json::json!({
            "data": {
                "email_subject": "Quarterly report",
                "email_sender": "John doe",
                "email_timestream": "1693561101",
                "email_content": "Numbers attached"
            },
            "token": token
        })
    }

    async fn post(app: Router, body: impl Into<Body>) -> (StatusCode, EmailResponse) {
        let response = app
            .oneshot(
                Request::post("/api/email")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(body.into())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn valid_request_is_enqueued() {
        let queue = InMemoryQueue::default();
        let app = app(&queue, &InMemorySecretStore::new(TOKEN)).await;

        let (status, response) = post(app, valid_body(TOKEN).to_string()).await;

        assert_eq!(status, StatusCode::OK);
        assert!(response.success);
        assert_eq!(response.message, ACCEPTED_MESSAGE);

        let pending = queue.pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(
            pending[0].envelope.attribute("correlationId"),
            Some(response.correlation_id.as_str())
        );
        let message: QueuedMessage = serde_json::from_str(&pending[0].envelope.message).unwrap();
        assert_eq!(message.correlation_id, Some(response.correlation_id));
        assert_eq!(message.email_sender.as_deref(), Some("John doe"));
    }

    #[tokio::test]
    async fn wrong_token_is_unauthorized() {
        let queue = InMemoryQueue::default();
        let app = app(&queue, &InMemorySecretStore::new(TOKEN)).await;

        let (status, response) = post(app, valid_body("S3CRET").to_string()).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(!response.success);
        assert_eq!(response.message, INVALID_TOKEN_MESSAGE);
        assert!(!response.correlation_id.as_str().is_empty());
        assert!(queue.pending().await.is_empty());
    }

    #[tokio::test]
    async fn missing_token_is_a_bad_request() {
        let queue = InMemoryQueue::default();
        let app = app(&queue, &InMemorySecretStore::new(TOKEN)).await;
        let mut body = valid_body(TOKEN);
        body.as_object_mut().unwrap().remove("token");

        let (status, response) = post(app, body.to_string()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response.message, INVALID_DATA_MESSAGE);
        assert!(queue.pending().await.is_empty());
    }

    #[tokio::test]
    async fn blank_token_is_a_bad_request() {
        let queue = InMemoryQueue::default();
        let app = app(&queue, &InMemorySecretStore::new(TOKEN)).await;

        let (status, _) = post(app, valid_body("  ").to_string()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn blank_field_wins_over_wrong_token() {
        let queue = InMemoryQueue::default();
        let app = app(&queue, &InMemorySecretStore::new(TOKEN)).await;
        let mut body = valid_body("WRONG");
        body["data"]["email_subject"] = "".into();

        let (status, response) = post(app, body.to_string()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response.message, INVALID_DATA_MESSAGE);
    }

    #[tokio::test]
    async fn wrong_token_wins_over_bad_timestamp() {
        let queue = InMemoryQueue::default();
        let app = app(&queue, &InMemorySecretStore::new(TOKEN)).await;
        let mut body = valid_body("WRONG");
        body["data"]["email_timestream"] = "yesterday".into();

        let (status, _) = post(app, body.to_string()).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unavailable_secret_store_is_unauthorized() {
        let queue = InMemoryQueue::default();
        let secrets = InMemorySecretStore::new(TOKEN);
        secrets.set_failing(true);
        let app = app(&queue, &secrets).await;

        let (status, response) = post(app, valid_body(TOKEN).to_string()).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(response.message, INVALID_TOKEN_MESSAGE);
    }

    #[tokio::test]
    async fn blank_field_is_a_bad_request() {
        let queue = InMemoryQueue::default();
        let app = app(&queue, &InMemorySecretStore::new(TOKEN)).await;
        let mut body = valid_body(TOKEN);
        body["data"]["email_content"] = "   ".into();

        let (status, response) = post(app, body.to_string()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response.message, INVALID_DATA_MESSAGE);
        assert!(queue.pending().await.is_empty());
    }

    #[tokio::test]
    async fn non_positive_timestamp_is_a_bad_request() {
        let queue = InMemoryQueue::default();
        let app = app(&queue, &InMemorySecretStore::new(TOKEN)).await;
        let mut body = valid_body(TOKEN);
        body["data"]["email_timestream"] = "0".into();

        let (status, _) = post(app, body.to_string()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_json_is_a_bad_request_with_correlation_id() {
        let queue = InMemoryQueue::default();
        let app = app(&queue, &InMemorySecretStore::new(TOKEN)).await;

        let (status, response) = post(app, "{\"data\": ").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!response.success);
        assert!(!response.correlation_id.as_str().is_empty());
    }

    #[tokio::test]
    async fn missing_data_is_a_bad_request() {
        let queue = InMemoryQueue::default();
        let app = app(&queue, &InMemorySecretStore::new(TOKEN)).await;

        let (status, _) = post(app, serde_json::json!({ "token": TOKEN }).to_string()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn queue_failure_is_an_internal_error() {
        let queue = InMemoryQueue::default();
        queue.set_send_failing(true).await;
        let app = app(&queue, &InMemorySecretStore::new(TOKEN)).await;

        let (status, response) = post(app, valid_body(TOKEN).to_string()).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.message, INTERNAL_ERROR_MESSAGE);
    }

    #[tokio::test]
    async fn each_request_gets_its_own_correlation_id() {
        let queue = InMemoryQueue::default();
        let app = app(&queue, &InMemorySecretStore::new(TOKEN)).await;

        let (_, first) = post(app.clone(), valid_body(TOKEN).to_string()).await;
        let (_, second) = post(app, valid_body(TOKEN).to_string()).await;

        assert_ne!(first.correlation_id, second.correlation_id);
    }

    #[tokio::test]
    async fn health_is_static() {
        let app = app(&InMemoryQueue::default(), &InMemorySecretStore::new(TOKEN)).await;

        let response = app
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], HEALTHY_MESSAGE.as_bytes());
    }
}
