//! HTTP front door.
//!
//! Translates JSON requests into dispatcher and store calls and shapes the
//! responses the PWA expects:
//!
//! - `POST /send-push-notification` - dispatch a notification
//! - `POST /push-subscriptions` - register a browser subscription
//! - `DELETE /push-subscriptions` - remove a browser subscription
//! - `GET /vapid-public-key` - key browsers subscribe with
//! - `GET /health` - liveness
//!
//! Every route allows any origin; `OPTIONS` preflights get an empty 200.
//!
//! # Modules
//!
//! - [`types`] - Request/response bodies

// Rust guideline compliant 2026-02

pub mod types;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderName, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::constants::{
    endpoint_for_log, CORS_ALLOWED_HEADERS, SEND_ROUTE, SUBSCRIPTIONS_ROUTE,
    VAPID_PUBLIC_KEY_ROUTE,
};
use crate::notifications::{
    DispatchError, Dispatcher, FileSubscriptionStore, NotificationRequest, StoreError,
    SubscriptionStore, WebPushClient,
};
use types::{
    ErrorResponse, RegisterSubscriptionRequest, SendPushRequest, SendPushResponse,
    UnsubscribeRequest,
};

/// Shared state behind every route.
#[derive(Debug)]
pub struct AppState {
    /// Dispatcher; also owns the subscription store.
    pub dispatcher: Dispatcher,
}

/// Error returned from a handler, rendered as `{"error": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            log::error!("[Http] {}: {}", self.status, self.message);
        } else {
            log::warn!("[Http] {}: {}", self.status, self.message);
        }
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

impl From<DispatchError> for ApiError {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::InvalidRequest(_) => Self::bad_request(e.to_string()),
            DispatchError::Configuration(_) | DispatchError::Store(_) => {
                Self::internal(e.to_string())
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        Self::internal(e.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

/// Build the router over `state`.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(SEND_ROUTE, post(send_push_notification))
        .route(
            SUBSCRIPTIONS_ROUTE,
            post(register_subscription).delete(remove_subscription),
        )
        .route(VAPID_PUBLIC_KEY_ROUTE, get(vapid_public_key))
        .route("/health", get(health))
        .layer(cors_layer())
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(
            CORS_ALLOWED_HEADERS
                .iter()
                .copied()
                .map(HeaderName::from_static)
                .collect::<Vec<_>>(),
        )
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
}

async fn send_push_notification(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SendPushRequest>, JsonRejection>,
) -> Result<Json<SendPushResponse>, ApiError> {
    let Json(body) = body?;
    let request = NotificationRequest::from(body);
    let report = state.dispatcher.dispatch(&request).await?;
    Ok(Json(SendPushResponse::from(&report)))
}

async fn register_subscription(
    State(state): State<Arc<AppState>>,
    body: Result<Json<RegisterSubscriptionRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body?;
    if let Some(field) = body.missing_field() {
        return Err(ApiError::bad_request(format!("{field} is required")));
    }

    let subscription = body.into_subscription();
    log::info!(
        "[Http] Registering {}... for {:?}",
        endpoint_for_log(&subscription.endpoint),
        subscription.owner_id
    );
    state.dispatcher.store().upsert(subscription).await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "message": "Subscription saved" })),
    )
        .into_response())
}

async fn remove_subscription(
    State(state): State<Arc<AppState>>,
    body: Result<Json<UnsubscribeRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(body) = body?;
    if body.endpoint.trim().is_empty() {
        return Err(ApiError::bad_request("endpoint is required"));
    }

    let removed = state
        .dispatcher
        .store()
        .delete_by_endpoint(&body.endpoint)
        .await?;
    let message = if removed {
        "Subscription removed"
    } else {
        "Subscription not found"
    };
    Ok(Json(serde_json::json!({ "message": message, "removed": removed })))
}

async fn vapid_public_key(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let identity = state
        .dispatcher
        .vapid()
        .ok_or_else(|| ApiError::internal("VAPID keys are not configured"))?;
    Ok(Json(
        serde_json::json!({ "publicKey": identity.keys().public_key_base64url() }),
    ))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Assemble a dispatcher from configuration: file store, web push client
/// and the VAPID identity.
pub async fn dispatcher_from_config(config: &Config) -> Result<Dispatcher> {
    let vapid = config.vapid_identity()?;
    if vapid.is_none() {
        log::warn!("[WebPush] VAPID keys not set; notifications will be refused until configured");
    }

    let store = FileSubscriptionStore::open(&config.store_path)
        .await
        .with_context(|| {
            format!(
                "Failed to open subscription store {}",
                config.store_path.display()
            )
        })?;

    let delivery = WebPushClient::with_timeout(config.delivery_timeout())
        .context("Failed to build HTTP client")?
        .ttl(config.ttl_secs);

    Ok(Dispatcher::new(
        Arc::new(store) as Arc<dyn SubscriptionStore>,
        Arc::new(delivery),
        vapid,
    )
    .delivery_timeout(config.delivery_timeout())
    .max_in_flight(config.max_in_flight))
}

/// Run the front door until Ctrl-C.
pub async fn run(config: Config) -> Result<()> {
    let dispatcher = dispatcher_from_config(&config).await?;
    let app = router(Arc::new(AppState { dispatcher }));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    log::info!("[Http] Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    log::info!("[Http] Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
}
