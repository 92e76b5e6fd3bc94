//! HTTP bindings for the provider side of DSP contract negotiation.
//!
//! Endpoints:
//! - GET  /health
//! - GET  /negotiations/{providerPid}
//! - POST /negotiations/request
//! - POST /negotiations/{providerPid}/request
//! - POST /negotiations/{providerPid}/events
//! - POST /negotiations/{providerPid}/agreement/verification
//! - POST /negotiations/{providerPid}/termination
//!
//! Consumer callback bindings are not served.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use negotiation_core::{NegotiationDocument, NegotiationRecord};

use crate::config::ServerConfig;
use crate::error::{ApiError, ApiResult, ServerError};
use crate::negotiation::NegotiationService;
use crate::store::NegotiationStore;
use crate::validation;

/// State shared across request handlers.
pub struct AppState {
    pub service: NegotiationService,
    pub started_at: Instant,
}

type SharedState = State<Arc<AppState>>;

fn document(record: &NegotiationRecord) -> Json<NegotiationDocument> {
    Json(NegotiationDocument::from(record))
}

fn json_body(body: Result<Json<Value>, JsonRejection>) -> ApiResult<Value> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ApiError::BadRequest(vec![rejection.body_text()]))
}

/// Build the router with every binding and the error fallback. Unknown
/// paths and unsupported methods on known paths share the 404 envelope.
pub fn build_router(service: NegotiationService, max_body_bytes: usize) -> Router {
    let state = Arc::new(AppState {
        service,
        started_at: Instant::now(),
    });

    Router::new()
        .route("/health", get(handle_health))
        .route("/negotiations/request", post(handle_request))
        .route("/negotiations/{provider_pid}", get(handle_get))
        .route("/negotiations/{provider_pid}/request", post(handle_offer_request))
        .route("/negotiations/{provider_pid}/events", post(handle_event))
        .route(
            "/negotiations/{provider_pid}/agreement/verification",
            post(handle_verification),
        )
        .route("/negotiations/{provider_pid}/termination", post(handle_termination))
        .method_not_allowed_fallback(handle_route_not_found)
        .fallback(handle_route_not_found)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

async fn handle_route_not_found() -> ApiError {
    ApiError::RouteNotFound
}

/// GET /health
async fn handle_health(State(state): SharedState) -> impl IntoResponse {
    let response = serde_json::json!({
        "message": "Server is running",
        "uptime": state.started_at.elapsed().as_secs_f64(),
    });
    (StatusCode::OK, Json(response))
}

/// GET /negotiations/{providerPid}
async fn handle_get(
    State(state): SharedState,
    Path(provider_pid): Path<String>,
) -> ApiResult<Json<NegotiationDocument>> {
    let record = state.service.get_negotiation(&provider_pid).await?;
    Ok(document(&record))
}

/// POST /negotiations/request
async fn handle_request(
    State(state): SharedState,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<NegotiationDocument>)> {
    let body = json_body(body)?;
    let message = validation::validate_contract_request(&body)?;
    let record = state.service.request_negotiation(&message).await?;
    Ok((StatusCode::CREATED, document(&record)))
}

/// POST /negotiations/{providerPid}/request
async fn handle_offer_request(
    State(state): SharedState,
    Path(provider_pid): Path<String>,
) -> ApiResult<Json<NegotiationDocument>> {
    let record = state.service.accept_offer(&provider_pid).await?;
    Ok(document(&record))
}

/// POST /negotiations/{providerPid}/events
async fn handle_event(
    State(state): SharedState,
    Path(provider_pid): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<NegotiationDocument>> {
    let body = json_body(body)?;
    let event = validation::validate_event(&provider_pid, &body)?;
    let record = state.service.handle_event(&provider_pid, event).await?;
    Ok(document(&record))
}

/// POST /negotiations/{providerPid}/agreement/verification
async fn handle_verification(
    State(state): SharedState,
    Path(provider_pid): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<NegotiationDocument>> {
    let body = json_body(body)?;
    validation::validate_agreement_verification(&provider_pid, &body)?;
    let record = state.service.verify_agreement(&provider_pid).await?;
    Ok(document(&record))
}

/// POST /negotiations/{providerPid}/termination
async fn handle_termination(
    State(state): SharedState,
    Path(provider_pid): Path<String>,
) -> ApiResult<Json<NegotiationDocument>> {
    let record = state.service.terminate(&provider_pid).await?;
    Ok(document(&record))
}

/// Negotiation server.
pub struct Server {
    config: ServerConfig,
    service: NegotiationService,
}

impl Server {
    pub fn new(config: ServerConfig, store: Arc<dyn NegotiationStore>) -> Self {
        Self {
            config,
            service: NegotiationService::new(store),
        }
    }

    pub fn router(&self) -> Router {
        build_router(self.service.clone(), self.config.max_body_bytes)
    }

    /// Serve until Ctrl+C.
    pub async fn run(self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(
            "Negotiation server listening on http://{} ({:?})",
            listener.local_addr()?,
            self.config.environment
        );

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shut down");
        Ok(())
    }
}

/// Wait for Ctrl+C.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received shutdown signal"),
        Err(e) => {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
