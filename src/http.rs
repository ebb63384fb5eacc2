//! HTTP server: delivery webhook, batch segment endpoints and the DNC ledger.

use crate::callback::CallbackTransport;
use crate::contact::{DncEntry, DncLedger};
use crate::segment::{apply_batch, batch_view, BatchSegmentForm, SegmentActions, BATCH_SET_ROUTE};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct AppState {
    pub callbacks: Arc<dyn CallbackTransport>,
    pub ledger: Arc<DncLedger>,
    pub segments: Arc<dyn SegmentActions>,
}

/// Build the router over the given state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/mailer/{transport}/callback", post(mailer_callback))
        .route("/dnc", get(list_dnc).delete(clear_dnc))
        .route("/segments/batch/contact/view", get(segment_batch_view))
        .route(BATCH_SET_ROUTE, post(segment_batch_set))
        .fallback(not_found)
        .with_state(state)
}

/// Run the HTTP server until a shutdown signal arrives.
pub async fn run_http_server(
    listener: TcpListener,
    state: AppState,
    mut shutdown: broadcast::Receiver<()>,
) {
    if let Err(e) = axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
    {
        tracing::error!("HTTP server error: {e}");
    }
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "dnc_count": state.ledger.len()
    }))
}

async fn mailer_callback(
    State(state): State<AppState>,
    Path(transport): Path<String>,
    Json(payload): Json<Value>,
) -> Response {
    if transport != state.callbacks.callback_path() {
        return (StatusCode::NOT_FOUND, "Unknown transport").into_response();
    }

    let processed = state.callbacks.process_callback(&payload);
    Json(json!({ "processed": processed })).into_response()
}

async fn list_dnc(State(state): State<AppState>) -> Json<Vec<DncEntry>> {
    Json(state.ledger.entries())
}

async fn clear_dnc(State(state): State<AppState>) -> StatusCode {
    state.ledger.clear();
    StatusCode::NO_CONTENT
}

async fn segment_batch_view(State(state): State<AppState>) -> Response {
    Json(batch_view(state.segments.as_ref())).into_response()
}

async fn segment_batch_set(
    State(state): State<AppState>,
    Json(form): Json<BatchSegmentForm>,
) -> Response {
    Json(apply_batch(state.segments.as_ref(), &form.lead_batch)).into_response()
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not found")
}
