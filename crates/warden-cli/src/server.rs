//! HTTP boundary for the form-review feature.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use warden_core::{FieldSuggestion, Importance};
use warden_runtime::{CachedFormReview, FormReviewRequest};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    reviewer: Arc<CachedFormReview>,
}

impl AppState {
    pub fn new(reviewer: CachedFormReview) -> Self {
        Self {
            reviewer: Arc::new(reviewer),
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub backend_configured: bool,
    pub evaluator: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/form-review", post(review_form))
        .route("/healthz", get(healthz))
        .with_state(state)
}

/// `POST /api/form-review`. Always answers with a suggestion array.
async fn review_form(
    State(state): State<AppState>,
    body: Bytes,
) -> (StatusCode, Json<Vec<FieldSuggestion>>) {
    let request: FormReviewRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(error = %e, "Rejecting malformed form-review request");
            return (
                StatusCode::BAD_REQUEST,
                Json(vec![FieldSuggestion::general(
                    Importance::Error,
                    format!("Invalid review request: {}", e),
                )]),
            );
        }
    };

    let suggestions = state.reviewer.review(&request).await;
    (StatusCode::OK, Json(suggestions))
}

async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    let generator = state.reviewer.adapter().generator();
    Json(HealthResponse {
        status: "ok",
        backend_configured: generator.is_configured(),
        evaluator: generator.evaluator_name().to_string(),
    })
}

/// Serve until Ctrl-C.
pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    tracing::info!(%addr, "Warden gateway listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await
        .context("server error")
}
