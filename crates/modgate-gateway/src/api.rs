//! HTTP route handlers.

use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use modgate_core::{OperationKind, Platform};

use crate::state::AppState;

const PLATFORM_UNSUPPORTED: &str = "The specified platform is not supported.";
const OVERLOADED: &str = "Too many requests in flight.";

// ---------------------------------------------------------------------------
// GET /platforms
// ---------------------------------------------------------------------------

/// List the platforms this gateway serves.
pub async fn platforms(State(state): State<Arc<AppState>>) -> Json<Vec<Platform>> {
    Json(state.config.platforms.clone())
}

// ---------------------------------------------------------------------------
// POST /{platform}/run, POST /{platform}/asm
// ---------------------------------------------------------------------------

pub async fn run(State(state): State<Arc<AppState>>, Path(platform): Path<String>, body: Body) -> Response {
    relay(&state, &platform, OperationKind::Execute, body).await
}

pub async fn asm(State(state): State<Arc<AppState>>, Path(platform): Path<String>, body: Body) -> Response {
    relay(&state, &platform, OperationKind::Disassemble, body).await
}

/// Validate, admit, relay. The permit lives until the relay has finished
/// or this future is dropped.
async fn relay(state: &AppState, platform: &str, operation: OperationKind, body: Body) -> Response {
    let Some(platform) = state.supported_platform(platform) else {
        tracing::debug!(platform, %operation, "rejected unsupported platform");
        return (StatusCode::BAD_REQUEST, PLATFORM_UNSUPPORTED).into_response();
    };

    let Some(_permit) = state.admission.try_admit() else {
        tracing::debug!(%platform, %operation, limit = state.admission.limit(), "admission refused");
        return (StatusCode::TOO_MANY_REQUESTS, OVERLOADED).into_response();
    };

    match state.provider.relay(platform, operation, body).await {
        Ok(output) => (StatusCode::OK, output).into_response(),
        Err(e) => {
            tracing::warn!(%platform, %operation, error = %e, "relay failed");
            e.into_response()
        }
    }
}
