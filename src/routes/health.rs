// src/routes/health.rs
//! Liveness endpoint for the rootsage service.
//!
//! Used by container orchestrators and CI to check that the process is up and
//! answering HTTP. It is a sibling module in the `routes` directory and
//! follows the Explicit Module Boundary Pattern (EMBP): the gateway merges the
//! subrouter exported here, so `main.rs` never sees individual endpoints.

use axum::{routing::get, Json, Router};
use serde::Serialize;

/// JSON response body for the `/health` endpoint.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Handle `GET /health`. Does not touch the database or the classifier.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Subrouter with the `/health` route, generic over the gateway state so it
/// merges regardless of the state type.
pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/health", get(health))
}
