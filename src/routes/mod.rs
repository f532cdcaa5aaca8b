//! Route gateway: assembles the sibling route modules into one router.
//!
//! Ingestion and admin routes under `/api` require the configured API key in
//! the `X-API-KEY` header. Dashboard and report routes sit behind whatever
//! session layer fronts this service.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::{self, Next},
    response::Response,
    Router,
};
use sqlx::SqlitePool;

use crate::error::AppError;
use crate::{Config, NutrientClassifier, ReportEngine};

mod crops;
mod dashboard;
mod health;
mod readings;
mod report;
mod sensors;

// ---

pub const API_KEY_HEADER: &str = "X-API-KEY";

/// Shared, read-only state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    // ---
    pub pool: SqlitePool,
    pub config: Arc<Config>,
    pub classifier: Arc<NutrientClassifier>,
    pub reports: ReportEngine,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: Config, classifier: Arc<NutrientClassifier>) -> Self {
        // ---
        AppState {
            pool,
            config: Arc::new(config),
            reports: ReportEngine::new(classifier.clone()),
            classifier,
        }
    }
}

pub fn router(state: AppState) -> Router {
    // ---
    let api = Router::new()
        .merge(crops::router())
        .merge(sensors::router())
        .merge(readings::router())
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .merge(api)
        .merge(dashboard::router())
        .merge(report::router())
        .merge(health::router())
        .with_state(state)
}

async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    // ---
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    if provided != Some(state.config.api_key.as_str()) {
        tracing::warn!("Rejected {} {}: missing or wrong API key", request.method(), request.uri());
        return Err(AppError::Unauthorized);
    }
    Ok(next.run(request).await)
}
