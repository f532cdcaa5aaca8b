//! Sensor data ingestion.
//!
//! - `POST /api/data` stores one reading from a registered sensor
//! - `GET /api/data?n=10` returns the newest readings across all sensors

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{AppError, AppResult, StoreError};
use crate::{store, AppState, NewReading, Reading};

// ---

const DEFAULT_LATEST: u32 = 10;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/data", post(add_reading).get(latest_readings))
}

/// Query parameters for `GET /api/data`.
#[derive(Debug, Deserialize)]
pub struct LatestQuery {
    n: Option<u32>,
}

async fn add_reading(
    State(state): State<AppState>,
    body: Result<Json<NewReading>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Reading>)> {
    // ---
    let Json(body) = body?;
    if let Some(field) = body.invalid_field() {
        return Err(AppError::BadRequest(format!(
            "Invalid data format: '{field}' must be a non-negative number"
        )));
    }

    let mut conn = state.pool.acquire().await?;
    let stored = store::append(&mut conn, &body).await.map_err(|e| match e {
        StoreError::Constraint(_) => {
            AppError::Conflict(format!("Sensor {} does not exist", body.sensor_id))
        }
        other => other.into(),
    })?;

    info!("POST /api/data - stored reading {} from sensor {}", stored.id, stored.sensor_id);
    Ok((StatusCode::CREATED, Json(stored)))
}

async fn latest_readings(
    State(state): State<AppState>,
    params: Result<Query<LatestQuery>, QueryRejection>,
) -> AppResult<Json<Vec<Reading>>> {
    // ---
    let Query(params) = params?;
    let n = params.n.unwrap_or(DEFAULT_LATEST);
    debug!("GET /api/data - latest {}", n);

    let mut conn = state.pool.acquire().await?;
    Ok(Json(store::latest_all(&mut conn, n).await?))
}
