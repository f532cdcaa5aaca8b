//! Grower dashboard values: `GET /dashboard?sensor=<name>`.
//!
//! Reads the single latest reading of a sensor and classifies it. Without a
//! `sensor` parameter the first active sensor is used.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::{store, AppState, DashboardValues};

// ---

pub fn router() -> Router<AppState> {
    Router::new().route("/dashboard", get(handler))
}

#[derive(Debug, Deserialize)]
pub struct DashboardQuery {
    sensor: Option<String>,
}

async fn handler(
    State(state): State<AppState>,
    Query(params): Query<DashboardQuery>,
) -> AppResult<Json<DashboardValues>> {
    // ---
    let mut conn = state.pool.acquire().await?;

    let sensor_name = match params.sensor.filter(|s| !s.trim().is_empty()) {
        Some(name) => store::get_sensor_by_name(&mut conn, &name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Sensor '{name}' not found")))?
            .name,
        None => store::active_sensors(&mut conn)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound("No active sensors".to_string()))?
            .name,
    };

    let latest = store::latest(&mut conn, &sensor_name, 1).await?;
    drop(conn);

    // No reading yet is a normal state for a freshly registered sensor
    let reading = latest
        .first()
        .ok_or_else(|| AppError::NotFound(format!("No readings for sensor '{sensor_name}'")))?;

    let levels = state.classifier.classify_reading(reading)?;
    info!(
        "GET /dashboard - sensor '{}' ({}): N={} P={} K={}",
        sensor_name, reading.crop_name, levels.level_n, levels.level_p, levels.level_k
    );

    Ok(Json(DashboardValues::new(reading, levels)))
}
