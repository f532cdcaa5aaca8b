//! Sensor administration.
//!
//! - `POST /api/sensors` registers a sensor bound to an existing crop
//! - `GET /api/sensors` lists active sensors (the dashboard selector)
//! - `GET /api/sensors/{id}` fetches one sensor
//! - `PUT /api/sensors/{id}` replaces all mutable fields in one write

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::info;

use crate::error::{AppError, AppResult, StoreError};
use crate::{store, AppState, NewSensor, Sensor, SensorUpdate};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/api/sensors", post(add_sensor).get(active_sensors))
        .route("/api/sensors/{id}", get(get_sensor).put(update_sensor))
}

/// Constraint failures on sensors are either a taken name or a missing crop.
fn sensor_conflict(err: StoreError) -> AppError {
    match err {
        StoreError::Constraint(_) => {
            AppError::Conflict("Sensor already exists or crop does not exist".to_string())
        }
        other => other.into(),
    }
}

fn check_name(name: &str) -> AppResult<()> {
    if name.trim().is_empty() {
        return Err(AppError::BadRequest("Sensor name must not be empty".to_string()));
    }
    Ok(())
}

async fn add_sensor(
    State(state): State<AppState>,
    body: Result<Json<NewSensor>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Sensor>)> {
    // ---
    let Json(body) = body?;
    check_name(&body.name)?;

    let mut conn = state.pool.acquire().await?;
    let sensor = store::add_sensor(&mut conn, &body)
        .await
        .map_err(sensor_conflict)?;

    info!("POST /api/sensors - registered '{}' for crop {}", sensor.name, sensor.crop);
    Ok((StatusCode::CREATED, Json(sensor)))
}

async fn active_sensors(State(state): State<AppState>) -> AppResult<Json<Vec<Sensor>>> {
    // ---
    let mut conn = state.pool.acquire().await?;
    Ok(Json(store::active_sensors(&mut conn).await?))
}

async fn get_sensor(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> AppResult<Json<Sensor>> {
    // ---
    let Path(id) = id?;
    let mut conn = state.pool.acquire().await?;
    store::get_sensor(&mut conn, id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Sensor {id} not found")))
}

async fn update_sensor(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
    body: Result<Json<SensorUpdate>, JsonRejection>,
) -> AppResult<Json<Sensor>> {
    // ---
    let Path(id) = id?;
    let Json(body) = body?;
    check_name(&body.name)?;

    let mut conn = state.pool.acquire().await?;
    let sensor = store::update_sensor(&mut conn, id, &body)
        .await
        .map_err(sensor_conflict)?;

    Ok(Json(sensor))
}
