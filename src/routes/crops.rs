//! Crop registration: `POST /api/crops` and `GET /api/crops`.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use tracing::info;

use crate::error::{AppError, AppResult, StoreError};
use crate::{store, AppState, Crop, NewCrop};

// ---

pub fn router() -> Router<AppState> {
    Router::new().route("/api/crops", post(add_crop).get(list_crops))
}

async fn add_crop(
    State(state): State<AppState>,
    body: Result<Json<NewCrop>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Crop>)> {
    // ---
    let Json(body) = body?;
    let name = body.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("Crop name must not be empty".to_string()));
    }

    let mut conn = state.pool.acquire().await?;
    let crop = store::add_crop(&mut conn, name)
        .await
        .map_err(|e| match e {
            StoreError::Constraint(_) => AppError::Conflict("Crop already exists".to_string()),
            other => other.into(),
        })?;

    info!("POST /api/crops - stored crop '{}' (label {:?})", crop.name, crop.label());
    Ok((StatusCode::CREATED, Json(crop)))
}

async fn list_crops(State(state): State<AppState>) -> AppResult<Json<Vec<Crop>>> {
    // ---
    let mut conn = state.pool.acquire().await?;
    Ok(Json(store::list_crops(&mut conn).await?))
}
