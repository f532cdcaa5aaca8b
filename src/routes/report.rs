//! Report download: `GET /report?start=YYYY-MM-DD&end=YYYY-MM-DD[&sensor=..][&crop=..]`.
//!
//! Both dates are inclusive; `end` covers the whole day. `sensor` and `crop`
//! default to `any`. The response is an `.xlsx` workbook with a "Data" and a
//! "Stats" sheet.

use anyhow::anyhow;
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::header,
    response::IntoResponse,
    routing::get,
    Router,
};
use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Deserialize;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::store::{self, RangeQuery, ANY};
use crate::AppState;

// ---

const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

pub fn router() -> Router<AppState> {
    Router::new().route("/report", get(handler))
}

#[derive(Debug, Deserialize)]
pub struct ReportParams {
    start: NaiveDate,
    end: NaiveDate,
    sensor: Option<String>,
    crop: Option<String>,
}

impl ReportParams {
    fn to_range(&self) -> AppResult<RangeQuery> {
        // ---
        if self.start > self.end {
            return Err(AppError::BadRequest(format!(
                "Start date {} is after end date {}",
                self.start, self.end
            )));
        }

        let time = |h, m, s, ns| {
            NaiveTime::from_hms_nano_opt(h, m, s, ns)
                .ok_or_else(|| AppError::Internal(anyhow!("invalid time of day")))
        };
        let start_of_day = time(0, 0, 0, 0)?;
        let end_of_day = time(23, 59, 59, 999_999_999)?;

        let start = Utc.from_utc_datetime(&self.start.and_time(start_of_day));
        let end = Utc.from_utc_datetime(&self.end.and_time(end_of_day));

        Ok(RangeQuery::new(start, end)
            .sensor(self.sensor.as_deref().unwrap_or(ANY))
            .crop(self.crop.as_deref().unwrap_or(ANY)))
    }
}

async fn handler(
    State(state): State<AppState>,
    params: Result<Query<ReportParams>, QueryRejection>,
) -> AppResult<impl IntoResponse> {
    // ---
    let Query(params) = params?;
    let range = params.to_range()?;

    let rows = {
        let mut conn = state.pool.acquire().await?;
        store::range(&mut conn, &range).await?
    };
    let row_count = rows.len();

    // Classification and workbook encoding are CPU bound
    let engine = state.reports.clone();
    let bytes = tokio::task::spawn_blocking(move || engine.generate(&rows)?.to_xlsx())
        .await
        .map_err(|e| AppError::Internal(anyhow!("report task failed: {e}")))??;

    info!(
        "GET /report - {} row(s) from {} to {}, {} bytes",
        row_count,
        params.start,
        params.end,
        bytes.len()
    );

    let disposition = format!(
        "attachment; filename=\"npk-report-{}-{}.xlsx\"",
        params.start, params.end
    );
    Ok((
        [
            (header::CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}
