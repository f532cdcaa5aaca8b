//! `rootsage`: soil nutrient (NPK) classification and reporting.
//!
//! Readings flow from the [`store`] through the [`classifier`] into the
//! [`report`] engine; [`routes`] puts an HTTP surface over that pipeline.
//!
//! Module boundaries follow the Explicit Module Boundary Pattern (EMBP):
//! sibling modules reach each other's types through the re-exports below
//! rather than through each other's internals.

use std::{str::FromStr, time::Duration};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

pub mod classifier;
pub mod config;
pub mod error;
pub mod models;
pub mod report;
pub mod routes;
pub mod schema;
pub mod store;

pub use classifier::{NutrientClassifier, NutrientLevel, Scorer, TreeEnsemble};
pub use config::Config;
pub use error::{AppError, ClassifyError, ModelError, ReportError, StoreError};
pub use models::{
    Classification, Crop, CropLabel, DashboardValues, LabeledReading, NewCrop, NewReading,
    NewSensor, Reading, Sensor, SensorUpdate,
};
pub use report::{Report, ReportEngine};
pub use routes::AppState;

// ---

/// Open a SQLite pool with foreign keys enforced on every connection.
///
/// In-memory databases live per connection, so `sqlite::memory:` pools are
/// capped at one connection.
pub async fn connect(db_url: &str, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
    // ---
    let options = SqliteConnectOptions::from_str(db_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool_options = if db_url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
    } else {
        SqlitePoolOptions::new().max_connections(max_connections)
    };

    pool_options.connect_with(options).await
}
