//! Append-only store of crops, sensors and nutrient readings.
//!
//! Every function takes an explicit connection. Handlers acquire one from the
//! pool per request and the pool takes it back when the guard drops, so no
//! connection outlives the request that used it. Each operation is a single
//! SQL statement and therefore atomic.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::{debug, error, info};

use crate::error::StoreError;
use crate::models::{Crop, LabeledReading, NewReading, NewSensor, Reading, Sensor, SensorUpdate};

// ---

/// Filter value meaning "do not restrict".
pub const ANY: &str = "any";

/// Parameters of a date-range query. Bounds are inclusive.
#[derive(Debug, Clone)]
pub struct RangeQuery {
    // ---
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub sensor: Option<String>,
    pub crop: Option<String>,
}

impl RangeQuery {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        // ---
        RangeQuery {
            start,
            end,
            sensor: None,
            crop: None,
        }
    }

    /// Restrict to one sensor name; `"any"` lifts the restriction.
    pub fn sensor(mut self, name: &str) -> Self {
        self.sensor = Self::filter(name);
        self
    }

    /// Restrict to one crop name; `"any"` lifts the restriction.
    pub fn crop(mut self, name: &str) -> Self {
        self.crop = Self::filter(name);
        self
    }

    /// Map a user-supplied filter value to an optional restriction.
    pub fn filter(value: &str) -> Option<String> {
        let value = value.trim();
        (!value.is_empty() && value != ANY).then(|| value.to_string())
    }
}

/// Log a failed statement with its context, then classify the error.
fn db_failure(context: &'static str) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |e| {
        let err = StoreError::from_sqlx(e);
        error!("Store operation '{}' failed: {}", context, err);
        err
    }
}

const LABELED_READING_COLUMNS: &str = r#"
    SELECT
        npk.n          AS n,
        npk.p          AS p,
        npk.k          AS k,
        npk.created_at AS created_at,
        s.name         AS sensor_name,
        s.crop - 1     AS crop_label,
        c.name         AS crop_name
    FROM npk_data npk
    JOIN sensors s ON npk.sensor_id = s.id
    JOIN crops c   ON s.crop = c.id
"#;

const SENSOR_COLUMNS: &str =
    r#"SELECT id, name, "desc", crop, is_active, last_update, created_at FROM sensors"#;

// --- readings

/// Latest `n` readings of one sensor, newest first, labeled for
/// classification.
pub async fn latest(
    conn: &mut SqliteConnection,
    sensor_name: &str,
    n: u32,
) -> Result<Vec<LabeledReading>, StoreError> {
    // ---
    let sql = format!(
        "{LABELED_READING_COLUMNS}
        WHERE s.name = ?
        ORDER BY npk.created_at DESC, npk.id DESC
        LIMIT ?"
    );

    let rows = sqlx::query_as::<_, LabeledReading>(&sql)
        .bind(sensor_name)
        .bind(i64::from(n))
        .fetch_all(&mut *conn)
        .await
        .map_err(db_failure("latest"))?;

    debug!("Fetched {} latest reading(s) for sensor '{}'", rows.len(), sensor_name);
    Ok(rows)
}

/// Readings between `start` and `end` inclusive, oldest first.
pub async fn range(
    conn: &mut SqliteConnection,
    query: &RangeQuery,
) -> Result<Vec<LabeledReading>, StoreError> {
    // ---
    let sql = format!(
        "{LABELED_READING_COLUMNS}
        WHERE npk.created_at >= ? AND npk.created_at <= ?
          AND (? IS NULL OR s.name = ?)
          AND (? IS NULL OR c.name = ?)
        ORDER BY npk.created_at ASC, npk.id ASC"
    );

    let rows = sqlx::query_as::<_, LabeledReading>(&sql)
        .bind(query.start)
        .bind(query.end)
        .bind(query.sensor.as_deref())
        .bind(query.sensor.as_deref())
        .bind(query.crop.as_deref())
        .bind(query.crop.as_deref())
        .fetch_all(&mut *conn)
        .await
        .map_err(db_failure("range"))?;

    debug!("Range query {:?} returned {} row(s)", query, rows.len());
    Ok(rows)
}

/// Latest `n` raw readings across all sensors, newest first.
pub async fn latest_all(conn: &mut SqliteConnection, n: u32) -> Result<Vec<Reading>, StoreError> {
    // ---
    let rows = sqlx::query_as::<_, Reading>(
        r#"
        SELECT id, n, p, k, sensor_id, created_at
        FROM npk_data
        ORDER BY created_at DESC, id DESC
        LIMIT ?
        "#,
    )
    .bind(i64::from(n))
    .fetch_all(&mut *conn)
    .await
    .map_err(db_failure("latest_all"))?;

    debug!("Fetched nutrient data: {} row(s)", rows.len());
    Ok(rows)
}

/// Store a reading stamped with the current time.
pub async fn append(conn: &mut SqliteConnection, reading: &NewReading) -> Result<Reading, StoreError> {
    append_at(conn, reading, Utc::now()).await
}

/// Store a reading with an explicit timestamp. Fails with
/// [`StoreError::Constraint`] if the sensor does not exist.
pub async fn append_at(
    conn: &mut SqliteConnection,
    reading: &NewReading,
    created_at: DateTime<Utc>,
) -> Result<Reading, StoreError> {
    // ---
    let stored = sqlx::query_as::<_, Reading>(
        r#"
        INSERT INTO npk_data (n, p, k, sensor_id, created_at)
        VALUES (?, ?, ?, ?, ?)
        RETURNING id, n, p, k, sensor_id, created_at
        "#,
    )
    .bind(reading.n)
    .bind(reading.p)
    .bind(reading.k)
    .bind(reading.sensor_id)
    .bind(created_at)
    .fetch_one(&mut *conn)
    .await
    .map_err(db_failure("append"))?;

    info!("Inserted nutrient data of sensor '{}'", reading.sensor_id);
    Ok(stored)
}

pub async fn count_readings(conn: &mut SqliteConnection) -> Result<i64, StoreError> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM npk_data")
        .fetch_one(&mut *conn)
        .await
        .map_err(db_failure("count_readings"))
}

// --- crops

pub async fn add_crop(conn: &mut SqliteConnection, name: &str) -> Result<Crop, StoreError> {
    // ---
    let crop = sqlx::query_as::<_, Crop>(
        "INSERT INTO crops (name, created_at) VALUES (?, ?) RETURNING id, name, created_at",
    )
    .bind(name)
    .bind(Utc::now())
    .fetch_one(&mut *conn)
    .await
    .map_err(db_failure("add_crop"))?;

    info!("Inserted crop '{}' with id {}", crop.name, crop.id);
    Ok(crop)
}

pub async fn list_crops(conn: &mut SqliteConnection) -> Result<Vec<Crop>, StoreError> {
    // ---
    let crops = sqlx::query_as::<_, Crop>("SELECT id, name, created_at FROM crops ORDER BY id")
        .fetch_all(&mut *conn)
        .await
        .map_err(db_failure("list_crops"))?;

    debug!("Fetched all crops: {} row(s)", crops.len());
    Ok(crops)
}

// --- sensors

pub async fn add_sensor(conn: &mut SqliteConnection, sensor: &NewSensor) -> Result<Sensor, StoreError> {
    // ---
    let now = Utc::now();
    let sql = r#"
        INSERT INTO sensors (name, "desc", crop, is_active, last_update, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING id, name, "desc", crop, is_active, last_update, created_at
    "#;

    let stored = sqlx::query_as::<_, Sensor>(sql)
        .bind(&sensor.name)
        .bind(sensor.description.as_deref())
        .bind(sensor.crop)
        .bind(sensor.active)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *conn)
        .await
        .map_err(db_failure("add_sensor"))?;

    info!("Inserted sensor '{}' with id {}", stored.name, stored.id);
    Ok(stored)
}

pub async fn get_sensor(conn: &mut SqliteConnection, id: i64) -> Result<Option<Sensor>, StoreError> {
    // ---
    sqlx::query_as::<_, Sensor>(&format!("{SENSOR_COLUMNS} WHERE id = ?"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_failure("get_sensor"))
}

pub async fn get_sensor_by_name(
    conn: &mut SqliteConnection,
    name: &str,
) -> Result<Option<Sensor>, StoreError> {
    // ---
    sqlx::query_as::<_, Sensor>(&format!("{SENSOR_COLUMNS} WHERE name = ?"))
        .bind(name)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_failure("get_sensor_by_name"))
}

/// Active sensors in registration order.
pub async fn active_sensors(conn: &mut SqliteConnection) -> Result<Vec<Sensor>, StoreError> {
    // ---
    let sensors = sqlx::query_as::<_, Sensor>(&format!("{SENSOR_COLUMNS} WHERE is_active = 1 ORDER BY id"))
        .fetch_all(&mut *conn)
        .await
        .map_err(db_failure("active_sensors"))?;

    if sensors.is_empty() {
        debug!("Could not find any active sensors");
    }
    Ok(sensors)
}

/// Replace every mutable field of a sensor in one statement.
pub async fn update_sensor(
    conn: &mut SqliteConnection,
    id: i64,
    update: &SensorUpdate,
) -> Result<Sensor, StoreError> {
    // ---
    let sql = r#"
        UPDATE sensors
        SET name = ?, "desc" = ?, crop = ?, is_active = ?, last_update = ?
        WHERE id = ?
        RETURNING id, name, "desc", crop, is_active, last_update, created_at
    "#;

    let updated = sqlx::query_as::<_, Sensor>(sql)
        .bind(&update.name)
        .bind(update.description.as_deref())
        .bind(update.crop)
        .bind(update.active)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_failure("update_sensor"))?
        .ok_or_else(|| StoreError::NotFound(format!("sensor {id}")))?;

    info!("Updated sensor {} ('{}')", updated.id, updated.name);
    Ok(updated)
}
