//! Database schema management for `rootsage`.
//!
//! Ensures required tables and indexes exist before serving requests.
//! Applied once on startup from `main.rs` and by test setup.

use anyhow::Result;
use sqlx::SqlitePool;

// ---

/// Create the database schema (idempotent).
///
/// Creates `crops`, `sensors` and `npk_data`. Safe to call on every startup;
/// no-op if objects already exist. Foreign keys are enforced by the
/// connection options, see [`crate::connect`].
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS crops (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            name       TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Each sensor monitors exactly one crop
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sensors (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT    NOT NULL UNIQUE,
            "desc"      TEXT,
            crop        INTEGER NOT NULL REFERENCES crops (id),
            is_active   INTEGER NOT NULL DEFAULT 0,
            last_update TEXT    NOT NULL,
            created_at  TEXT    NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Readings are append-only
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS npk_data (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            n          REAL    NOT NULL DEFAULT 0,
            p          REAL    NOT NULL DEFAULT 0,
            k          REAL    NOT NULL DEFAULT 0,
            sensor_id  INTEGER NOT NULL REFERENCES sensors (id),
            created_at TEXT    NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_npk_data_sensor_created
            ON npk_data (sensor_id, created_at);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_npk_data_created
            ON npk_data (created_at);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
