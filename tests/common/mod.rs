//! Shared fixtures: an in-memory store and classifiers built from small
//! tree artifacts written to a temporary directory.
#![allow(dead_code)]

use std::{fs, path::PathBuf, sync::Arc};

use sqlx::SqlitePool;
use tempfile::TempDir;

use rootsage::{schema, AppState, Config, NutrientClassifier};

pub const API_KEY: &str = "test-key";

/// N: crop 0 is Low up to 20, Okay up to 60, High above; other crops shift
/// both cut points up by 10.
pub const N_MODEL: &str = r#"{ "trees": [ { "nodes": [
    { "feature": 1, "threshold": 0.5, "left": 1, "right": 6 },
    { "feature": 0, "threshold": 20.0, "left": 2, "right": 3 },
    { "class": 0 },
    { "feature": 0, "threshold": 60.0, "left": 4, "right": 5 },
    { "class": 2 },
    { "class": 1 },
    { "feature": 0, "threshold": 30.0, "left": 7, "right": 8 },
    { "class": 0 },
    { "feature": 0, "threshold": 70.0, "left": 9, "right": 10 },
    { "class": 2 },
    { "class": 1 }
] } ] }"#;

/// P: Low up to 4, Okay up to 30, High above, for every crop.
pub const P_MODEL: &str = r#"{ "trees": [ { "nodes": [
    { "feature": 0, "threshold": 4.0, "left": 1, "right": 2 },
    { "class": 0 },
    { "feature": 0, "threshold": 30.0, "left": 3, "right": 4 },
    { "class": 2 },
    { "class": 1 }
] } ] }"#;

/// K: three trees voting; Okay unless two of them see the value as high.
pub const K_MODEL: &str = r#"{ "trees": [
    { "nodes": [ { "class": 2 } ] },
    { "nodes": [
        { "feature": 0, "threshold": 7.0, "left": 1, "right": 2 },
        { "class": 2 },
        { "class": 1 } ] },
    { "nodes": [
        { "feature": 0, "threshold": 7.5, "left": 1, "right": 2 },
        { "class": 2 },
        { "class": 1 } ] }
] }"#;

/// Write the three artifacts into a fresh temp dir. Keep the dir alive for as
/// long as the path is needed.
pub fn write_models() -> TempDir {
    // ---
    let dir = tempfile::tempdir().expect("create temp dir");
    for (name, json) in [("N.json", N_MODEL), ("P.json", P_MODEL), ("K.json", K_MODEL)] {
        fs::write(dir.path().join(name), json).expect("write model artifact");
    }
    dir
}

pub fn classifier() -> Arc<NutrientClassifier> {
    let dir = write_models();
    Arc::new(NutrientClassifier::load(dir.path()).expect("load test models"))
}

pub async fn pool() -> SqlitePool {
    // ---
    let pool = rootsage::connect("sqlite::memory:", 1)
        .await
        .expect("open in-memory database");
    schema::create_schema(&pool).await.expect("create schema");
    pool
}

pub fn config() -> Config {
    Config {
        db_url: "sqlite::memory:".to_string(),
        db_pool_max: 1,
        models_dir: PathBuf::from("models"),
        api_key: API_KEY.to_string(),
        port: 0,
    }
}

pub async fn state() -> AppState {
    AppState::new(pool().await, config(), classifier())
}
