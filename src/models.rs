//! Typed records for crops, sensors and nutrient readings.
//!
//! Rows are decoded into these structs at the store boundary so nothing
//! downstream reaches into loosely typed columns by name.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classifier::NutrientLevel;

// ---

/// Zero-based crop index expected by the trained classifiers.
///
/// Crop ids in storage start at 1, the model labels start at 0, so the label
/// is always `crop_id - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct CropLabel(i64);

impl CropLabel {
    // ---
    /// Derive the model label from a stored crop id. Returns `None` for ids
    /// below 1, which no stored crop can have.
    pub fn from_crop_id(crop_id: i64) -> Option<Self> {
        (crop_id >= 1).then(|| Self(crop_id - 1))
    }

    /// Wrap a raw label value as produced by a query or a caller.
    pub fn new(label: i64) -> Self {
        Self(label)
    }

    pub fn value(self) -> i64 {
        self.0
    }

    /// The label as a model input feature.
    pub fn as_feature(self) -> f64 {
        self.0 as f64
    }
}

/// A crop known to the system.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Crop {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Crop {
    pub fn label(&self) -> Option<CropLabel> {
        CropLabel::from_crop_id(self.id)
    }
}

/// A registered sensor, bound to the crop it monitors.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Sensor {
    // ---
    pub id: i64,
    pub name: String,
    #[sqlx(rename = "desc")]
    pub description: Option<String>,
    pub crop: i64,
    #[sqlx(rename = "is_active")]
    pub active: bool,
    pub last_update: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// A stored nutrient reading, as written by ingestion.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Reading {
    // ---
    pub id: i64,
    pub n: f64,
    pub p: f64,
    pub k: f64,
    pub sensor_id: i64,
    pub created_at: DateTime<Utc>,
}

/// A reading joined with its sensor and crop, ready for classification.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct LabeledReading {
    // ---
    pub n: f64,
    pub p: f64,
    pub k: f64,
    pub created_at: DateTime<Utc>,
    pub sensor_name: String,
    pub crop_label: CropLabel,
    pub crop_name: String,
}

/// Ingestion payload for a single reading.
#[derive(Debug, Clone, Deserialize)]
pub struct NewReading {
    pub n: f64,
    pub p: f64,
    pub k: f64,
    pub sensor_id: i64,
}

impl NewReading {
    /// Name of the first nutrient value that is negative or not finite.
    pub fn invalid_field(&self) -> Option<&'static str> {
        // ---
        [("n", self.n), ("p", self.p), ("k", self.k)]
            .into_iter()
            .find(|(_, v)| !v.is_finite() || *v < 0.0)
            .map(|(name, _)| name)
    }
}

/// Registration payload for a crop.
#[derive(Debug, Clone, Deserialize)]
pub struct NewCrop {
    pub name: String,
}

/// Registration payload for a sensor.
#[derive(Debug, Clone, Deserialize)]
pub struct NewSensor {
    // ---
    pub name: String,
    #[serde(default, alias = "desc")]
    pub description: Option<String>,
    pub crop: i64,
    #[serde(default = "default_active", alias = "is_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Full replacement of a sensor's mutable fields.
#[derive(Debug, Clone, Deserialize)]
pub struct SensorUpdate {
    // ---
    pub name: String,
    #[serde(default, alias = "desc")]
    pub description: Option<String>,
    pub crop: i64,
    #[serde(alias = "is_active")]
    pub active: bool,
}

/// Per-nutrient levels for one reading. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub level_n: NutrientLevel,
    pub level_p: NutrientLevel,
    pub level_k: NutrientLevel,
}

/// Values shown on the grower dashboard for the latest reading of a sensor.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardValues {
    // ---
    pub n: f64,
    pub p: f64,
    pub k: f64,
    pub level_n: NutrientLevel,
    pub level_p: NutrientLevel,
    pub level_k: NutrientLevel,
    pub crop_name: String,
    pub sensor_name: String,
}

impl DashboardValues {
    pub fn new(reading: &LabeledReading, levels: Classification) -> Self {
        // ---
        DashboardValues {
            n: reading.n,
            p: reading.p,
            k: reading.k,
            level_n: levels.level_n,
            level_p: levels.level_p,
            level_k: levels.level_k,
            crop_name: reading.crop_name.clone(),
            sensor_name: reading.sensor_name.clone(),
        }
    }
}
