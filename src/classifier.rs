//! Crop-conditioned nutrient level classification.
//!
//! Three independently trained scorers, one per nutrient, each map a
//! `[nutrient value, crop label]` pair to a class index. The
//! [`NutrientClassifier`] owns the scorers for the lifetime of the process and
//! is shared read-only between requests.
//!
//! Trained models are shipped as JSON tree ensembles (`N.json`, `P.json`,
//! `K.json`). A tree is a flat list of nodes where node 0 is the root:
//!
//! ```json
//! { "trees": [ { "nodes": [
//!     { "feature": 0, "threshold": 40.0, "left": 1, "right": 2 },
//!     { "class": 0 },
//!     { "class": 2 }
//! ] } ] }
//! ```
//!
//! Splits send a row left when `row[feature] <= threshold`.

use std::{fmt, fs, path::Path};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{ClassifyError, ModelError};
use crate::models::{Classification, CropLabel, LabeledReading};

// ---

/// Number of classes every scorer was trained on.
pub const NUM_CLASSES: u8 = 3;

/// Categorical nutrient level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NutrientLevel {
    Low,
    Okay,
    High,
}

impl NutrientLevel {
    /// Map a scorer class index to its level.
    ///
    /// The order follows the label order the models were trained with:
    /// 0 is Low, 1 is High, 2 is Okay.
    pub fn from_class_index(index: u8) -> Option<Self> {
        // ---
        match index {
            0 => Some(NutrientLevel::Low),
            1 => Some(NutrientLevel::High),
            2 => Some(NutrientLevel::Okay),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NutrientLevel::Low => "Low",
            NutrientLevel::Okay => "Okay",
            NutrientLevel::High => "High",
        }
    }
}

impl fmt::Display for NutrientLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three measured nutrients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Nutrient {
    N,
    P,
    K,
}

impl Nutrient {
    pub const ALL: [Nutrient; 3] = [Nutrient::N, Nutrient::P, Nutrient::K];

    pub fn symbol(self) -> &'static str {
        match self {
            Nutrient::N => "N",
            Nutrient::P => "P",
            Nutrient::K => "K",
        }
    }

    /// Pick this nutrient's value out of a reading.
    pub fn value_of(self, reading: &LabeledReading) -> f64 {
        match self {
            Nutrient::N => reading.n,
            Nutrient::P => reading.p,
            Nutrient::K => reading.k,
        }
    }
}

/// A trained scoring function over `[nutrient value, crop label]` rows.
///
/// Implementations must be pure: the same row always yields the same class.
pub trait Scorer: Send + Sync {
    /// Class index for one row.
    fn predict_row(&self, row: [f64; 2]) -> u8;

    /// Class indices for a batch of rows, in input order.
    fn predict(&self, rows: &[[f64; 2]]) -> Vec<u8> {
        rows.iter().map(|row| self.predict_row(*row)).collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        class: u8,
    },
}

#[derive(Debug, Clone, Deserialize)]
struct DecisionTree {
    nodes: Vec<TreeNode>,
}

impl DecisionTree {
    /// Children always point forward, so at most `nodes.len()` steps are taken.
    fn validate(&self) -> Result<(), String> {
        // ---
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            match *node {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if feature > 1 {
                        return Err(format!("node {idx}: feature {feature} out of range"));
                    }
                    if threshold.is_nan() {
                        return Err(format!("node {idx}: threshold is NaN"));
                    }
                    for child in [left, right] {
                        if child <= idx || child >= self.nodes.len() {
                            return Err(format!("node {idx}: invalid child {child}"));
                        }
                    }
                }
                TreeNode::Leaf { class } => {
                    if class >= NUM_CLASSES {
                        return Err(format!("node {idx}: class {class} out of range"));
                    }
                }
            }
        }
        Ok(())
    }

    fn predict_row(&self, row: [f64; 2]) -> u8 {
        // ---
        let mut idx = 0;
        loop {
            match self.nodes[idx] {
                TreeNode::Leaf { class } => return class,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[feature] <= threshold { left } else { right };
                }
            }
        }
    }
}

/// A majority-vote ensemble of decision trees loaded from a JSON artifact.
#[derive(Debug, Clone, Deserialize)]
pub struct TreeEnsemble {
    trees: Vec<DecisionTree>,
}

impl TreeEnsemble {
    /// Parse and validate an ensemble from its JSON text. `origin` names the
    /// artifact in error messages.
    pub fn from_json(json: &str, origin: &str) -> Result<Self, ModelError> {
        // ---
        let ensemble: TreeEnsemble =
            serde_json::from_str(json).map_err(|source| ModelError::Parse {
                path: origin.to_string(),
                source,
            })?;

        if ensemble.trees.is_empty() {
            return Err(ModelError::Invalid {
                path: origin.to_string(),
                reason: "ensemble has no trees".to_string(),
            });
        }
        for (i, tree) in ensemble.trees.iter().enumerate() {
            tree.validate().map_err(|reason| ModelError::Invalid {
                path: origin.to_string(),
                reason: format!("tree {i}: {reason}"),
            })?;
        }
        Ok(ensemble)
    }

    pub fn load(path: &Path) -> Result<Self, ModelError> {
        // ---
        let origin = path.display().to_string();
        let json = fs::read_to_string(path).map_err(|source| ModelError::Io {
            path: origin.clone(),
            source,
        })?;
        Self::from_json(&json, &origin)
    }
}

impl Scorer for TreeEnsemble {
    fn predict_row(&self, row: [f64; 2]) -> u8 {
        // ---
        let mut votes = [0usize; NUM_CLASSES as usize];
        for tree in &self.trees {
            votes[tree.predict_row(row) as usize] += 1;
        }

        // Ties go to the lowest class index
        let mut best = 0;
        for class in 1..votes.len() {
            if votes[class] > votes[best] {
                best = class;
            }
        }
        best as u8
    }
}

/// Classifies readings into per-nutrient levels.
///
/// Built once at startup and shared behind an `Arc`; it holds no mutable
/// state, so concurrent use needs no locking.
pub struct NutrientClassifier {
    n: Box<dyn Scorer>,
    p: Box<dyn Scorer>,
    k: Box<dyn Scorer>,
}

impl NutrientClassifier {
    pub fn new(n: Box<dyn Scorer>, p: Box<dyn Scorer>, k: Box<dyn Scorer>) -> Self {
        Self { n, p, k }
    }

    /// Load `N.json`, `P.json` and `K.json` from `dir`.
    pub fn load(dir: &Path) -> Result<Self, ModelError> {
        // ---
        let load = |nutrient: Nutrient| -> Result<Box<dyn Scorer>, ModelError> {
            let path = dir.join(format!("{}.json", nutrient.symbol()));
            let ensemble = TreeEnsemble::load(&path)?;
            tracing::info!(
                "Loaded {} classifier from {} ({} tree(s))",
                nutrient.symbol(),
                path.display(),
                ensemble.trees.len()
            );
            Ok(Box::new(ensemble))
        };

        Ok(Self::new(load(Nutrient::N)?, load(Nutrient::P)?, load(Nutrient::K)?))
    }

    fn scorer(&self, nutrient: Nutrient) -> &dyn Scorer {
        match nutrient {
            Nutrient::N => self.n.as_ref(),
            Nutrient::P => self.p.as_ref(),
            Nutrient::K => self.k.as_ref(),
        }
    }

    /// Level of a single nutrient value for the given crop.
    pub fn classify_value(
        &self,
        nutrient: Nutrient,
        value: f64,
        label: CropLabel,
    ) -> Result<NutrientLevel, ClassifyError> {
        // ---
        if label.value() < 0 {
            return Err(ClassifyError::InvalidLabel(label.value()));
        }
        let index = self
            .scorer(nutrient)
            .predict_row([value, label.as_feature()]);
        NutrientLevel::from_class_index(index).ok_or(ClassifyError::UnknownClass(index))
    }

    /// Classify the three nutrient values of one reading.
    pub fn classify(
        &self,
        n: f64,
        p: f64,
        k: f64,
        label: CropLabel,
    ) -> Result<Classification, ClassifyError> {
        // ---
        Ok(Classification {
            level_n: self.classify_value(Nutrient::N, n, label)?,
            level_p: self.classify_value(Nutrient::P, p, label)?,
            level_k: self.classify_value(Nutrient::K, k, label)?,
        })
    }

    pub fn classify_reading(&self, reading: &LabeledReading) -> Result<Classification, ClassifyError> {
        self.classify(reading.n, reading.p, reading.k, reading.crop_label)
    }

    /// Classify every row independently, in parallel. Output order matches
    /// input order.
    pub fn classify_batch(
        &self,
        rows: &[LabeledReading],
    ) -> Result<Vec<Classification>, ClassifyError> {
        rows.par_iter().map(|row| self.classify_reading(row)).collect()
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    /// Ignores the crop and buckets the value by two cut points.
    struct Cutoffs(f64, f64);

    impl Scorer for Cutoffs {
        fn predict_row(&self, row: [f64; 2]) -> u8 {
            if row[0] < self.0 {
                0
            } else if row[0] > self.1 {
                1
            } else {
                2
            }
        }
    }

    struct Broken;

    impl Scorer for Broken {
        fn predict_row(&self, _row: [f64; 2]) -> u8 {
            7
        }
    }

    fn cutoff_classifier() -> NutrientClassifier {
        NutrientClassifier::new(
            Box::new(Cutoffs(10.0, 50.0)),
            Box::new(Cutoffs(5.0, 20.0)),
            Box::new(Cutoffs(8.0, 30.0)),
        )
    }

    const CROP_SPLIT_TREE: &str = r#"{
        "trees": [ { "nodes": [
            { "feature": 1, "threshold": 0.5, "left": 1, "right": 4 },
            { "feature": 0, "threshold": 20.0, "left": 2, "right": 3 },
            { "class": 0 },
            { "class": 2 },
            { "feature": 0, "threshold": 60.0, "left": 5, "right": 6 },
            { "class": 2 },
            { "class": 1 }
        ] } ]
    }"#;

    #[test]
    fn test_level_mapping_order() {
        // ---
        assert_eq!(NutrientLevel::from_class_index(0), Some(NutrientLevel::Low));
        assert_eq!(NutrientLevel::from_class_index(1), Some(NutrientLevel::High));
        assert_eq!(NutrientLevel::from_class_index(2), Some(NutrientLevel::Okay));
        assert_eq!(NutrientLevel::from_class_index(3), None);

        let names: Vec<String> = (0..3)
            .filter_map(NutrientLevel::from_class_index)
            .map(|l| l.to_string())
            .collect();
        assert_eq!(names, ["Low", "High", "Okay"]);
    }

    #[test]
    fn test_tree_follows_crop_label() {
        // ---
        let tree = TreeEnsemble::from_json(CROP_SPLIT_TREE, "test").unwrap();

        // label 0: low below 20, okay above
        assert_eq!(tree.predict_row([10.0, 0.0]), 0);
        assert_eq!(tree.predict_row([20.0, 0.0]), 0);
        assert_eq!(tree.predict_row([25.0, 0.0]), 2);

        // label 1: okay up to 60, high above
        assert_eq!(tree.predict_row([10.0, 1.0]), 2);
        assert_eq!(tree.predict_row([70.0, 1.0]), 1);

        assert_eq!(tree.predict(&[[10.0, 0.0], [70.0, 1.0]]), vec![0, 1]);
    }

    #[test]
    fn test_ensemble_majority_vote() {
        // ---
        let json = r#"{ "trees": [
            { "nodes": [ { "class": 1 } ] },
            { "nodes": [ { "class": 2 } ] },
            { "nodes": [ { "class": 2 } ] }
        ] }"#;
        let ensemble = TreeEnsemble::from_json(json, "vote").unwrap();
        assert_eq!(ensemble.predict_row([0.0, 0.0]), 2);

        let tie = r#"{ "trees": [
            { "nodes": [ { "class": 2 } ] },
            { "nodes": [ { "class": 1 } ] }
        ] }"#;
        let ensemble = TreeEnsemble::from_json(tie, "tie").unwrap();
        assert_eq!(ensemble.predict_row([0.0, 0.0]), 1);
    }

    #[test]
    fn test_invalid_artifacts_are_rejected() {
        // ---
        let cases = [
            r#"{ "trees": [] }"#,
            r#"{ "trees": [ { "nodes": [] } ] }"#,
            r#"{ "trees": [ { "nodes": [ { "class": 3 } ] } ] }"#,
            r#"{ "trees": [ { "nodes": [
                { "feature": 2, "threshold": 1.0, "left": 1, "right": 2 },
                { "class": 0 }, { "class": 1 } ] } ] }"#,
            // a child pointing back at its parent would loop forever
            r#"{ "trees": [ { "nodes": [
                { "feature": 0, "threshold": 1.0, "left": 0, "right": 1 },
                { "class": 0 } ] } ] }"#,
            r#"{ "trees": [ { "nodes": [
                { "feature": 0, "threshold": 1.0, "left": 1, "right": 9 },
                { "class": 0 } ] } ] }"#,
        ];

        for json in cases {
            assert!(
                matches!(
                    TreeEnsemble::from_json(json, "bad"),
                    Err(ModelError::Invalid { .. })
                ),
                "expected rejection of {json}"
            );
        }

        assert!(matches!(
            TreeEnsemble::from_json("not json", "bad"),
            Err(ModelError::Parse { .. })
        ));
    }

    #[test]
    fn test_shipped_models_load() {
        // ---
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("models");
        let clf = NutrientClassifier::load(&dir).unwrap();
        assert!(clf.classify(10.0, 5.0, 8.0, CropLabel::new(0)).is_ok());
    }

    #[test]
    fn test_missing_artifact_directory() {
        // ---
        let result = NutrientClassifier::load(Path::new("/nonexistent/models"));
        assert!(matches!(result, Err(ModelError::Io { .. })));
    }

    #[test]
    fn test_classify_reading() {
        // ---
        let clf = cutoff_classifier();
        let levels = clf.classify(5.0, 25.0, 10.0, CropLabel::new(0)).unwrap();

        assert_eq!(levels.level_n, NutrientLevel::Low);
        assert_eq!(levels.level_p, NutrientLevel::High);
        assert_eq!(levels.level_k, NutrientLevel::Okay);
    }

    #[test]
    fn test_negative_label_is_an_error() {
        // ---
        let clf = cutoff_classifier();
        assert_eq!(
            clf.classify(5.0, 5.0, 5.0, CropLabel::new(-1)),
            Err(ClassifyError::InvalidLabel(-1))
        );
    }

    #[test]
    fn test_unknown_class_index_is_an_error() {
        // ---
        let clf = NutrientClassifier::new(
            Box::new(Cutoffs(1.0, 2.0)),
            Box::new(Broken),
            Box::new(Cutoffs(1.0, 2.0)),
        );
        assert_eq!(
            clf.classify(1.5, 1.5, 1.5, CropLabel::new(0)),
            Err(ClassifyError::UnknownClass(7))
        );
    }
}
