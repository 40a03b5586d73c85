//! Regression estimators and the training orchestration.
//!
//! The estimator roster is a closed tagged union rather than a dynamic
//! registry: callers pick an [`Algorithm`], training produces an
//! [`Estimator`] variant, and prediction dispatches on the variant.

pub mod boosting;
pub mod forest;
pub mod metrics;
pub mod mlp;
pub mod package;
pub mod preprocess;
pub mod tree;

use anyhow::{Result, bail};
use clap::ValueEnum;
use ndarray::{Array1, Array2};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

use crate::features::assemble::assemble_training;
use crate::frame::Frame;
use boosting::GradientBoosting;
use forest::RandomForest;
use mlp::MlpRegressor;
pub use package::TrainedModelPackage;
use preprocess::Preprocessor;
use tree::RegressionTree;

/// The trainable model families offered by the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Algorithm {
    DecisionTree,
    RandomForest,
    GradientBoosting,
    Mlp,
}

impl Algorithm {
    pub const ALL: [Algorithm; 4] = [
        Algorithm::DecisionTree,
        Algorithm::RandomForest,
        Algorithm::GradientBoosting,
        Algorithm::Mlp,
    ];
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Algorithm::DecisionTree => "decision-tree",
            Algorithm::RandomForest => "random-forest",
            Algorithm::GradientBoosting => "gradient-boosting",
            Algorithm::Mlp => "mlp",
        };
        f.write_str(name)
    }
}

/// A fitted (or fittable) regression model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Estimator {
    DecisionTree(RegressionTree),
    RandomForest(RandomForest),
    GradientBoosting(GradientBoosting),
    Mlp(MlpRegressor),
}

impl Estimator {
    /// A fresh estimator configured with the application's fixed
    /// hyperparameters for the given algorithm.
    pub fn new(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::DecisionTree => Estimator::DecisionTree(
                RegressionTree::new()
                    .with_max_depth(20)
                    .with_min_samples_split(10)
                    .with_min_samples_leaf(2),
            ),
            Algorithm::RandomForest => Estimator::RandomForest(RandomForest::new()),
            Algorithm::GradientBoosting => {
                Estimator::GradientBoosting(GradientBoosting::new())
            }
            Algorithm::Mlp => Estimator::Mlp(MlpRegressor::new()),
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        match self {
            Estimator::DecisionTree(_) => Algorithm::DecisionTree,
            Estimator::RandomForest(_) => Algorithm::RandomForest,
            Estimator::GradientBoosting(_) => Algorithm::GradientBoosting,
            Estimator::Mlp(_) => Algorithm::Mlp,
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        match self {
            Estimator::DecisionTree(model) => model.fit(x, y),
            Estimator::RandomForest(model) => model.fit(x, y),
            Estimator::GradientBoosting(model) => model.fit(x, y),
            Estimator::Mlp(model) => model.fit(x, y),
        }
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        match self {
            Estimator::DecisionTree(model) => model.predict(x),
            Estimator::RandomForest(model) => model.predict(x),
            Estimator::GradientBoosting(model) => model.predict(x),
            Estimator::Mlp(model) => model.predict(x),
        }
    }

    pub fn is_fitted(&self) -> bool {
        match self {
            Estimator::DecisionTree(model) => model.is_fitted(),
            Estimator::RandomForest(model) => model.is_fitted(),
            Estimator::GradientBoosting(model) => model.is_fitted(),
            Estimator::Mlp(model) => model.is_fitted(),
        }
    }
}

/// Held-out evaluation metrics of one training run.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub algorithm: String,
    pub rows: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub rmse: f64,
    pub mae: f64,
    pub r2: f64,
}

/// Trains `algorithm` on a raw training frame.
///
/// Assembles the training matrix, evaluates on a seeded held-out split and
/// returns the persisted-ready package together with the metrics report.
pub fn train(
    frame: &Frame,
    algorithm: Algorithm,
    test_fraction: f64,
    seed: u64,
) -> Result<(TrainedModelPackage, TrainingReport)> {
    let mut frame = frame.clone();
    let matrix = assemble_training(&mut frame)?;
    let rows = matrix.features.rows();
    if rows < 2 {
        bail!("training needs at least 2 rows, got {rows}");
    }

    let (train_idx, test_idx) = split_indices(rows, test_fraction, seed);
    let train_features = matrix.features.select_rows(&train_idx);
    let test_features = matrix.features.select_rows(&test_idx);
    let y_train = Array1::from_iter(train_idx.iter().map(|&i| matrix.target[i]));
    let y_test = Array1::from_iter(test_idx.iter().map(|&i| matrix.target[i]));

    let preprocessor = Preprocessor::fit(
        &train_features,
        &matrix.numeric_features,
        &matrix.categorical_features,
    )?;
    let x_train = preprocessor.transform(&train_features)?;
    let x_test = preprocessor.transform(&test_features)?;

    info!(
        %algorithm,
        rows,
        train_rows = train_idx.len(),
        test_rows = test_idx.len(),
        features = preprocessor.width(),
        "Training estimator"
    );

    let mut estimator = Estimator::new(algorithm);
    estimator.fit(&x_train, &y_train)?;

    let predicted = estimator.predict(&x_test)?;
    let report = TrainingReport {
        algorithm: algorithm.to_string(),
        rows,
        train_rows: train_idx.len(),
        test_rows: test_idx.len(),
        rmse: metrics::rmse(&y_test, &predicted),
        mae: metrics::mae(&y_test, &predicted),
        r2: metrics::r2(&y_test, &predicted),
    };
    info!(
        %algorithm,
        rmse = report.rmse,
        mae = report.mae,
        r2 = report.r2,
        "Training complete"
    );

    let package = TrainedModelPackage {
        estimator,
        preprocessor,
        numeric_features: matrix.numeric_features,
        categorical_features: matrix.categorical_features,
        medians: matrix.medians,
        stats: matrix.stats,
    };
    Ok((package, report))
}

/// Seeded shuffle split. When the requested split would leave fewer than
/// two training rows or an empty test set, metrics fall back to the
/// training rows themselves.
fn split_indices(rows: usize, test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut order: Vec<usize> = (0..rows).collect();
    order.shuffle(&mut StdRng::seed_from_u64(seed));

    let test_n = (rows as f64 * test_fraction).round() as usize;
    if test_fraction > 0.0 && test_n >= 1 && rows - test_n >= 2 {
        let (test, train) = order.split_at(test_n);
        (train.to_vec(), test.to_vec())
    } else {
        if test_fraction > 0.0 {
            warn!(
                rows,
                test_fraction, "Dataset too small for a held-out split; metrics use training rows"
            );
        }
        ((0..rows).collect(), (0..rows).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{TARGET_COLUMN, ZONE_COLUMN};

    fn training_frame(rows: usize) -> Frame {
        let mut frame = Frame::with_rows(rows);
        let zones: Vec<f64> = (0..rows).map(|i| f64::from((i % 3 == 0) as u8) + 1.0).collect();
        let dates: Vec<String> = (0..rows)
            .map(|i| format!("{:02}/01/2024 {:02}:00", (i % 27) + 1, i % 24))
            .collect();
        let target: Vec<f64> = (0..rows).map(|i| 50.0 + (i % 7) as f64 * 10.0).collect();
        let temp: Vec<f64> = (0..rows).map(|i| 5.0 + (i % 10) as f64).collect();
        frame.insert_numeric(ZONE_COLUMN, zones).unwrap();
        frame.insert_categorical("fecha", dates).unwrap();
        frame.insert_numeric(TARGET_COLUMN, target).unwrap();
        frame.insert_numeric("temp", temp).unwrap();
        frame
    }

    #[test]
    fn test_train_each_algorithm() {
        let frame = training_frame(40);
        for algorithm in Algorithm::ALL {
            let (package, report) = train(&frame, algorithm, 0.2, 42).unwrap();
            assert!(package.estimator.is_fitted(), "{algorithm}");
            assert!(report.rmse.is_finite(), "{algorithm}");
            assert_eq!(report.rows, 40);
            assert_eq!(report.test_rows, 8);
        }
    }

    #[test]
    fn test_split_is_seeded_and_disjoint() {
        let (train_a, test_a) = split_indices(20, 0.2, 7);
        let (train_b, test_b) = split_indices(20, 0.2, 7);
        assert_eq!(train_a, train_b);
        assert_eq!(test_a, test_b);
        assert_eq!(train_a.len(), 16);
        assert_eq!(test_a.len(), 4);
        for i in &test_a {
            assert!(!train_a.contains(i));
        }
    }

    #[test]
    fn test_tiny_dataset_falls_back_to_training_metrics() {
        let (train, test) = split_indices(2, 0.2, 42);
        assert_eq!(train, vec![0, 1]);
        assert_eq!(test, vec![0, 1]);
    }

    #[test]
    fn test_training_requires_rows() {
        let mut frame = Frame::with_rows(0);
        frame.insert_numeric(ZONE_COLUMN, vec![]).unwrap();
        frame.insert_categorical("fecha", vec![]).unwrap();
        frame.insert_numeric(TARGET_COLUMN, vec![]).unwrap();
        assert!(train(&frame, Algorithm::DecisionTree, 0.2, 42).is_err());
    }
}
