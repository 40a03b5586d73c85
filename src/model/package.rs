//! The persisted training artifact.
//!
//! The estimator travels with the preprocessing parameters, the feature
//! lists and the aggregate-statistics snapshot as one atomic blob; the
//! estimator alone cannot reproduce prediction-time feature assembly.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::classify::{TrafficLevel, classify_for_zone};
use crate::features::assemble::{AssemblyPlan, SubstitutionReport, assemble_prediction};
use crate::features::stats::AggregateStats;
use crate::frame::Frame;
use crate::model::Estimator;
use crate::model::preprocess::Preprocessor;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModelPackage {
    pub estimator: Estimator,
    pub preprocessor: Preprocessor,
    pub numeric_features: Vec<String>,
    pub categorical_features: Vec<String>,
    pub medians: BTreeMap<String, f64>,
    pub stats: AggregateStats,
}

impl TrainedModelPackage {
    /// Serializes the package to `path` as a single blob. The bytes are
    /// staged in a sibling temp file and renamed into place so readers
    /// never observe a partially written package.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let bytes = bincode::serialize(self).context("serializing model package")?;

        let mut tmp = path.as_os_str().to_os_string();
        tmp.push(".tmp");
        fs::write(&tmp, &bytes)
            .with_context(|| format!("writing model package to {}", path.display()))?;
        fs::rename(&tmp, path)
            .with_context(|| format!("moving model package into {}", path.display()))?;

        info!(path = %path.display(), bytes = bytes.len(), "Model package saved");
        Ok(())
    }

    /// Restores a package written by [`save`](Self::save).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)
            .with_context(|| format!("reading model package {}", path.display()))?;
        let package: TrainedModelPackage =
            bincode::deserialize(&bytes).context("deserializing model package")?;
        if !package.estimator.is_fitted() {
            bail!(
                "model package {} holds an unfitted estimator",
                path.display()
            );
        }
        info!(
            path = %path.display(),
            algorithm = %package.estimator.algorithm(),
            zones = package.stats.zones.len(),
            "Model package loaded"
        );
        Ok(package)
    }

    /// The persisted snapshot view that drives prediction-mode assembly.
    pub fn assembly_plan(&self) -> AssemblyPlan<'_> {
        AssemblyPlan {
            stats: &self.stats,
            medians: &self.medians,
            numeric_features: &self.numeric_features,
            categorical_features: &self.categorical_features,
        }
    }

    /// Runs prediction-mode assembly and the estimator over a raw request
    /// frame. Returns one prediction per row plus the substitution report.
    pub fn predict(&self, frame: &mut Frame) -> Result<(Vec<f64>, SubstitutionReport)> {
        let (features, report) = assemble_prediction(frame, &self.assembly_plan())?;
        let matrix = self.preprocessor.transform(&features)?;
        let predictions = self.estimator.predict(&matrix)?;
        Ok((predictions.to_vec(), report))
    }

    /// Classifies a prediction for a zone using the persisted statistics.
    pub fn classify(&self, prediction: f64, zone: Option<i64>) -> TrafficLevel {
        classify_for_zone(prediction, zone, &self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{TARGET_COLUMN, ZONE_COLUMN};
    use crate::model::Algorithm;
    use std::env;

    fn training_frame() -> Frame {
        let mut frame = Frame::with_rows(6);
        frame
            .insert_numeric(ZONE_COLUMN, vec![1.0, 1.0, 1.0, 2.0, 2.0, 2.0])
            .unwrap();
        frame
            .insert_categorical(
                "fecha",
                vec![
                    "01/01/2024 08:00".into(),
                    "02/01/2024 08:00".into(),
                    "03/01/2024 09:00".into(),
                    "01/01/2024 08:00".into(),
                    "02/01/2024 09:00".into(),
                    "03/01/2024 08:00".into(),
                ],
            )
            .unwrap();
        frame
            .insert_numeric(TARGET_COLUMN, vec![100.0, 120.0, 140.0, 40.0, 50.0, 60.0])
            .unwrap();
        frame
            .insert_numeric("temp", vec![10.0, 12.0, 14.0, 10.0, 12.0, 14.0])
            .unwrap();
        frame
    }

    #[test]
    fn test_save_load_round_trip() {
        let (package, _) =
            crate::model::train(&training_frame(), Algorithm::DecisionTree, 0.0, 42).unwrap();
        let path = format!(
            "{}/safedrive_test_package.bin",
            env::temp_dir().display()
        );
        package.save(&path).unwrap();

        let restored = TrainedModelPackage::load(&path).unwrap();
        assert_eq!(restored.numeric_features, package.numeric_features);
        assert_eq!(restored.stats, package.stats);

        let mut request = Frame::with_rows(1);
        request.insert_numeric(ZONE_COLUMN, vec![1.0]).unwrap();
        request
            .insert_categorical("fecha", vec!["04/01/2024 08:00".into()])
            .unwrap();
        request.insert_numeric("temp", vec![12.0]).unwrap();

        let (original_pred, _) = package.predict(&mut request.clone()).unwrap();
        let (restored_pred, _) = restored.predict(&mut request).unwrap();
        assert_eq!(original_pred, restored_pred);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_missing_file_fails() {
        let result = TrainedModelPackage::load("/nonexistent/safedrive.bin");
        assert!(result.is_err());
    }

    #[test]
    fn test_predict_on_unseen_zone_degrades_silently() {
        let (package, _) =
            crate::model::train(&training_frame(), Algorithm::DecisionTree, 0.0, 42).unwrap();
        let mut request = Frame::with_rows(1);
        request.insert_numeric(ZONE_COLUMN, vec![777.0]).unwrap();
        request
            .insert_categorical("fecha", vec!["04/01/2024 08:00".into()])
            .unwrap();

        let (predictions, report) = package.predict(&mut request).unwrap();
        assert_eq!(predictions.len(), 1);
        assert!(predictions[0].is_finite());
        assert_eq!(report.unseen_zones, 1);
    }
}
