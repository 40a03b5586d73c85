//! Feature assembly for training and prediction.
//!
//! Training mode derives calendar features, builds the aggregate
//! statistics, joins them per row and records the medians and the ordered
//! feature lists actually present. Prediction mode replays exactly those
//! joins from the persisted snapshot, substituting defaults for unseen
//! zones/hours and medians for missing values, so the prediction matrix is
//! column-identical to the training matrix.

use anyhow::{Result, bail};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::dataset::{TARGET_COLUMN, zone_ids};
use crate::features::stats::AggregateStats;
use crate::features::temporal;
use crate::features::util::median;
use crate::frame::Frame;

/// Numeric features the model consumes, in persisted order. Names absent
/// from a training dataset are dropped from the active list, not an error.
pub static NUMERIC_FEATURES: &[&str] = &[
    // weather covariates, as named by the provider export
    "temp",
    "feelslike",
    "dew",
    "humidity",
    "precip",
    "precipprob",
    "windgust",
    "windspeed",
    "winddir",
    "cloudcover",
    "visibility",
    // calendar features
    "hour",
    "month",
    "weekday",
    "quarter",
    "is_weekend",
    "hour_sin",
    "hour_cos",
    "month_sin",
    "month_cos",
    "weekday_sin",
    "weekday_cos",
    "is_night",
    "is_morning",
    "is_afternoon",
    "is_rush_hour",
    // historical aggregates joined per row
    "zone_mean",
    "zone_std",
    "zone_min",
    "zone_max",
    "hour_mean",
    "hour_std",
];

/// Categorical features the model consumes.
pub static CATEGORICAL_FEATURES: &[&str] = &[temporal::CONDITIONS_COLUMN];

/// Counts of the default substitutions applied while assembling a
/// prediction batch. Substitution is silent by design; the counts keep it
/// observable.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SubstitutionReport {
    pub unseen_zones: usize,
    pub unseen_hours: usize,
    pub columns_created: usize,
    pub numeric_cells_filled: usize,
    pub categorical_cells_filled: usize,
}

impl SubstitutionReport {
    pub fn is_clean(&self) -> bool {
        *self == SubstitutionReport::default()
    }
}

/// Output of training-mode assembly: everything needed to train the
/// estimator and to replay the assembly at prediction time.
#[derive(Debug, Clone)]
pub struct TrainingMatrix {
    /// Projected feature columns: numeric features first, then
    /// categoricals, all missing values filled.
    pub features: Frame,
    pub target: Vec<f64>,
    pub numeric_features: Vec<String>,
    pub categorical_features: Vec<String>,
    pub medians: BTreeMap<String, f64>,
    pub stats: AggregateStats,
}

/// Borrowed view of the persisted snapshot that drives prediction-mode
/// assembly. No other training-time artifact may influence it.
#[derive(Debug, Clone, Copy)]
pub struct AssemblyPlan<'a> {
    pub stats: &'a AggregateStats,
    pub medians: &'a BTreeMap<String, f64>,
    pub numeric_features: &'a [String],
    pub categorical_features: &'a [String],
}

/// Assembles the training matrix from a raw training frame.
pub fn assemble_training(frame: &mut Frame) -> Result<TrainingMatrix> {
    temporal::derive(frame)?;
    let stats = AggregateStats::build(frame)?;
    join_statistics(frame, &stats)?;

    let numeric_features = active_features(frame, NUMERIC_FEATURES, true);
    let categorical_features = active_features(frame, CATEGORICAL_FEATURES, false);
    if numeric_features.is_empty() {
        bail!("no configured numeric feature is present in the training dataset");
    }

    let mut medians = BTreeMap::new();
    for name in &numeric_features {
        let present: Vec<f64> = frame
            .numeric(name)
            .map(|cells| cells.iter().flatten().copied().collect())
            .unwrap_or_default();
        let value = median(&present).unwrap_or(0.0);
        medians.insert(name.clone(), value);
        frame.fill_numeric(name, value);
    }
    for name in &categorical_features {
        frame.fill_categorical(name, temporal::UNKNOWN_CONDITION);
    }

    let target_cells = frame
        .numeric(TARGET_COLUMN)
        .ok_or_else(|| anyhow::anyhow!("training frame lost the '{TARGET_COLUMN}' column"))?;
    let mut target = Vec::with_capacity(frame.rows());
    for (row, cell) in target_cells.iter().enumerate() {
        match cell {
            Some(value) => target.push(*value),
            None => bail!("target column '{TARGET_COLUMN}' is empty at row {row}"),
        }
    }

    let features = project_ordered(frame, &numeric_features, &categorical_features)?;
    debug!(
        rows = features.rows(),
        numeric = numeric_features.len(),
        categorical = categorical_features.len(),
        "Training matrix assembled"
    );

    Ok(TrainingMatrix {
        features,
        target,
        numeric_features,
        categorical_features,
        medians,
        stats,
    })
}

/// Assembles a prediction matrix from a raw request frame and the
/// persisted snapshot. Column-identical to the training matrix.
pub fn assemble_prediction(
    frame: &mut Frame,
    plan: &AssemblyPlan,
) -> Result<(Frame, SubstitutionReport)> {
    temporal::derive(frame)?;

    let mut report = SubstitutionReport::default();
    let (unseen_zones, unseen_hours) = join_statistics(frame, plan.stats)?;
    report.unseen_zones = unseen_zones;
    report.unseen_hours = unseen_hours;

    for name in plan.numeric_features {
        if frame.numeric(name).is_none() {
            let fill = plan.medians.get(name).copied().unwrap_or(0.0);
            frame.insert_numeric(name, vec![fill; frame.rows()])?;
            report.columns_created += 1;
        } else {
            let fill = plan.medians.get(name).copied().unwrap_or(0.0);
            report.numeric_cells_filled += frame.fill_numeric(name, fill);
        }
    }
    for name in plan.categorical_features {
        if frame.categorical(name).is_none() {
            frame.insert_categorical(
                name,
                vec![temporal::UNKNOWN_CONDITION.to_string(); frame.rows()],
            )?;
            report.columns_created += 1;
        } else {
            report.categorical_cells_filled +=
                frame.fill_categorical(name, temporal::UNKNOWN_CONDITION);
        }
    }

    let features = project_ordered(frame, plan.numeric_features, plan.categorical_features)?;

    if report.is_clean() {
        debug!(rows = features.rows(), "Prediction matrix assembled");
    } else {
        warn!(
            rows = features.rows(),
            unseen_zones = report.unseen_zones,
            unseen_hours = report.unseen_hours,
            columns_created = report.columns_created,
            numeric_cells_filled = report.numeric_cells_filled,
            categorical_cells_filled = report.categorical_cells_filled,
            "Prediction matrix assembled with default substitutions"
        );
    }

    Ok((features, report))
}

/// Left-joins zone and hour statistics into the frame, filling misses with
/// the global defaults. Returns (unseen-zone rows, unseen-hour rows).
fn join_statistics(frame: &mut Frame, stats: &AggregateStats) -> Result<(usize, usize)> {
    let Some(hours) = frame.numeric("hour") else {
        bail!("statistics join requires the derived 'hour' column");
    };
    let hour_keys: Vec<Option<u8>> = hours
        .iter()
        .map(|h| h.map(|h| h as u8))
        .collect();
    let zone_keys = zone_ids(frame);

    let mut unseen_zones = 0;
    let mut unseen_hours = 0;
    let rows = frame.rows();

    let mut zone_mean = Vec::with_capacity(rows);
    let mut zone_std = Vec::with_capacity(rows);
    let mut zone_min = Vec::with_capacity(rows);
    let mut zone_max = Vec::with_capacity(rows);
    let mut hour_mean = Vec::with_capacity(rows);
    let mut hour_std = Vec::with_capacity(rows);

    for row in 0..rows {
        let zone_key = zone_keys[row];
        if !zone_key.is_some_and(|z| stats.zones.contains_key(&z)) {
            unseen_zones += 1;
        }
        let zs = stats.zone_or_default(zone_key);
        zone_mean.push(zs.mean);
        zone_std.push(zs.std);
        zone_min.push(zs.min);
        zone_max.push(zs.max);

        let hour_key = hour_keys[row];
        if !hour_key.is_some_and(|h| stats.hours.contains_key(&h)) {
            unseen_hours += 1;
        }
        let hs = stats.hour_or_default(hour_key);
        hour_mean.push(hs.mean);
        hour_std.push(hs.std);
    }

    frame.insert_numeric("zone_mean", zone_mean)?;
    frame.insert_numeric("zone_std", zone_std)?;
    frame.insert_numeric("zone_min", zone_min)?;
    frame.insert_numeric("zone_max", zone_max)?;
    frame.insert_numeric("hour_mean", hour_mean)?;
    frame.insert_numeric("hour_std", hour_std)?;

    Ok((unseen_zones, unseen_hours))
}

/// The configured names present in the frame with the expected type.
fn active_features(frame: &Frame, configured: &[&str], numeric: bool) -> Vec<String> {
    let mut active = Vec::new();
    for &name in configured {
        let present = if numeric {
            frame.numeric(name).is_some()
        } else {
            frame.categorical(name).is_some()
        };
        if present {
            active.push(name.to_string());
        } else {
            debug!(feature = name, "Configured feature absent from dataset, dropped");
        }
    }
    active
}

fn project_ordered(
    frame: &Frame,
    numeric: &[String],
    categorical: &[String],
) -> Result<Frame> {
    let ordered: Vec<String> = numeric.iter().chain(categorical.iter()).cloned().collect();
    frame.project(&ordered)
}
