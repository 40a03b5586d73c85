//! Converts a numeric intensity prediction into a traffic level via a
//! z-score against the zone's historical distribution.
//!
//! | z-score      | Level  |
//! |--------------|--------|
//! | <= -0.5      | Low    |
//! | (-0.5, 0.5)  | Medium |
//! | >= 0.5       | High   |
//!
//! Boundaries are closed on the extremes and open in the middle, applied
//! uniformly wherever a level is derived.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::features::stats::AggregateStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrafficLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for TrafficLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TrafficLevel::Low => "Low",
            TrafficLevel::Medium => "Medium",
            TrafficLevel::High => "High",
        };
        f.write_str(label)
    }
}

/// Classifies a prediction against an explicit mean/std pair.
///
/// Total function: a non-positive std is treated as 1.0 so the z-score is
/// always defined. Callers holding statistics should resolve the pair with
/// [`classify_for_zone`] instead, which substitutes the global default std.
pub fn classify(prediction: f64, mean: f64, std: f64) -> TrafficLevel {
    let divisor = if std > 0.0 { std } else { 1.0 };
    let z = (prediction - mean) / divisor;
    if z <= -0.5 {
        TrafficLevel::Low
    } else if z >= 0.5 {
        TrafficLevel::High
    } else {
        TrafficLevel::Medium
    }
}

/// Classifies a prediction for a zone, resolving mean/std from the zone's
/// statistics when present and from the global defaults otherwise. A zone
/// std of zero resolves to the default std, which is strictly positive.
pub fn classify_for_zone(
    prediction: f64,
    zone: Option<i64>,
    stats: &AggregateStats,
) -> TrafficLevel {
    let zone_stats = stats.zone_or_default(zone);
    let std = if zone_stats.std > 0.0 {
        zone_stats.std
    } else {
        stats.defaults.divisor_std()
    };
    classify(prediction, zone_stats.mean, std)
}
