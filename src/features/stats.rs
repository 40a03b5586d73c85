//! Historical aggregate statistics over the training target.
//!
//! Built exactly once per training run, from training data only, and
//! persisted with the estimator. Prediction-time assembly replays the
//! persisted tables; it never recomputes them from request data.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::dataset::{TARGET_COLUMN, zone_ids};
use crate::features::util::{mean, median, sample_std};
use crate::frame::Frame;

/// Historical intensity statistics for one zone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneStats {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

/// Historical intensity statistics for one hour of day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HourStats {
    pub mean: f64,
    pub std: f64,
}

/// Fallback statistics for zones and hours unseen at training time,
/// computed as the column-wise medians of the zone and hour tables.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlobalDefaults {
    pub zone: ZoneStats,
    pub hour: HourStats,
}

impl GlobalDefaults {
    /// The std to divide by when a zone's own std is zero or absent.
    /// Always strictly positive.
    pub fn divisor_std(&self) -> f64 {
        if self.zone.std > 0.0 { self.zone.std } else { 1.0 }
    }
}

/// The full statistics snapshot persisted inside a trained model package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub zones: BTreeMap<i64, ZoneStats>,
    pub hours: BTreeMap<u8, HourStats>,
    pub defaults: GlobalDefaults,
}

impl AggregateStats {
    /// Groups the training target by zone id and by hour of day.
    ///
    /// The frame must already carry the derived `hour` column. Rows whose
    /// zone id cannot be keyed contribute to hour statistics only. A
    /// single-observation group's standard deviation is coerced to 0.
    pub fn build(frame: &Frame) -> Result<Self> {
        let Some(target) = frame.numeric(TARGET_COLUMN) else {
            bail!("statistics require the numeric '{TARGET_COLUMN}' column");
        };
        let Some(hours) = frame.numeric("hour") else {
            bail!("statistics require the derived 'hour' column");
        };

        let keys = zone_ids(frame);
        let mut by_zone: BTreeMap<i64, Vec<f64>> = BTreeMap::new();
        let mut by_hour: BTreeMap<u8, Vec<f64>> = BTreeMap::new();

        for (row, value) in target.iter().enumerate() {
            let Some(value) = value else { continue };
            if let Some(zone) = keys[row] {
                by_zone.entry(zone).or_default().push(*value);
            }
            if let Some(hour) = hours[row] {
                by_hour.entry(hour as u8).or_default().push(*value);
            }
        }

        if by_zone.is_empty() {
            bail!("no rows with a usable zone id; cannot build zone statistics");
        }

        let zones: BTreeMap<i64, ZoneStats> = by_zone
            .into_iter()
            .map(|(zone, values)| {
                let m = mean(&values);
                (
                    zone,
                    ZoneStats {
                        mean: m,
                        std: sample_std(&values, m),
                        min: values.iter().copied().fold(f64::INFINITY, f64::min),
                        max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                    },
                )
            })
            .collect();

        let hours: BTreeMap<u8, HourStats> = by_hour
            .into_iter()
            .map(|(hour, values)| {
                let m = mean(&values);
                (
                    hour,
                    HourStats {
                        mean: m,
                        std: sample_std(&values, m),
                    },
                )
            })
            .collect();

        let defaults = GlobalDefaults {
            zone: column_medians(&zones),
            hour: HourStats {
                mean: median_of(hours.values().map(|s| s.mean)),
                std: median_of(hours.values().map(|s| s.std)),
            },
        };

        Ok(AggregateStats { zones, hours, defaults })
    }

    /// Zone statistics for `zone`, or the global defaults for an unseen
    /// (or unkeyable) zone.
    pub fn zone_or_default(&self, zone: Option<i64>) -> ZoneStats {
        zone.and_then(|z| self.zones.get(&z).copied())
            .unwrap_or(self.defaults.zone)
    }

    /// Hour statistics for `hour`, or the global defaults.
    pub fn hour_or_default(&self, hour: Option<u8>) -> HourStats {
        hour.and_then(|h| self.hours.get(&h).copied())
            .unwrap_or(self.defaults.hour)
    }
}

fn column_medians(zones: &BTreeMap<i64, ZoneStats>) -> ZoneStats {
    ZoneStats {
        mean: median_of(zones.values().map(|s| s.mean)),
        std: median_of(zones.values().map(|s| s.std)),
        min: median_of(zones.values().map(|s| s.min)),
        max: median_of(zones.values().map(|s| s.max)),
    }
}

fn median_of(values: impl Iterator<Item = f64>) -> f64 {
    median(&values.collect::<Vec<_>>()).unwrap_or(0.0)
}
