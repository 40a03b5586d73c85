//! Feature engineering for the traffic-intensity pipeline.
//!
//! This module derives calendar features from raw timestamps, builds the
//! per-zone and per-hour aggregate statistics, and assembles the model's
//! input matrix identically at training and prediction time.

pub mod assemble;
pub mod stats;
pub mod temporal;
pub mod util;
