//! Output formatting and persistence for prediction results.
//!
//! Supports JSON logging of reports and semicolon-CSV append of
//! per-zone prediction records.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::classify::TrafficLevel;
use csv::WriterBuilder;
use std::fs::OpenOptions;
use std::path::Path;

/// One prediction result row, written per requested zone.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionRecord {
    /// When this record was produced.
    pub timestamp: DateTime<Utc>,
    pub zone_id: Option<i64>,
    pub zone_name: Option<String>,
    /// The requested date/time, as given in the input.
    pub fecha: Option<String>,
    pub predicted_intensity: f64,
    pub traffic_level: TrafficLevel,
}

/// Logs a serializable report as pretty-printed JSON.
pub fn print_json(value: &impl Serialize) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Appends prediction records as rows to a semicolon CSV file.
///
/// Creates the file with headers if it does not already exist.
pub fn append_records(path: &str, records: &[PredictionRecord]) -> Result<()> {
    let file_exists = Path::new(path).exists();
    debug!(path, file_exists, records = records.len(), "Appending CSV records");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .delimiter(b';')
        .has_headers(!file_exists) // IMPORTANT when appending
        .from_writer(file);

    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs;

    fn temp_path(name: &str) -> String {
        format!("{}/{}", env::temp_dir().display(), name)
    }

    fn record() -> PredictionRecord {
        PredictionRecord {
            timestamp: Utc::now(),
            zone_id: Some(3871),
            zone_name: Some("Av. Cardenal Herrera Oria".to_string()),
            fecha: Some("01/01/2024 08:00".to_string()),
            predicted_intensity: 240.5,
            traffic_level: TrafficLevel::High,
        }
    }

    #[test]
    fn test_print_json_does_not_panic() {
        print_json(&record()).unwrap();
    }

    #[test]
    fn test_append_records_creates_file() {
        let path = temp_path("safedrive_test_create.csv");
        let _ = fs::remove_file(&path); // clean up any prior run

        append_records(&path, &[record()]).unwrap();

        assert!(Path::new(&path).exists());
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("High"));
        assert!(content.contains(';'));

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_append_records_writes_header_once() {
        let path = temp_path("safedrive_test_header.csv");
        let _ = fs::remove_file(&path);

        append_records(&path, &[record()]).unwrap();
        append_records(&path, &[record()]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        // Header line should appear exactly once
        let header_count = content
            .lines()
            .filter(|l| l.contains("predicted_intensity"))
            .count();
        assert_eq!(header_count, 1);
        assert_eq!(content.lines().count(), 3);

        fs::remove_file(&path).unwrap();
    }
}
