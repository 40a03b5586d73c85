//! Loading of semicolon-separated traffic datasets and the zone catalog.

use anyhow::{Context, Result, bail};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::frame::{Column, Frame};

/// Name of the traffic-intensity target column in training datasets.
pub const TARGET_COLUMN: &str = "intensidad";
/// Name of the day-first date/time column.
pub const DATE_COLUMN: &str = "fecha";
/// Name of the zone-identifier column.
pub const ZONE_COLUMN: &str = "id";

/// Loads a semicolon-separated CSV into a [`Frame`].
///
/// Column types are inferred: a column where every non-empty cell parses as
/// a number becomes numeric, anything else categorical. Empty cells are
/// missing values.
pub fn load_frame(path: &str) -> Result<Frame> {
    let raw = fs::read(path).with_context(|| format!("reading dataset {path}"))?;
    let text = String::from_utf8_lossy(&raw);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .with_context(|| format!("reading header of {path}"))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut cells: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("reading row {} of {path}", line + 1))?;
        for (i, column) in cells.iter_mut().enumerate() {
            let value = record.get(i).unwrap_or("").trim();
            column.push(if value.is_empty() {
                None
            } else {
                Some(value.to_string())
            });
        }
    }

    let rows = cells.first().map_or(0, Vec::len);
    let mut frame = Frame::with_rows(rows);
    for (name, column) in headers.iter().zip(cells) {
        frame.insert(name, infer_column(column))?;
    }

    debug!(path, rows, columns = frame.names().len(), "Dataset loaded");
    Ok(frame)
}

/// Loads a training dataset, failing if the target column is absent.
pub fn load_training_frame(path: &str) -> Result<Frame> {
    let frame = load_frame(path)?;
    if frame.numeric(TARGET_COLUMN).is_none() {
        bail!("training dataset {path} is missing the numeric target column '{TARGET_COLUMN}'");
    }
    if !frame.contains(DATE_COLUMN) {
        bail!("training dataset {path} is missing the date column '{DATE_COLUMN}'");
    }
    info!(path, rows = frame.rows(), "Training dataset ready");
    Ok(frame)
}

fn infer_column(cells: Vec<Option<String>>) -> Column {
    let all_numeric = cells
        .iter()
        .flatten()
        .all(|v| parse_numeric(v).is_some());
    if all_numeric {
        Column::Numeric(
            cells
                .into_iter()
                .map(|c| c.as_deref().and_then(parse_numeric))
                .collect(),
        )
    } else {
        Column::Categorical(cells)
    }
}

fn parse_numeric(value: &str) -> Option<f64> {
    // Spanish exports use a comma decimal separator.
    value.replace(',', ".").parse::<f64>().ok().filter(|v| v.is_finite())
}

/// The per-row zone identifiers of a frame, as comparable integer keys.
///
/// A cell that is missing, non-numeric or fractional cannot be compared
/// against the persisted statistics keys and yields `None` (a join miss,
/// per the degraded-but-continue policy).
pub fn zone_ids(frame: &Frame) -> Vec<Option<i64>> {
    match frame.column(ZONE_COLUMN) {
        Some(Column::Numeric(cells)) => cells
            .iter()
            .map(|c| c.and_then(as_zone_key))
            .collect(),
        Some(Column::Categorical(cells)) => cells
            .iter()
            .map(|c| {
                c.as_deref()
                    .and_then(parse_numeric)
                    .and_then(as_zone_key)
            })
            .collect(),
        None => vec![None; frame.rows()],
    }
}

fn as_zone_key(value: f64) -> Option<i64> {
    (value.fract() == 0.0 && value.abs() < i64::MAX as f64).then_some(value as i64)
}

/// Loads the traffic-zone catalog (`id;nombre;...`) into an id → name map.
///
/// The catalog is optional decoration for CLI and CSV output; rows without
/// a usable id are skipped.
pub fn load_zone_catalog(path: &str) -> Result<HashMap<i64, String>> {
    if !Path::new(path).exists() {
        bail!("zone catalog {path} does not exist");
    }
    let raw = fs::read(path).with_context(|| format!("reading zone catalog {path}"))?;
    let text = String::from_utf8_lossy(&raw);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader.headers()?.clone();
    let id_idx = headers.iter().position(|h| h.trim() == ZONE_COLUMN);
    let name_idx = headers.iter().position(|h| h.trim() == "nombre");
    let (Some(id_idx), Some(name_idx)) = (id_idx, name_idx) else {
        bail!("zone catalog {path} needs 'id' and 'nombre' columns");
    };

    let mut zones = HashMap::new();
    for record in reader.records() {
        let record = record?;
        let id = record
            .get(id_idx)
            .and_then(|v| parse_numeric(v.trim()))
            .and_then(as_zone_key);
        if let Some(id) = id {
            let name = record.get(name_idx).unwrap_or("").trim().to_string();
            zones.insert(id, name);
        }
    }

    info!(path, zones = zones.len(), "Zone catalog loaded");
    Ok(zones)
}
