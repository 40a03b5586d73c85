//! Calendar feature derivation from the raw `fecha` column.
//!
//! Cyclical encodings keep hour 23 adjacent to hour 0: for a period `P`
//! and raw value `v` the pair `sin(2π·v/P)`, `cos(2π·v/P)` is emitted.

use anyhow::{Context, Result, bail};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use std::f64::consts::TAU;

use crate::dataset::DATE_COLUMN;
use crate::frame::{Column, Frame};

/// Token used for an absent or missing weather-condition label.
pub const UNKNOWN_CONDITION: &str = "unknown";

/// Name of the normalized categorical weather-condition column.
pub const CONDITIONS_COLUMN: &str = "conditions";

/// Accepted day-first timestamp layouts, most specific first.
static DATE_FORMATS: &[&str] = &[
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
];

/// Parses a day-first date/time string such as `01/01/2024 08:00`.
/// A bare date is accepted and resolves to midnight.
pub fn parse_day_first(value: &str) -> Result<NaiveDateTime> {
    let value = value.trim();
    for format in DATE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(dt);
        }
    }
    for format in ["%d/%m/%Y", "%d-%m-%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return Ok(date.and_hms_opt(0, 0, 0).expect("midnight is valid"));
        }
    }
    bail!("unparseable day-first timestamp '{value}'")
}

fn cyclical(value: f64, period: f64) -> (f64, f64) {
    let angle = TAU * value / period;
    (angle.sin(), angle.cos())
}

fn bool_flag(flag: bool) -> f64 {
    if flag { 1.0 } else { 0.0 }
}

/// Augments `frame` with the calendar features derived from its `fecha`
/// column and normalizes the weather-condition column.
///
/// # Errors
///
/// A missing `fecha` column, or any missing or malformed timestamp, fails
/// the whole batch: partial temporal derivation would silently skew every
/// downstream join keyed on the hour.
pub fn derive(frame: &mut Frame) -> Result<()> {
    let Some(dates) = frame.categorical(DATE_COLUMN) else {
        bail!("frame has no '{DATE_COLUMN}' column to derive temporal features from");
    };

    let mut parsed = Vec::with_capacity(frame.rows());
    for (row, cell) in dates.iter().enumerate() {
        let Some(raw) = cell else {
            bail!("row {row} has an empty '{DATE_COLUMN}' value");
        };
        let dt = parse_day_first(raw).with_context(|| format!("row {row}"))?;
        parsed.push(dt);
    }

    let hours: Vec<f64> = parsed.iter().map(|dt| f64::from(dt.hour())).collect();
    let months: Vec<f64> = parsed.iter().map(|dt| f64::from(dt.month())).collect();
    let weekdays: Vec<f64> = parsed
        .iter()
        .map(|dt| f64::from(dt.weekday().num_days_from_monday()))
        .collect();

    frame.insert_numeric("hour", hours.clone())?;
    frame.insert_numeric("month", months.clone())?;
    frame.insert_numeric("weekday", weekdays.clone())?;
    frame.insert_numeric(
        "quarter",
        months.iter().map(|m| ((m - 1.0) / 3.0).floor() + 1.0).collect(),
    )?;
    frame.insert_numeric(
        "is_weekend",
        weekdays.iter().map(|&d| bool_flag(d >= 5.0)).collect(),
    )?;

    for (name, values, period) in [
        ("hour", &hours, 24.0),
        ("month", &months, 12.0),
        ("weekday", &weekdays, 7.0),
    ] {
        let (sin, cos): (Vec<f64>, Vec<f64>) =
            values.iter().map(|&v| cyclical(v, period)).unzip();
        frame.insert_numeric(&format!("{name}_sin"), sin)?;
        frame.insert_numeric(&format!("{name}_cos"), cos)?;
    }

    frame.insert_numeric(
        "is_night",
        hours.iter().map(|&h| bool_flag(h >= 22.0 || h < 6.0)).collect(),
    )?;
    frame.insert_numeric(
        "is_morning",
        hours.iter().map(|&h| bool_flag((6.0..12.0).contains(&h))).collect(),
    )?;
    frame.insert_numeric(
        "is_afternoon",
        hours.iter().map(|&h| bool_flag((12.0..18.0).contains(&h))).collect(),
    )?;
    frame.insert_numeric(
        "is_rush_hour",
        hours
            .iter()
            .map(|&h| bool_flag((7.0..=9.0).contains(&h) || (17.0..=20.0).contains(&h)))
            .collect(),
    )?;

    normalize_conditions(frame)?;
    Ok(())
}

/// Ensures a `conditions` categorical column exists with no missing cells.
///
/// Datasets exported from the weather provider name the column
/// `conditionsDay`; both spellings are accepted. Absent or empty labels
/// become the literal `"unknown"` token.
fn normalize_conditions(frame: &mut Frame) -> Result<()> {
    let source = [CONDITIONS_COLUMN, "conditionsDay"]
        .iter()
        .find_map(|name| frame.categorical(name).map(<[Option<String>]>::to_vec));

    let cells = match source {
        Some(cells) => cells
            .into_iter()
            .map(|c| Some(c.unwrap_or_else(|| UNKNOWN_CONDITION.to_string())))
            .collect(),
        None => vec![Some(UNKNOWN_CONDITION.to_string()); frame.rows()],
    };
    frame.insert(CONDITIONS_COLUMN, Column::Categorical(cells))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_with_dates(dates: &[&str]) -> Frame {
        let mut frame = Frame::with_rows(dates.len());
        frame
            .insert_categorical(
                DATE_COLUMN,
                dates.iter().map(ToString::to_string).collect(),
            )
            .unwrap();
        frame
    }

    #[test]
    fn test_parse_day_first_variants() {
        assert_eq!(
            parse_day_first("01/02/2024 08:30").unwrap().hour(),
            8
        );
        assert_eq!(
            parse_day_first("01/02/2024 08:30:15").unwrap().second(),
            15
        );
        // Day-first: 01/02 is the 1st of February.
        assert_eq!(parse_day_first("01/02/2024").unwrap().month(), 2);
        assert!(parse_day_first("2024-02-01").is_err());
        assert!(parse_day_first("not a date").is_err());
    }

    #[test]
    fn test_derive_basic_calendar_columns() {
        // 01/01/2024 is a Monday.
        let mut frame = frame_with_dates(&["01/01/2024 08:00", "06/01/2024 23:15"]);
        derive(&mut frame).unwrap();

        assert_eq!(frame.numeric_value("hour", 0), Some(8.0));
        assert_eq!(frame.numeric_value("weekday", 0), Some(0.0));
        assert_eq!(frame.numeric_value("is_weekend", 0), Some(0.0));
        assert_eq!(frame.numeric_value("quarter", 0), Some(1.0));

        // 06/01/2024 is a Saturday.
        assert_eq!(frame.numeric_value("weekday", 1), Some(5.0));
        assert_eq!(frame.numeric_value("is_weekend", 1), Some(1.0));
        assert_eq!(frame.numeric_value("hour", 1), Some(23.0));
    }

    #[test]
    fn test_cyclical_encodings_lie_on_unit_circle() {
        let dates: Vec<String> = (0..24)
            .map(|h| format!("15/06/2024 {h:02}:00"))
            .collect();
        let refs: Vec<&str> = dates.iter().map(String::as_str).collect();
        let mut frame = frame_with_dates(&refs);
        derive(&mut frame).unwrap();

        for row in 0..frame.rows() {
            for name in ["hour", "month", "weekday"] {
                let sin = frame.numeric_value(&format!("{name}_sin"), row).unwrap();
                let cos = frame.numeric_value(&format!("{name}_cos"), row).unwrap();
                assert!((sin * sin + cos * cos - 1.0).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_day_segment_flags_partition_the_day() {
        let dates: Vec<String> = (0..24)
            .map(|h| format!("15/06/2024 {h:02}:00"))
            .collect();
        let refs: Vec<&str> = dates.iter().map(String::as_str).collect();
        let mut frame = frame_with_dates(&refs);
        derive(&mut frame).unwrap();

        for row in 0..24 {
            let night = frame.numeric_value("is_night", row).unwrap();
            let morning = frame.numeric_value("is_morning", row).unwrap();
            let afternoon = frame.numeric_value("is_afternoon", row).unwrap();
            let segments = night + morning + afternoon;
            // Hours 18-21 belong to none of the three segments.
            if (18..22).contains(&row) {
                assert_eq!(segments, 0.0, "hour {row}");
            } else {
                assert_eq!(segments, 1.0, "hour {row}");
            }
        }
    }

    #[test]
    fn test_rush_hour_flag() {
        let mut frame = frame_with_dates(&[
            "15/06/2024 07:00",
            "15/06/2024 09:00",
            "15/06/2024 10:00",
            "15/06/2024 17:00",
            "15/06/2024 20:00",
            "15/06/2024 21:00",
        ]);
        derive(&mut frame).unwrap();
        let flags: Vec<f64> = (0..6)
            .map(|r| frame.numeric_value("is_rush_hour", r).unwrap())
            .collect();
        assert_eq!(flags, vec![1.0, 1.0, 0.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_malformed_date_fails_whole_batch() {
        let mut frame = frame_with_dates(&["01/01/2024 08:00", "garbage"]);
        assert!(derive(&mut frame).is_err());
    }

    #[test]
    fn test_conditions_defaulted_when_absent() {
        let mut frame = frame_with_dates(&["01/01/2024 08:00"]);
        derive(&mut frame).unwrap();
        assert_eq!(
            frame.categorical_value(CONDITIONS_COLUMN, 0),
            Some(UNKNOWN_CONDITION)
        );
    }

    #[test]
    fn test_conditions_day_column_is_normalized() {
        let mut frame = Frame::with_rows(2);
        frame
            .insert_categorical(
                DATE_COLUMN,
                vec!["01/01/2024 08:00".into(), "01/01/2024 09:00".into()],
            )
            .unwrap();
        frame
            .insert(
                "conditionsDay",
                Column::Categorical(vec![Some("rain".into()), None]),
            )
            .unwrap();
        derive(&mut frame).unwrap();
        assert_eq!(frame.categorical_value(CONDITIONS_COLUMN, 0), Some("rain"));
        assert_eq!(
            frame.categorical_value(CONDITIONS_COLUMN, 1),
            Some(UNKNOWN_CONDITION)
        );
    }
}
