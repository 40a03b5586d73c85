//! Column preprocessing fitted at training time and persisted with the
//! estimator: standard scaling for numeric features, one-hot encoding for
//! categoricals. An unknown category at prediction time encodes as all
//! zeros rather than failing.

use anyhow::{Result, bail};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::frame::Frame;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ScaledColumn {
    name: String,
    mean: f64,
    std: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct EncodedColumn {
    name: String,
    /// Categories observed at training time, sorted for a stable layout.
    categories: Vec<String>,
}

/// Turns an assembled feature frame into the estimator's numeric matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    numeric: Vec<ScaledColumn>,
    categorical: Vec<EncodedColumn>,
}

impl Preprocessor {
    /// Fits scaling and encoding parameters on the given (training) frame.
    pub fn fit(frame: &Frame, numeric: &[String], categorical: &[String]) -> Result<Self> {
        let mut scaled = Vec::with_capacity(numeric.len());
        for name in numeric {
            let Some(cells) = frame.numeric(name) else {
                bail!("preprocessor fit: numeric column '{name}' is absent");
            };
            let values: Vec<f64> = cells.iter().flatten().copied().collect();
            let mean = crate::features::util::mean(&values);
            let std = crate::features::util::sample_std(&values, mean);
            scaled.push(ScaledColumn {
                name: name.clone(),
                mean,
                std,
            });
        }

        let mut encoded = Vec::with_capacity(categorical.len());
        for name in categorical {
            let Some(cells) = frame.categorical(name) else {
                bail!("preprocessor fit: categorical column '{name}' is absent");
            };
            let mut categories: Vec<String> =
                cells.iter().flatten().cloned().collect();
            categories.sort();
            categories.dedup();
            encoded.push(EncodedColumn {
                name: name.clone(),
                categories,
            });
        }

        Ok(Preprocessor {
            numeric: scaled,
            categorical: encoded,
        })
    }

    /// Width of the produced matrix: one column per numeric feature plus
    /// one per observed category.
    pub fn width(&self) -> usize {
        self.numeric.len()
            + self
                .categorical
                .iter()
                .map(|c| c.categories.len())
                .sum::<usize>()
    }

    /// Transforms an assembled frame into the estimator input matrix.
    pub fn transform(&self, frame: &Frame) -> Result<Array2<f64>> {
        let rows = frame.rows();
        let mut matrix = Array2::<f64>::zeros((rows, self.width()));

        let mut offset = 0;
        for column in &self.numeric {
            let Some(cells) = frame.numeric(&column.name) else {
                bail!("transform: numeric column '{}' is absent", column.name);
            };
            let divisor = if column.std > 0.0 { column.std } else { 1.0 };
            for (row, cell) in cells.iter().enumerate() {
                let value = cell.unwrap_or(column.mean);
                matrix[[row, offset]] = (value - column.mean) / divisor;
            }
            offset += 1;
        }

        for column in &self.categorical {
            let Some(cells) = frame.categorical(&column.name) else {
                bail!("transform: categorical column '{}' is absent", column.name);
            };
            for (row, cell) in cells.iter().enumerate() {
                if let Some(value) = cell {
                    if let Ok(idx) = column.categories.binary_search(value) {
                        matrix[[row, offset + idx]] = 1.0;
                    }
                }
            }
            offset += column.categories.len();
        }

        Ok(matrix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fitted() -> (Preprocessor, Frame) {
        let mut frame = Frame::with_rows(3);
        frame
            .insert_numeric("temp", vec![10.0, 12.0, 14.0])
            .unwrap();
        frame.insert_numeric("flat", vec![5.0, 5.0, 5.0]).unwrap();
        frame
            .insert_categorical(
                "conditions",
                vec!["clear".into(), "rain".into(), "clear".into()],
            )
            .unwrap();
        let pre = Preprocessor::fit(
            &frame,
            &["temp".to_string(), "flat".to_string()],
            &["conditions".to_string()],
        )
        .unwrap();
        (pre, frame)
    }

    #[test]
    fn test_width() {
        let (pre, _) = fitted();
        assert_eq!(pre.width(), 4);
    }

    #[test]
    fn test_scaling_centers_training_data() {
        let (pre, frame) = fitted();
        let matrix = pre.transform(&frame).unwrap();
        assert!((matrix[[0, 0]] + matrix[[2, 0]]).abs() < 1e-12);
        assert_eq!(matrix[[1, 0]], 0.0);
        // Zero-variance column stays zero instead of dividing by zero.
        assert_eq!(matrix[[0, 1]], 0.0);
    }

    #[test]
    fn test_one_hot_layout() {
        let (pre, frame) = fitted();
        let matrix = pre.transform(&frame).unwrap();
        // Categories are sorted: ["clear", "rain"].
        assert_eq!(matrix[[0, 2]], 1.0);
        assert_eq!(matrix[[0, 3]], 0.0);
        assert_eq!(matrix[[1, 2]], 0.0);
        assert_eq!(matrix[[1, 3]], 1.0);
    }

    #[test]
    fn test_unknown_category_encodes_as_zeros() {
        let (pre, _) = fitted();
        let mut frame = Frame::with_rows(1);
        frame.insert_numeric("temp", vec![12.0]).unwrap();
        frame.insert_numeric("flat", vec![5.0]).unwrap();
        frame
            .insert_categorical("conditions", vec!["hail".into()])
            .unwrap();
        let matrix = pre.transform(&frame).unwrap();
        assert_eq!(matrix[[0, 2]], 0.0);
        assert_eq!(matrix[[0, 3]], 0.0);
    }

    #[test]
    fn test_transform_missing_column_fails() {
        let (pre, _) = fitted();
        let mut frame = Frame::with_rows(1);
        frame.insert_numeric("temp", vec![12.0]).unwrap();
        assert!(pre.transform(&frame).is_err());
    }
}
