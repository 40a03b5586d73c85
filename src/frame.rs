//! A minimal named-column table used by the feature pipeline.
//!
//! Columns are either numeric or categorical, and every cell may be missing.
//! This is intentionally small: the pipeline only needs column lookup,
//! insertion, missing-value fills, row selection and ordered projection.

use anyhow::{Result, bail};

/// A single column of data. Missing cells are `None`.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Numeric(Vec<Option<f64>>),
    Categorical(Vec<Option<String>>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(v) => v.len(),
            Column::Categorical(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A table of named columns, all of equal length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    rows: usize,
    names: Vec<String>,
    columns: Vec<Column>,
}

impl Frame {
    /// Creates an empty frame with a fixed row count. Columns added later
    /// must match this length.
    pub fn with_rows(rows: usize) -> Self {
        Frame {
            rows,
            names: Vec::new(),
            columns: Vec::new(),
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Column names, in insertion order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| &self.columns[i])
    }

    /// The cells of a numeric column, or `None` if absent or categorical.
    pub fn numeric(&self, name: &str) -> Option<&[Option<f64>]> {
        match self.column(name) {
            Some(Column::Numeric(v)) => Some(v),
            _ => None,
        }
    }

    /// The cells of a categorical column, or `None` if absent or numeric.
    pub fn categorical(&self, name: &str) -> Option<&[Option<String>]> {
        match self.column(name) {
            Some(Column::Categorical(v)) => Some(v),
            _ => None,
        }
    }

    pub fn numeric_value(&self, name: &str, row: usize) -> Option<f64> {
        self.numeric(name).and_then(|v| v.get(row).copied().flatten())
    }

    pub fn categorical_value(&self, name: &str, row: usize) -> Option<&str> {
        self.categorical(name)
            .and_then(|v| v.get(row))
            .and_then(|c| c.as_deref())
    }

    /// Inserts a column, replacing any existing column of the same name.
    pub fn insert(&mut self, name: &str, column: Column) -> Result<()> {
        if column.len() != self.rows {
            bail!(
                "column '{}' has {} cells, frame has {} rows",
                name,
                column.len(),
                self.rows
            );
        }
        if let Some(i) = self.names.iter().position(|n| n == name) {
            self.columns[i] = column;
        } else {
            self.names.push(name.to_string());
            self.columns.push(column);
        }
        Ok(())
    }

    /// Inserts a fully-present numeric column.
    pub fn insert_numeric(&mut self, name: &str, values: Vec<f64>) -> Result<()> {
        self.insert(name, Column::Numeric(values.into_iter().map(Some).collect()))
    }

    /// Inserts a fully-present categorical column.
    pub fn insert_categorical(&mut self, name: &str, values: Vec<String>) -> Result<()> {
        self.insert(
            name,
            Column::Categorical(values.into_iter().map(Some).collect()),
        )
    }

    /// Replaces missing cells of a numeric column with `value`.
    /// Returns the number of cells filled; 0 if the column is absent.
    pub fn fill_numeric(&mut self, name: &str, value: f64) -> usize {
        let Some(i) = self.names.iter().position(|n| n == name) else {
            return 0;
        };
        match &mut self.columns[i] {
            Column::Numeric(cells) => {
                let mut filled = 0;
                for cell in cells.iter_mut() {
                    if cell.is_none() {
                        *cell = Some(value);
                        filled += 1;
                    }
                }
                filled
            }
            Column::Categorical(_) => 0,
        }
    }

    /// Replaces missing cells of a categorical column with `value`.
    /// Returns the number of cells filled; 0 if the column is absent.
    pub fn fill_categorical(&mut self, name: &str, value: &str) -> usize {
        let Some(i) = self.names.iter().position(|n| n == name) else {
            return 0;
        };
        match &mut self.columns[i] {
            Column::Categorical(cells) => {
                let mut filled = 0;
                for cell in cells.iter_mut() {
                    if cell.is_none() {
                        *cell = Some(value.to_string());
                        filled += 1;
                    }
                }
                filled
            }
            Column::Numeric(_) => 0,
        }
    }

    /// A new frame holding exactly `names`, in the given order.
    /// Fails if any name is absent.
    pub fn project(&self, names: &[String]) -> Result<Frame> {
        let mut out = Frame::with_rows(self.rows);
        for name in names {
            match self.column(name) {
                Some(col) => out.insert(name, col.clone())?,
                None => bail!("projection requires missing column '{name}'"),
            }
        }
        Ok(out)
    }

    /// A new frame containing only the given row indices, in order.
    pub fn select_rows(&self, indices: &[usize]) -> Frame {
        let columns = self
            .columns
            .iter()
            .map(|col| match col {
                Column::Numeric(v) => {
                    Column::Numeric(indices.iter().map(|&i| v[i]).collect())
                }
                Column::Categorical(v) => {
                    Column::Categorical(indices.iter().map(|&i| v[i].clone()).collect())
                }
            })
            .collect();
        Frame {
            rows: indices.len(),
            names: self.names.clone(),
            columns,
        }
    }
}
