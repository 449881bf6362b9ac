//! Strongly-typed flight table
//!
//! A `FlightTable` is an ordered list of named columns, each either natively
//! numeric or free text, with explicit missing values. Every downstream stage
//! works on this type instead of a dynamically typed frame.

use crate::error::{FdrError, Result};
use polars::prelude::*;

/// One column of raw input values
#[derive(Debug, Clone, PartialEq)]
pub enum RawColumn {
    /// Natively numeric column; non-finite entries are stored as `None`
    Numeric(Vec<Option<f64>>),
    /// Any other column, kept as text
    Text(Vec<Option<String>>),
}

impl RawColumn {
    /// Numeric column from plain values, mapping NaN/inf to missing
    pub fn from_f64(values: Vec<f64>) -> Self {
        RawColumn::Numeric(
            values
                .into_iter()
                .map(|v| if v.is_finite() { Some(v) } else { None })
                .collect(),
        )
    }

    /// Text column from string slices
    pub fn from_strs<S: AsRef<str>>(values: &[S]) -> Self {
        RawColumn::Text(values.iter().map(|v| Some(v.as_ref().to_string())).collect())
    }

    pub fn len(&self) -> usize {
        match self {
            RawColumn::Numeric(v) => v.len(),
            RawColumn::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the column arrived with a numeric dtype
    pub fn is_numeric(&self) -> bool {
        matches!(self, RawColumn::Numeric(_))
    }

    /// Coerce to numbers; entries that do not parse become missing
    pub fn to_numeric(&self) -> Vec<Option<f64>> {
        match self {
            RawColumn::Numeric(values) => values.clone(),
            RawColumn::Text(values) => values
                .iter()
                .map(|v| v.as_deref().and_then(parse_number))
                .collect(),
        }
    }

    /// Gather rows by index, in the given order
    pub fn take(&self, indices: &[usize]) -> RawColumn {
        match self {
            RawColumn::Numeric(values) => {
                RawColumn::Numeric(indices.iter().map(|&i| values[i]).collect())
            }
            RawColumn::Text(values) => {
                RawColumn::Text(indices.iter().map(|&i| values[i].clone()).collect())
            }
        }
    }
}

/// Parse a trimmed decimal number, rejecting non-finite results
pub(crate) fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Ordered, named columns of equal length
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlightTable {
    names: Vec<String>,
    columns: Vec<RawColumn>,
    n_rows: usize,
}

impl FlightTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from `(name, column)` pairs
    pub fn from_columns<I, S>(columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, RawColumn)>,
        S: Into<String>,
    {
        let mut table = Self::new();
        for (name, column) in columns {
            table.push_column(name, column)?;
        }
        Ok(table)
    }

    /// Convert a polars `DataFrame`
    ///
    /// Integer and float columns become `Numeric`; every other dtype is
    /// rendered to text and left for the consumer to interpret.
    pub fn from_dataframe(df: &DataFrame) -> Result<Self> {
        let mut table = Self::new();
        for column in df.get_columns() {
            let series = column.as_materialized_series();
            let raw = if is_numeric_dtype(series.dtype()) {
                let cast = series.cast(&DataType::Float64)?;
                RawColumn::Numeric(
                    cast.f64()?
                        .into_iter()
                        .map(|v| v.filter(|x| x.is_finite()))
                        .collect(),
                )
            } else {
                let cast = series.cast(&DataType::String)?;
                RawColumn::Text(
                    cast.str()?
                        .into_iter()
                        .map(|v| v.map(str::to_string))
                        .collect(),
                )
            };
            table.push_column(series.name().to_string(), raw)?;
        }
        table.n_rows = df.height();
        Ok(table)
    }

    /// Append a column; its length must match the existing rows
    pub fn push_column(&mut self, name: impl Into<String>, column: RawColumn) -> Result<()> {
        let name = name.into();
        if self.names.iter().any(|n| n == &name) {
            return Err(FdrError::DataError(format!("duplicate column '{}'", name)));
        }
        if self.columns.is_empty() {
            self.n_rows = column.len();
        } else if column.len() != self.n_rows {
            return Err(FdrError::ShapeError {
                expected: format!("{} rows", self.n_rows),
                actual: format!("{} rows in column '{}'", column.len(), name),
            });
        }
        self.names.push(name);
        self.columns.push(column);
        Ok(())
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn column(&self, name: &str) -> Option<&RawColumn> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|idx| &self.columns[idx])
    }

    /// Columns in their original order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RawColumn)> {
        self.names.iter().map(String::as_str).zip(self.columns.iter())
    }

    /// New table holding the given rows, in the given order
    pub fn take_rows(&self, indices: &[usize]) -> FlightTable {
        FlightTable {
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| c.take(indices)).collect(),
            n_rows: indices.len(),
        }
    }
}

fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}
