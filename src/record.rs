//! record.rs
//!
//! Market records and their tabular shape. A batch's schema is whatever its
//! first row looks like; every later row has to agree with it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::dataset::{Batch, Cell, Column};
use crate::errors::{PipelineError, Result};

/// One observation for one tracked key on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub date: NaiveDate,
    pub key: String,
    pub value: f64,
    pub volume: i64,
}

/// A type that can be flattened into a row of named, typed cells.
pub trait Tabular {
    /// Identifier used in diagnostics.
    fn key(&self) -> &str;

    /// Named cells in column order. Fails if the value cannot be stored.
    fn to_row(&self) -> Result<Vec<(&'static str, Cell)>>;
}

impl Tabular for Record {
    fn key(&self) -> &str {
        &self.key
    }

    fn to_row(&self) -> Result<Vec<(&'static str, Cell)>> {
        if self.key.trim().is_empty() {
            return Err(PipelineError::InvalidRecord {
                key: self.key.clone(),
                reason: "empty key".into(),
            });
        }
        if !self.value.is_finite() {
            return Err(PipelineError::InvalidRecord {
                key: self.key.clone(),
                reason: format!("non-finite value {}", self.value),
            });
        }
        Ok(vec![
            ("date", Cell::Date(self.date)),
            ("key", Cell::String(self.key.clone())),
            ("value", Cell::Float64(self.value)),
            ("volume", Cell::Int64(self.volume)),
        ])
    }
}

/// Shape records into a columnar batch bound for `dataset`.
pub fn shape<R: Tabular>(dataset: &str, records: &[R]) -> Result<Batch> {
    let mut columns: Option<Vec<Column>> = None;
    let mut rows = Vec::with_capacity(records.len());

    for record in records {
        let named = record.to_row()?;
        let row_columns: Vec<Column> = named
            .iter()
            .map(|(name, cell)| Column::new(name, cell.column_type()))
            .collect();

        match &columns {
            None => columns = Some(row_columns),
            Some(expected) if *expected != row_columns => {
                return Err(PipelineError::SchemaMismatch {
                    dataset: dataset.to_string(),
                    expected: Column::describe(expected),
                    found: format!("{} (record {})", Column::describe(&row_columns), record.key()),
                });
            }
            Some(_) => {}
        }
        rows.push(named.into_iter().map(|(_, cell)| cell).collect());
    }

    Ok(Batch {
        columns: columns.unwrap_or_default(),
        rows,
    })
}
