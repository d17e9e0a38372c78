//! dataset.rs
//!
//! Append-only, partitioned datasets addressed by table name.
//!
//! A dataset starts with no schema; the first append fixes it and every
//! later append must carry exactly the same columns (names, order, types).
//! Each successful append publishes one new partition or nothing at all.
//!
//! Stores are explicit handles (`Arc<dyn DatasetStore>`) so every caller and
//! every test decides which store it talks to.

use std::fmt;

use chrono::NaiveDate;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::errors::{PipelineError, Result};

/// Column data types understood by the stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Date,
    String,
    Float64,
    Int64,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ColumnType::Date => "date",
            ColumnType::String => "string",
            ColumnType::Float64 => "float64",
            ColumnType::Int64 => "int64",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ColumnType,
}

impl Column {
    pub fn new(name: &str, ty: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            ty,
        }
    }

    /// `date: date, key: string, …` for logs and error messages.
    pub fn describe(columns: &[Column]) -> String {
        columns
            .iter()
            .map(|c| format!("{}: {}", c.name, c.ty))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// A single non-null value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Date(NaiveDate),
    String(String),
    Float64(f64),
    Int64(i64),
}

impl Cell {
    pub fn column_type(&self) -> ColumnType {
        match self {
            Cell::Date(_) => ColumnType::Date,
            Cell::String(_) => ColumnType::String,
            Cell::Float64(_) => ColumnType::Float64,
            Cell::Int64(_) => ColumnType::Int64,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Cell::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
            Cell::String(s) => Value::String(s.clone()),
            Cell::Float64(v) => serde_json::Number::from_f64(*v)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Cell::Int64(v) => Value::from(*v),
        }
    }

    /// Read a cell back under the column's declared type.
    pub fn from_json(ty: ColumnType, value: &Value) -> Option<Cell> {
        match ty {
            ColumnType::Date => value
                .as_str()
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
                .map(Cell::Date),
            ColumnType::String => value.as_str().map(|s| Cell::String(s.to_string())),
            ColumnType::Float64 => value.as_f64().map(Cell::Float64),
            ColumnType::Int64 => value.as_i64().map(Cell::Int64),
        }
    }
}

pub type Row = Vec<Cell>;

/// Rows plus the columns they were shaped under.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub columns: Vec<Column>,
    pub rows: Vec<Row>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    pub index: usize,
    pub rows: usize,
}

/// Dataset descriptor: name, schema (once set) and published partitions.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub name: String,
    pub schema: Option<Vec<Column>>,
    pub partitions: Vec<Partition>,
}

impl Dataset {
    pub fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            schema: None,
            partitions: Vec::new(),
        }
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    pub fn row_count(&self) -> usize {
        self.partitions.iter().map(|p| p.rows).sum()
    }
}

/// Result of one successful append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendOutcome {
    pub partition: usize,
    pub rows: usize,
}

/// Handle to a family of named datasets.
pub trait DatasetStore: Send + Sync {
    /// Create `name` with no schema if it does not exist yet. Idempotent.
    fn ensure_dataset(&self, name: &str) -> Result<Dataset>;

    /// Publish `batch` as one new partition of `name`.
    fn append_records(&self, name: &str, batch: &Batch) -> Result<AppendOutcome>;

    fn describe(&self, name: &str) -> Result<Dataset>;

    /// Every row of every partition, in partition order.
    fn scan(&self, name: &str) -> Result<Vec<Row>>;
}

/// Table names end up in paths; keep them boring.
pub fn validate_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(PipelineError::InvalidDatasetName(name.to_string()))
    }
}

/// Check `batch` against the dataset's current schema. Returns the schema
/// the dataset will have after the append.
pub fn check_append(dataset: &Dataset, batch: &Batch) -> Result<Vec<Column>> {
    if batch.is_empty() {
        return Err(PipelineError::EmptyBatch(dataset.name.clone()));
    }
    if let Some(row) = batch.rows.iter().find(|r| r.len() != batch.columns.len()) {
        return Err(PipelineError::SchemaMismatch {
            dataset: dataset.name.clone(),
            expected: Column::describe(&batch.columns),
            found: format!("row with {} cells", row.len()),
        });
    }
    for (i, row) in batch.rows.iter().enumerate() {
        for (column, cell) in batch.columns.iter().zip(row) {
            if cell.column_type() != column.ty {
                return Err(PipelineError::SchemaMismatch {
                    dataset: dataset.name.clone(),
                    expected: Column::describe(&batch.columns),
                    found: format!("row {i}: {} holds {}", column.name, cell.column_type()),
                });
            }
            if let Cell::Float64(v) = cell {
                if !v.is_finite() {
                    return Err(PipelineError::InvalidRecord {
                        key: format!("{} row {i}", dataset.name),
                        reason: format!("non-finite {} {v}", column.name),
                    });
                }
            }
        }
    }
    match &dataset.schema {
        Some(existing) if *existing != batch.columns => Err(PipelineError::SchemaMismatch {
            dataset: dataset.name.clone(),
            expected: Column::describe(existing),
            found: Column::describe(&batch.columns),
        }),
        Some(existing) => Ok(existing.clone()),
        None => Ok(batch.columns.clone()),
    }
}

/// Encode a row as a JSON object keyed by column name.
pub fn row_to_json(columns: &[Column], row: &Row) -> Value {
    let mut obj = Map::new();
    for (column, cell) in columns.iter().zip(row) {
        obj.insert(column.name.clone(), cell.to_json());
    }
    Value::Object(obj)
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory store
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct MemoryTable {
    meta: Dataset,
    partitions: Vec<Vec<Row>>,
}

/// Process-local store. Each instance is fully isolated.
#[derive(Debug, Default)]
pub struct MemoryDatasetStore {
    tables: DashMap<String, MemoryTable>,
}

impl MemoryDatasetStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DatasetStore for MemoryDatasetStore {
    fn ensure_dataset(&self, name: &str) -> Result<Dataset> {
        validate_name(name)?;
        let table = self.tables.entry(name.to_string()).or_insert_with(|| {
            info!(dataset = %name, "Created dataset");
            MemoryTable {
                meta: Dataset::empty(name),
                partitions: Vec::new(),
            }
        });
        Ok(table.meta.clone())
    }

    fn append_records(&self, name: &str, batch: &Batch) -> Result<AppendOutcome> {
        // The entry guard serialises appends to the same table.
        let mut table = self
            .tables
            .get_mut(name)
            .ok_or_else(|| PipelineError::UnknownDataset(name.to_string()))?;

        let schema = check_append(&table.meta, batch)?;
        let index = table.partitions.len();
        table.partitions.push(batch.rows.clone());
        table.meta.schema = Some(schema);
        table.meta.partitions.push(Partition {
            index,
            rows: batch.len(),
        });

        debug!(dataset = %name, partition = index, rows = batch.len(), "Appended partition");
        Ok(AppendOutcome {
            partition: index,
            rows: batch.len(),
        })
    }

    fn describe(&self, name: &str) -> Result<Dataset> {
        self.tables
            .get(name)
            .map(|t| t.meta.clone())
            .ok_or_else(|| PipelineError::UnknownDataset(name.to_string()))
    }

    fn scan(&self, name: &str) -> Result<Vec<Row>> {
        let table = self
            .tables
            .get(name)
            .ok_or_else(|| PipelineError::UnknownDataset(name.to_string()))?;
        Ok(table.partitions.iter().flatten().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> Vec<Column> {
        vec![
            Column::new("key", ColumnType::String),
            Column::new("value", ColumnType::Float64),
        ]
    }

    fn batch(n: usize) -> Batch {
        Batch {
            columns: columns(),
            rows: (0..n)
                .map(|i| vec![Cell::String(format!("K{i}")), Cell::Float64(i as f64)])
                .collect(),
        }
    }

    #[test]
    fn ensure_dataset_is_idempotent() {
        let store = MemoryDatasetStore::new();
        let first = store.ensure_dataset("market_tracker").unwrap();
        store.append_records("market_tracker", &batch(2)).unwrap();
        let again = store.ensure_dataset("market_tracker").unwrap();
        let third = store.ensure_dataset("market_tracker").unwrap();

        assert_eq!(first.schema, None);
        assert_eq!(again, third);
        assert_eq!(again.partition_count(), 1);
        assert_eq!(again.row_count(), 2);
    }

    #[test]
    fn each_append_adds_one_partition_and_its_rows() {
        let store = MemoryDatasetStore::new();
        store.ensure_dataset("t").unwrap();
        for (i, n) in [3usize, 1, 5].into_iter().enumerate() {
            let before = store.describe("t").unwrap();
            let outcome = store.append_records("t", &batch(n)).unwrap();
            let after = store.describe("t").unwrap();
            assert_eq!(outcome, AppendOutcome { partition: i, rows: n });
            assert_eq!(after.partition_count(), before.partition_count() + 1);
            assert_eq!(after.row_count(), before.row_count() + n);
        }
        assert_eq!(store.scan("t").unwrap().len(), 9);
    }

    #[test]
    fn mismatched_types_leave_the_dataset_untouched() {
        let store = MemoryDatasetStore::new();
        store.ensure_dataset("t").unwrap();
        store.append_records("t", &batch(2)).unwrap();

        let wrong = Batch {
            columns: vec![
                Column::new("key", ColumnType::String),
                Column::new("value", ColumnType::String),
            ],
            rows: vec![vec![Cell::String("K".into()), Cell::String("1.5".into())]],
        };
        let err = store.append_records("t", &wrong).unwrap_err();
        assert!(matches!(err, PipelineError::SchemaMismatch { .. }));

        let after = store.describe("t").unwrap();
        assert_eq!(after.partition_count(), 1);
        assert_eq!(after.row_count(), 2);
        assert_eq!(after.schema, Some(columns()));
    }

    #[test]
    fn append_requires_provisioning_and_rows() {
        let store = MemoryDatasetStore::new();
        assert!(matches!(
            store.append_records("t", &batch(1)),
            Err(PipelineError::UnknownDataset(_))
        ));
        store.ensure_dataset("t").unwrap();
        assert!(matches!(
            store.append_records("t", &batch(0)),
            Err(PipelineError::EmptyBatch(_))
        ));
        assert_eq!(store.describe("t").unwrap().schema, None);
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let store = MemoryDatasetStore::new();
        store.ensure_dataset("t").unwrap();
        let mut ragged = batch(2);
        ragged.rows[1].pop();
        assert!(matches!(
            store.append_records("t", &ragged),
            Err(PipelineError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn cells_must_match_their_declared_column() {
        let store = MemoryDatasetStore::new();
        store.ensure_dataset("t").unwrap();
        store.append_records("t", &batch(1)).unwrap();

        let mut lying = batch(1);
        lying.rows[0][1] = Cell::String("oops".into());
        assert!(matches!(
            store.append_records("t", &lying),
            Err(PipelineError::SchemaMismatch { .. })
        ));

        let mut nan = batch(1);
        nan.rows[0][1] = Cell::Float64(f64::NAN);
        assert!(matches!(
            store.append_records("t", &nan),
            Err(PipelineError::InvalidRecord { .. })
        ));

        let after = store.describe("t").unwrap();
        assert_eq!((after.partition_count(), after.row_count()), (1, 1));
        assert_eq!(store.scan("t").unwrap(), batch(1).rows);
    }

    #[test]
    fn dataset_names_are_validated() {
        assert!(validate_name("market_tracker").is_ok());
        assert!(validate_name("quotes-2024").is_ok());
        for bad in ["", "../etc", "a/b", "with space"] {
            assert!(validate_name(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn cells_survive_json_under_their_column_type() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let json = Cell::Date(date).to_json();
        assert_eq!(json, Value::String("2024-01-02".into()));
        assert_eq!(Cell::from_json(ColumnType::Date, &json), Some(Cell::Date(date)));
        assert_eq!(Cell::from_json(ColumnType::Int64, &Value::String("x".into())), None);
    }
}
