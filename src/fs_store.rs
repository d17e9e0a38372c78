//! fs_store.rs
//!
//! Filesystem-backed dataset store. Layout:
//!
//! ```text
//! {root}/{database}/{table}/_schema.json
//! {root}/{database}/{table}/part-00000.jsonl
//! {root}/{database}/{table}/part-00001.jsonl
//! ```
//!
//! Partitions are JSON Lines, one object per row keyed by column name. Files
//! are staged under a dot-prefixed name and renamed into place, so readers
//! never observe a half-written partition.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::dataset::{
    check_append, row_to_json, validate_name, AppendOutcome, Batch, Cell, Column, Dataset,
    DatasetStore, Partition, Row,
};
use crate::errors::{PipelineError, Result};

const SCHEMA_FILE: &str = "_schema.json";

#[derive(Debug, Serialize, Deserialize)]
struct SchemaFile {
    columns: Vec<Column>,
}

/// Store rooted at `{root}/{database}`.
#[derive(Debug, Clone)]
pub struct FsDatasetStore {
    base: PathBuf,
}

impl FsDatasetStore {
    pub fn new(root: impl AsRef<Path>, database: &str) -> Result<Self> {
        validate_name(database)?;
        Ok(Self {
            base: root.as_ref().join(database),
        })
    }

    fn table_dir(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.base.join(name))
    }

    fn existing_table_dir(&self, name: &str) -> Result<PathBuf> {
        let dir = self.table_dir(name)?;
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(PipelineError::UnknownDataset(name.to_string()))
        }
    }

    fn read_schema(dir: &Path) -> Result<Option<Vec<Column>>> {
        let path = dir.join(SCHEMA_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let file: SchemaFile = serde_json::from_slice(&fs::read(path)?)?;
        Ok(Some(file.columns))
    }

    /// Published partition files, in index order.
    fn partition_files(dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with("part-") && n.ends_with(".jsonl"))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();
        Ok(files)
    }

    /// Index parsed from a `part-NNNNN.jsonl` file name.
    fn partition_index(path: &Path) -> Option<usize> {
        path.file_name()?
            .to_str()?
            .strip_prefix("part-")?
            .strip_suffix(".jsonl")?
            .parse()
            .ok()
    }

    /// One past the highest published index, so a gap never reuses a name.
    fn next_partition_index(dir: &Path) -> Result<usize> {
        Ok(Self::partition_files(dir)?
            .iter()
            .filter_map(|p| Self::partition_index(p))
            .max()
            .map_or(0, |i| i + 1))
    }

    fn load_descriptor(name: &str, dir: &Path) -> Result<Dataset> {
        let schema = Self::read_schema(dir)?;
        let mut partitions = Vec::new();
        for (position, path) in Self::partition_files(dir)?.iter().enumerate() {
            let index = Self::partition_index(path).unwrap_or(position);
            let rows = fs::read_to_string(path)?
                .lines()
                .filter(|l| !l.trim().is_empty())
                .count();
            partitions.push(Partition { index, rows });
        }
        Ok(Dataset {
            name: name.to_string(),
            schema,
            partitions,
        })
    }

    /// Write `contents` to a hidden sibling of `target`, then rename it over.
    fn publish(target: &Path, contents: &[u8]) -> Result<()> {
        let file_name = target
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("staged");
        let staging = target.with_file_name(format!(".{file_name}.tmp"));
        {
            let mut file = fs::File::create(&staging)?;
            file.write_all(contents)?;
            file.sync_all()?;
        }
        if let Err(e) = fs::rename(&staging, target) {
            let _ = fs::remove_file(&staging);
            return Err(e.into());
        }
        Ok(())
    }
}

impl DatasetStore for FsDatasetStore {
    fn ensure_dataset(&self, name: &str) -> Result<Dataset> {
        let dir = self.table_dir(name)?;
        if !dir.is_dir() {
            fs::create_dir_all(&dir)?;
            info!(dataset = %name, path = %dir.display(), "Created dataset");
        }
        Self::load_descriptor(name, &dir)
    }

    fn append_records(&self, name: &str, batch: &Batch) -> Result<AppendOutcome> {
        let dir = self.existing_table_dir(name)?;
        let current = Self::load_descriptor(name, &dir)?;
        let schema = check_append(&current, batch)?;

        let mut body = Vec::new();
        for row in &batch.rows {
            serde_json::to_writer(&mut body, &row_to_json(&schema, row))?;
            body.push(b'\n');
        }

        if current.schema.is_none() {
            let file = SchemaFile {
                columns: schema.clone(),
            };
            Self::publish(&dir.join(SCHEMA_FILE), &serde_json::to_vec_pretty(&file)?)?;
        }

        let index = Self::next_partition_index(&dir)?;
        let target = dir.join(format!("part-{index:05}.jsonl"));
        Self::publish(&target, &body)?;

        debug!(dataset = %name, partition = index, rows = batch.len(), path = %target.display(), "Appended partition");
        Ok(AppendOutcome {
            partition: index,
            rows: batch.len(),
        })
    }

    fn describe(&self, name: &str) -> Result<Dataset> {
        let dir = self.existing_table_dir(name)?;
        Self::load_descriptor(name, &dir)
    }

    fn scan(&self, name: &str) -> Result<Vec<Row>> {
        let dir = self.existing_table_dir(name)?;
        let Some(schema) = Self::read_schema(&dir)? else {
            return Ok(Vec::new());
        };

        let mut rows = Vec::new();
        for path in Self::partition_files(&dir)? {
            for line in fs::read_to_string(&path)?.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                let value: Value = serde_json::from_str(line)?;
                let row = schema
                    .iter()
                    .map(|column| {
                        value
                            .get(&column.name)
                            .and_then(|v| Cell::from_json(column.ty, v))
                            .ok_or_else(|| PipelineError::SchemaMismatch {
                                dataset: name.to_string(),
                                expected: Column::describe(&schema),
                                found: format!("{} in {}", line, path.display()),
                            })
                    })
                    .collect::<Result<Row>>()?;
                rows.push(row);
            }
        }
        Ok(rows)
    }
}
