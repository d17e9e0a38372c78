//! ingestor.rs
//!
//! The ingestion routine: fetch a batch from the source, shape it into
//! rows, make sure the dataset exists, and append the rows as one partition.
//!
//! Any failing stage aborts the run before anything is written. There is no
//! retry in here; the trigger that invoked the run decides whether to invoke
//! it again. If a trigger fires while a run is still going, the new run is
//! skipped.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::dataset::DatasetStore;
use crate::errors::{PipelineError, Result};
use crate::metrics::{
    ROWS_APPENDED, RUNS_FAILED, RUNS_SKIPPED, RUNS_STARTED, RUNS_SUCCEEDED, RUN_HISTOGRAM,
};
use crate::record::shape;
use crate::source::RecordSource;

pub struct IngestionRoutine<S> {
    source: S,
    store: Arc<dyn DatasetStore>,
    dataset: String,
    running: Mutex<()>,
}

impl<S: RecordSource> IngestionRoutine<S> {
    pub fn new(source: S, store: Arc<dyn DatasetStore>, dataset: &str) -> Self {
        Self {
            source,
            store,
            dataset: dataset.to_string(),
            running: Mutex::new(()),
        }
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    pub fn store(&self) -> &Arc<dyn DatasetStore> {
        &self.store
    }

    /// One invocation. Returns the number of rows appended, or
    /// `RunSkipped` if a previous invocation has not finished.
    pub async fn run_once(&self) -> Result<usize> {
        let Ok(_guard) = self.running.try_lock() else {
            RUNS_SKIPPED.inc();
            warn!(dataset = %self.dataset, "Previous run still in progress; skipping trigger");
            return Err(PipelineError::RunSkipped);
        };

        RUNS_STARTED.inc();
        let start = Instant::now();
        let result = self.run_stages().await;
        let elapsed = start.elapsed().as_secs_f64();
        RUN_HISTOGRAM.observe(elapsed);

        match &result {
            Ok(rows) => {
                RUNS_SUCCEEDED.inc();
                ROWS_APPENDED.inc_by(*rows as u64);
                info!(
                    dataset    = %self.dataset,
                    source     = %self.source.name(),
                    rows       = *rows,
                    duration_s = elapsed,
                    "Ingestion run complete"
                );
            }
            Err(e) if e.is_transient() => {
                RUNS_FAILED.inc();
                warn!(
                    dataset    = %self.dataset,
                    source     = %self.source.name(),
                    error      = %e,
                    duration_s = elapsed,
                    "Ingestion run failed; trigger may retry"
                );
            }
            Err(e) => {
                RUNS_FAILED.inc();
                error!(
                    dataset    = %self.dataset,
                    source     = %self.source.name(),
                    error      = %e,
                    duration_s = elapsed,
                    "Ingestion run failed"
                );
            }
        }
        result
    }

    /// `run_once` bounded by the trigger's execution deadline.
    pub async fn run_with_deadline(&self, deadline: Duration) -> Result<usize> {
        match tokio::time::timeout(deadline, self.run_once()).await {
            Ok(result) => result,
            Err(_) => {
                RUNS_FAILED.inc();
                warn!(dataset = %self.dataset, ?deadline, "Ingestion run exceeded its deadline");
                Err(PipelineError::DeadlineExceeded(deadline))
            }
        }
    }

    async fn run_stages(&self) -> Result<usize> {
        let records = self.source.fetch_source().await?;
        let batch = shape(&self.dataset, &records)?;
        self.store.ensure_dataset(&self.dataset)?;
        let outcome = self.store.append_records(&self.dataset, &batch)?;
        Ok(outcome.rows)
    }
}
