//! Entrypoint: set up tracing, load configuration, then either inspect the
//! blog content, run the market-data ingestion once, or serve the ingestion
//! loop together with the metrics & health endpoints.
//!
//! This application uses a strongly-typed configuration (`Settings`) defined in `config.rs`,
//! which provides:
//!  - `content_dir`        – root of the markdown content tree
//!  - `dataset_root`       – where the partitioned datasets live
//!  - `ingest_interval`    – how often `serve` triggers a run
//!  - `server_bind`        – HTTP bind address for metrics & health endpoints
//!  - `tracked_keys`       – ticker symbols fetched on every run
//!
//! `run-once` is the entry point for an external scheduler (cron, a cloud
//! event rule): the exit status tells the scheduler whether the run worked.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use blog_content_pipeline::config::Settings;
use blog_content_pipeline::content::DocumentStore;
use blog_content_pipeline::dataset::{Column, DatasetStore};
use blog_content_pipeline::errors::PipelineError;
use blog_content_pipeline::fs_store::FsDatasetStore;
use blog_content_pipeline::ingestor::IngestionRoutine;
use blog_content_pipeline::server;
use blog_content_pipeline::source::HttpQuoteSource;

#[derive(Parser)]
#[command(
    name = "blogctl",
    about = "Blog content store and scheduled market-data ingestion",
    version
)]
struct Cli {
    /// Path to a configuration file. Defaults to `./Config.toml` if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect the content tree.
    Docs {
        #[command(subcommand)]
        command: DocsCommand,
    },

    /// Run the ingestion routine once and exit.
    RunOnce,

    /// Trigger the ingestion routine every `ingest_interval` and serve
    /// `/metrics` and `/healthz`.
    Serve,

    /// Inspect the ingestion dataset.
    Dataset {
        #[command(subcommand)]
        command: DatasetCommand,
    },
}

#[derive(Subcommand)]
enum DocsCommand {
    /// List documents, newest first.
    List {
        /// Include drafts.
        #[arg(long)]
        drafts: bool,
    },
    /// Print one document.
    Show { path: String },
}

#[derive(Subcommand)]
enum DatasetCommand {
    /// Show schema, partitions and row counts.
    Describe,
}

#[tokio::main]
async fn main() -> Result<(), PipelineError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    info!(?settings, "Loaded configuration");

    match cli.command {
        Commands::Docs { command } => docs(&settings, command),
        Commands::RunOnce => {
            let routine = build_routine(&settings)?;
            routine.run_with_deadline(settings.run_timeout).await?;
            Ok(())
        }
        Commands::Serve => serve(settings).await,
        Commands::Dataset {
            command: DatasetCommand::Describe,
        } => {
            let store = FsDatasetStore::new(&settings.dataset_root, &settings.database)?;
            let ds = store.describe(&settings.table)?;
            let schema = ds
                .schema
                .as_deref()
                .map(Column::describe)
                .unwrap_or_else(|| "(none)".into());
            println!("dataset:    {}/{}", settings.database, ds.name);
            println!("schema:     {schema}");
            println!("partitions: {}", ds.partition_count());
            println!("rows:       {}", ds.row_count());
            Ok(())
        }
    }
}

fn docs(settings: &Settings, command: DocsCommand) -> Result<(), PipelineError> {
    let store = DocumentStore::load(&settings.content_dir)?;
    match command {
        DocsCommand::List { drafts } => {
            for doc in store.list_documents(drafts) {
                let marker = if doc.draft { " [draft]" } else { "" };
                println!(
                    "{}  {:<40} {}{}",
                    doc.date.format("%Y-%m-%d"),
                    doc.path,
                    doc.title,
                    marker
                );
            }
        }
        DocsCommand::Show { path } => {
            let doc = store.get_document(&path)?;
            println!("# {}", doc.title);
            println!("{}", doc.date.to_rfc3339());
            if !doc.tags.is_empty() {
                println!("tags: {}", doc.tags.join(", "));
            }
            for block in &doc.body {
                println!("\n{block}");
            }
        }
    }
    Ok(())
}

fn build_routine(settings: &Settings) -> Result<IngestionRoutine<HttpQuoteSource>, PipelineError> {
    let source = HttpQuoteSource::new(
        &settings.source_endpoint,
        settings.tracked_keys.clone(),
        settings.request_timeout,
    )?;
    let store: Arc<dyn DatasetStore> = Arc::new(FsDatasetStore::new(
        &settings.dataset_root,
        &settings.database,
    )?);
    Ok(IngestionRoutine::new(source, store, &settings.table))
}

/// Interval trigger plus metrics server. A tick that lands while the
/// previous run is still going is skipped by the routine itself.
async fn serve(settings: Settings) -> Result<(), PipelineError> {
    let addr: SocketAddr = settings.server_bind.parse().map_err(|e| {
        PipelineError::Config(config::ConfigError::Message(format!(
            "invalid server_bind {:?}: {e}",
            settings.server_bind
        )))
    })?;
    tokio::spawn(server::serve(addr));

    let routine = Arc::new(build_routine(&settings)?);
    let mut ticker = interval(settings.ingest_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        dataset  = %routine.dataset(),
        interval = ?settings.ingest_interval,
        "Starting ingestion trigger"
    );

    loop {
        ticker.tick().await;
        let routine = routine.clone();
        let deadline = settings.run_timeout;
        tokio::spawn(async move {
            // Outcome is already logged and counted by the routine.
            if let Err(e) = routine.run_with_deadline(deadline).await {
                if !matches!(e, PipelineError::RunSkipped) && !e.is_transient() {
                    error!(error = %e, "Run needs operator attention");
                }
            }
        });
    }
}
