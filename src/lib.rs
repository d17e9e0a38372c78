//! Library entrypoint: re‑export modules

pub mod config;
pub mod content;
pub mod dataset;
pub mod document;
pub mod errors;
pub mod fs_store;
pub mod ingestor;
pub mod metrics;
pub mod record;
pub mod server;
pub mod source;
