//! source.rs
//!
//! External data sources for the ingestion routine. A source returns one
//! batch per call, one record per tracked key, or fails with
//! `SourceUnavailable` so the trigger can try again later.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::errors::{PipelineError, Result};
use crate::metrics::FETCH_HISTOGRAM;
use crate::record::{Record, Tabular};

#[async_trait]
pub trait RecordSource: Send + Sync {
    type Record: Tabular + Send + Sync;

    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    async fn fetch_source(&self) -> Result<Vec<Self::Record>>;
}

/// Daily quote as served by the upstream API.
#[derive(Debug, Deserialize)]
struct QuoteDto {
    date: NaiveDate,
    symbol: String,
    close: f64,
    volume: i64,
}

/// Pulls end-of-day quotes over HTTP:
/// `GET {endpoint}?symbols=AAPL,MSFT,TSLA` -> `[{date, symbol, close, volume}, …]`.
pub struct HttpQuoteSource {
    client: Client,
    endpoint: Url,
    keys: Vec<String>,
}

impl HttpQuoteSource {
    pub fn new(endpoint: &str, keys: Vec<String>, timeout: Duration) -> Result<Self> {
        let endpoint = Url::parse(endpoint).map_err(|e| PipelineError::SourceUnavailable {
            source_name: endpoint.to_string(),
            reason: format!("invalid endpoint: {e}"),
        })?;
        let client = Client::builder()
            .user_agent(concat!("blog-content-pipeline/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::SourceUnavailable {
                source_name: endpoint.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            endpoint,
            keys,
        })
    }

    fn request_url(&self) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("symbols", &self.keys.join(","));
        url
    }

    fn unavailable(&self, reason: impl ToString) -> PipelineError {
        PipelineError::SourceUnavailable {
            source_name: self.endpoint.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl RecordSource for HttpQuoteSource {
    type Record = Record;

    fn name(&self) -> &str {
        self.endpoint.as_str()
    }

    async fn fetch_source(&self) -> Result<Vec<Record>> {
        let start = Instant::now();
        let url = self.request_url();

        let quotes: Vec<QuoteDto> = self
            .client
            .get(url.clone())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| self.unavailable(e))?
            .json()
            .await
            .map_err(|e| self.unavailable(e))?;

        FETCH_HISTOGRAM.observe(start.elapsed().as_secs_f64());
        debug!(url = %url, quotes = quotes.len(), "Fetched quotes");

        // One record per tracked key, in tracked-key order; extras are ignored.
        let mut records = Vec::with_capacity(self.keys.len());
        for key in &self.keys {
            let quote = quotes
                .iter()
                .find(|q| q.symbol.eq_ignore_ascii_case(key))
                .ok_or_else(|| self.unavailable(format!("no quote for {key}")))?;
            records.push(Record {
                date: quote.date,
                key: key.clone(),
                value: quote.close,
                volume: quote.volume,
            });
        }
        Ok(records)
    }
}

/// Serves the same batch on every call. Used for dry runs and tests.
pub struct StaticSource<R> {
    name: String,
    records: Vec<R>,
}

impl<R> StaticSource<R> {
    pub fn new(name: &str, records: Vec<R>) -> Self {
        Self {
            name: name.to_string(),
            records,
        }
    }
}

#[async_trait]
impl<R> RecordSource for StaticSource<R>
where
    R: Tabular + Clone + Send + Sync,
{
    type Record = R;

    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_source(&self) -> Result<Vec<R>> {
        Ok(self.records.clone())
    }
}
