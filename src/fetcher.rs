//! Concurrent fetch pipeline: retrying HTTP client, per-source aggregation
//! and the catalog refresh cycle.
//!
//! Failure handling is layered. A single URL is retried with exponential
//! backoff unless the failure is a client error that cannot succeed on
//! retry. A source tolerates individual URL failures as long as one URL
//! yields content. A refresh cycle tolerates whole-source failures by
//! substituting placeholder documents, so one broken source never hides
//! the others.

use chrono::Utc;
use futures::future::join_all;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::catalog::{Catalog, Document};
use crate::config::SourceSpec;
use crate::normalize::{self, NormalizeOptions};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_BACKOFF_UNIT: Duration = Duration::from_secs(1);

/// Separator between per-URL parts of a multi-URL source.
pub const PART_SEPARATOR: &str = "\n\n---\n\n";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} for {url} (client error, not retried)")]
    NonRetryable { status: StatusCode, url: String },

    #[error("HTTP {status} for {url}")]
    RetryableStatus { status: StatusCode, url: String },

    #[error("request to {url} failed: {source}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid URL {url}: {source}")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("No content fetched for {0}")]
    NoContentFetched(String),
}

/// Result of a single fetch attempt. The retry loop branches on this
/// instead of catching errors mid-flight.
#[derive(Debug)]
pub(crate) enum AttemptOutcome {
    Ok(String),
    Retryable(FetchError),
    Terminal(FetchError),
}

/// Drive `attempt_fn` until it succeeds, fails terminally, or exhausts
/// `max_attempts`. Backoff doubles per attempt: unit, 2x, 4x, ...
pub(crate) async fn retry_with_backoff<F, Fut>(
    max_attempts: u32,
    backoff_unit: Duration,
    mut attempt_fn: F,
) -> Result<String, FetchError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = AttemptOutcome>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match attempt_fn(attempt).await {
            AttemptOutcome::Ok(text) => return Ok(text),
            AttemptOutcome::Terminal(err) => return Err(err),
            AttemptOutcome::Retryable(err) => {
                attempt += 1;
                if attempt >= max_attempts {
                    return Err(err);
                }
                let delay = backoff_unit * 2u32.pow(attempt - 1);
                tracing::warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retryable fetch failure, backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

async fn fetch_once(client: Client, url: Url, timeout: Duration) -> AttemptOutcome {
    let response = match client.get(url.clone()).timeout(timeout).send().await {
        Ok(response) => response,
        Err(source) => {
            return AttemptOutcome::Retryable(FetchError::Connection {
                url: url.to_string(),
                source,
            });
        }
    };

    let status = response.status();
    let client_is_wrong = status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || status == StatusCode::NOT_FOUND;
    if client_is_wrong {
        return AttemptOutcome::Terminal(FetchError::NonRetryable {
            status,
            url: url.to_string(),
        });
    }
    if !status.is_success() {
        return AttemptOutcome::Retryable(FetchError::RetryableStatus {
            status,
            url: url.to_string(),
        });
    }

    match response.text().await {
        Ok(text) => AttemptOutcome::Ok(text),
        Err(source) => AttemptOutcome::Retryable(FetchError::Connection {
            url: url.to_string(),
            source,
        }),
    }
}

/// HTTP client for documentation sources.
pub struct DocsClient {
    client: Client,
    max_attempts: u32,
    backoff_unit: Duration,
    request_timeout: Duration,
}

impl Default for DocsClient {
    fn default() -> Self {
        Self::new()
    }
}

impl DocsClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_unit: DEFAULT_BACKOFF_UNIT,
            request_timeout: REQUEST_TIMEOUT,
        }
    }

    /// Override the backoff unit, mainly to keep tests fast.
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    /// Fetch one URL with bounded retry. HTTP 401/403/404 fail immediately;
    /// other errors are retried with exponential backoff until
    /// `max_attempts` is reached.
    pub async fn fetch_with_retry(&self, raw_url: &str) -> Result<String, FetchError> {
        let url = Url::parse(raw_url).map_err(|source| FetchError::Url {
            url: raw_url.to_string(),
            source,
        })?;
        tracing::debug!(%url, "fetching");

        let client = self.client.clone();
        let timeout = self.request_timeout;
        retry_with_backoff(self.max_attempts, self.backoff_unit, move |_| {
            fetch_once(client.clone(), url.clone(), timeout)
        })
        .await
    }

    /// Fetch and normalize every URL of one source. URLs are fetched
    /// concurrently but their normalized outputs are joined in declared
    /// order, so completion order is never observable in the content.
    pub async fn aggregate(&self, spec: &SourceSpec) -> Result<Document, SourceError> {
        tracing::info!(
            tool = %spec.tool_name,
            urls = spec.urls.len(),
            "fetching documentation source"
        );

        let results = join_all(spec.urls.iter().map(|url| self.fetch_with_retry(url))).await;

        let opts = NormalizeOptions::from_spec(spec);
        let mut parts = Vec::new();
        for (url, result) in spec.urls.iter().zip(results) {
            match result {
                Ok(raw) => {
                    parts.push(normalize::normalize(
                        spec.content_type,
                        &raw,
                        Some(url.as_str()),
                        opts,
                    ));
                }
                Err(err) => {
                    tracing::warn!(
                        tool = %spec.tool_name,
                        %url,
                        error = %err,
                        "dropping URL after terminal fetch failure"
                    );
                }
            }
        }

        if parts.is_empty() {
            return Err(SourceError::NoContentFetched(spec.tool_name.clone()));
        }

        let content = parts.join(PART_SEPARATOR);
        Ok(Document {
            tool_name: spec.tool_name.clone(),
            display_name: spec.display_name().to_string(),
            description: spec.description.clone(),
            urls: spec.urls.clone(),
            size_bytes: content.len(),
            content,
            fetched_at: Utc::now(),
            error: None,
        })
    }

    /// Run one full refresh cycle over all configured sources. Source
    /// failures are isolated: each failed source becomes a placeholder
    /// document and every other source proceeds normally. The returned
    /// catalog is complete and must be installed via an atomic publish.
    pub async fn refresh(&self, specs: &[SourceSpec]) -> Catalog {
        tracing::info!(sources = specs.len(), "starting documentation refresh cycle");

        let results = join_all(specs.iter().map(|spec| self.aggregate(spec))).await;

        let mut catalog = Catalog::new();
        for (spec, result) in specs.iter().zip(results) {
            match result {
                Ok(doc) => {
                    tracing::info!(tool = %spec.tool_name, bytes = doc.size_bytes, "source cached");
                    catalog.insert(doc);
                }
                Err(err) => {
                    tracing::error!(
                        tool = %spec.tool_name,
                        error = %err,
                        "source failed, serving placeholder"
                    );
                    catalog.insert(Document::placeholder(spec, &err.to_string()));
                }
            }
        }

        tracing::info!(cached = catalog.len(), "documentation refresh cycle complete");
        catalog
    }
}
