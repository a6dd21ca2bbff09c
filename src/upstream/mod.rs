//! Price history sources: the remote chart API, or a JSON file on disk.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use url::Url;

use crate::config::Config;
use crate::logging::log_upstream;

pub mod retry;

use retry::{is_retryable_http_error, is_retryable_network_error, retry_async, RetryConfig};

/// Parameters sent when the caller leaves them out.
pub const DEFAULT_QUERY: [(&str, &str); 2] = [("timespan", "all"), ("format", "json")];

#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: Value,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Fetch a price payload. The query is forwarded as-is where the source
    /// understands it.
    async fn fetch(&self, query: &[(String, String)]) -> Result<UpstreamResponse>;

    fn describe(&self) -> String;
}

/// A retryable status, carried through `retry_async` so the final response
/// can still be relayed once retries run out.
#[derive(Debug, Error)]
#[error("upstream returned retryable status {}", .0.status)]
struct RetryableStatus(UpstreamResponse);

pub struct ChartApiClient {
    client: Client,
    base: Url,
    retry: RetryConfig,
}

impl ChartApiClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.upstream_timeout_secs))
            .user_agent(concat!("rainbowchart/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let base = Url::parse(&cfg.upstream_url)
            .with_context(|| format!("invalid UPSTREAM_URL {:?}", cfg.upstream_url))?;
        Ok(Self {
            client,
            base,
            retry: RetryConfig::with_retries(cfg.upstream_retries),
        })
    }

    /// Base URL plus the forwarded query, with defaults for missing keys.
    pub fn build_url(&self, query: &[(String, String)]) -> Url {
        let mut url = self.base.clone();
        {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in query {
                pairs.append_pair(k, v);
            }
            for (k, v) in DEFAULT_QUERY {
                if !query.iter().any(|(qk, _)| qk == k) {
                    pairs.append_pair(k, v);
                }
            }
        }
        url
    }

    async fn attempt(&self, url: &Url, attempt: u32) -> Result<UpstreamResponse> {
        let started = Instant::now();
        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .context("upstream request failed")?;
        let status = resp.status().as_u16();
        let text = resp.text().await.context("reading upstream body")?;
        log_upstream(
            url.as_str(),
            status,
            started.elapsed().as_secs_f64() * 1000.0,
            attempt,
        );

        let body = serde_json::from_str::<Value>(&text).unwrap_or_else(|_| {
            json!({
                "error": "upstream returned a non-JSON body",
                "status": status,
            })
        });
        let response = UpstreamResponse { status, body };
        if is_retryable_http_error(status) {
            return Err(RetryableStatus(response).into());
        }
        Ok(response)
    }
}

/// Retryable statuses, plus transport errors that never reached a response.
fn is_retryable(err: &anyhow::Error) -> bool {
    err.is::<RetryableStatus>()
        || err
            .downcast_ref::<reqwest::Error>()
            .map(|e| !e.is_body() && is_retryable_network_error(e))
            .unwrap_or(false)
}

#[async_trait]
impl PriceSource for ChartApiClient {
    async fn fetch(&self, query: &[(String, String)]) -> Result<UpstreamResponse> {
        let url = self.build_url(query);
        let attempts = AtomicU32::new(0);
        let result = retry_async(&self.retry, "chart_api", is_retryable, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            let url = &url;
            async move { self.attempt(url, n).await }
        })
        .await;

        match result {
            Ok(resp) => Ok(resp),
            Err(e) => match e.downcast::<RetryableStatus>() {
                Ok(RetryableStatus(resp)) => Ok(resp),
                Err(e) => Err(e),
            },
        }
    }

    fn describe(&self) -> String {
        self.base.to_string()
    }
}

/// Serves a saved payload from disk, ignoring the query.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PriceSource for FileSource {
    async fn fetch(&self, _query: &[(String, String)]) -> Result<UpstreamResponse> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading {}", self.path.display()))?;
        let body = serde_json::from_str(&text)
            .with_context(|| format!("parsing {}", self.path.display()))?;
        Ok(UpstreamResponse { status: 200, body })
    }

    fn describe(&self) -> String {
        format!("file://{}", self.path.display())
    }
}

/// Source chosen by configuration: a local file when `PRICE_FILE` is set.
pub fn from_config(cfg: &Config) -> Result<Box<dyn PriceSource>> {
    match &cfg.price_file {
        Some(path) => Ok(Box::new(FileSource::new(path))),
        None => Ok(Box::new(ChartApiClient::new(cfg)?)),
    }
}
