//! Primary catalog client
//!
//! The catalog exposes a single query endpoint, `POST {base}/api/queries`,
//! answering `{"status": "success" | "error", "message": ..., "data": ...}`.

use crate::config::CatalogConfig;
use crate::error::{CatalogError, Result};
use crate::query::{count_query, find_query, CatalogQuery};
use async_trait::async_trait;
use frigate_core::{PageRequest, QueryWindow};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt::Debug;
use tracing::{debug, warn};

/// The two request shapes the pipeline issues against the catalog.
#[async_trait]
pub trait CatalogClient: Debug + Send + Sync {
    /// Exact number of records matching the window filter.
    async fn count_documents(&self, window: &QueryWindow) -> Result<u64>;

    /// Raw nested documents for one page.
    async fn find(&self, request: &PageRequest) -> Result<Vec<Map<String, Value>>>;
}

/// Response envelope of the query endpoint.
#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    message: Option<Value>,
    #[serde(default)]
    data: Option<Value>,
}

/// HTTP-based catalog client
#[derive(Debug, Clone)]
pub struct HttpCatalogClient {
    config: CatalogConfig,
    http: reqwest::Client,
}

impl HttpCatalogClient {
    pub fn new(config: CatalogConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| CatalogError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_http(config, http))
    }

    /// Build with a caller-provided `reqwest::Client` (shared connection pool).
    pub fn with_http(mut config: CatalogConfig, http: reqwest::Client) -> Self {
        config.base_url = config.base_url.trim_end_matches('/').to_string();
        Self { config, http }
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    fn queries_url(&self) -> String {
        format!("{}/api/queries", self.config.base_url)
    }

    fn add_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(ref token) = self.config.token {
            req.bearer_auth(token)
        } else {
            req
        }
    }

    /// Run a query, retrying transient failures per the configured policy.
    /// Returns the `data` member of a successful response.
    async fn run_query(&self, body: &CatalogQuery<'_>) -> Result<Option<Value>> {
        let retry = self.config.retry;
        let mut failures = 0u32;
        loop {
            match self.run_query_once(body).await {
                Ok(data) => return Ok(data),
                Err(e) if e.is_transient() && retry.should_retry(failures + 1) => {
                    failures += 1;
                    let delay = retry.delay_for(failures);
                    warn!(
                        error = %e,
                        attempt = failures,
                        max_retries = retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "catalog query failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn run_query_once(&self, body: &CatalogQuery<'_>) -> Result<Option<Value>> {
        let url = self.queries_url();
        debug!(url = %url, query_type = ?body.query_type, "catalog query");

        let resp = self
            .add_auth(self.http.post(&url))
            .json(body)
            .send()
            .await
            .map_err(|e| CatalogError::Connection(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(CatalogError::query(
                Some(status.as_u16()),
                &format!("status {status} from {url}: {text}"),
            ));
        }

        let envelope: QueryResponse = resp
            .json()
            .await
            .map_err(|e| CatalogError::Schema(format!("invalid response body: {e}")))?;

        if envelope.status != "success" {
            let message = match envelope.message {
                Some(Value::String(s)) => s,
                Some(other) => other.to_string(),
                None => format!("status '{}' without message", envelope.status),
            };
            return Err(CatalogError::query(None, &message));
        }
        Ok(envelope.data)
    }
}

#[async_trait]
impl CatalogClient for HttpCatalogClient {
    async fn count_documents(&self, window: &QueryWindow) -> Result<u64> {
        let body = count_query(&self.config.catalog, window);
        match self.run_query(&body).await? {
            Some(data) => data.as_u64().ok_or(CatalogError::NoCountReturned),
            None => Err(CatalogError::NoCountReturned),
        }
    }

    async fn find(&self, request: &PageRequest) -> Result<Vec<Map<String, Value>>> {
        let body = find_query(&self.config.catalog, request);
        let docs = match self.run_query(&body).await? {
            Some(Value::Array(docs)) => docs,
            None | Some(Value::Null) => Vec::new(),
            Some(other) => {
                return Err(CatalogError::Schema(format!(
                    "page {} data is not an array: {}",
                    request.index,
                    type_name(&other)
                )))
            }
        };

        docs.into_iter()
            .map(|doc| match doc {
                Value::Object(map) => Ok(map),
                other => Err(CatalogError::Schema(format!(
                    "page {} contains a non-object document: {}",
                    request.index,
                    type_name(&other)
                ))),
            })
            .collect()
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
