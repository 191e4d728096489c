//! HTTP client for the hosted credential table.
//!
//! The table is exposed through a PostgREST-style endpoint at
//! `{base_url}/rest/v1/api_credentials`. Filters travel as query
//! parameters (`column=eq.value`, `column=gt.value`), and every request
//! authenticates with the service role key as both `apikey` and bearer
//! token.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, Response};
use serde_json::Value;
use tracing::{debug, warn};

use super::{
    Column, CredentialRow, CredentialTable, CredentialValue, Filter, Filters, RowPatch,
    StoreError, CONFLICT_KEY, TABLE_NAME,
};

// ============================================================================
// Constants
// ============================================================================

/// Path prefix of the REST interface under the project URL
const REST_PATH: &str = "rest/v1";

/// Columns projected by every select
const SELECT_COLUMNS: &str = "credential_type,credential_value";

/// Upsert merges into the existing row on conflict instead of failing
const PREFER_MERGE: &str = "resolution=merge-duplicates,return=minimal";

/// Writes without echoing rows back
const PREFER_MINIMAL: &str = "return=minimal";

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        StoreError::Network(e.to_string())
    }
}

/// Credential table reached over HTTP.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct RestTable {
    client: Client,
    table_url: String,
    service_key: String,
}

impl RestTable {
    /// Create a client for the project at `base_url`
    pub fn new(base_url: &str, service_key: &str, timeout: Duration) -> Result<Self, StoreError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            table_url: Self::table_url(base_url),
            service_key: service_key.to_string(),
        })
    }

    fn table_url(base_url: &str) -> String {
        format!("{}/{}/{}", base_url.trim_end_matches('/'), REST_PATH, TABLE_NAME)
    }

    /// Render filters as PostgREST query parameters
    fn filter_params(filters: &Filters) -> Vec<(String, String)> {
        filters
            .iter()
            .map(|filter| {
                let (op, value) = match filter {
                    Filter::Eq(_, value) => ("eq", value),
                    Filter::Gt(_, value) => ("gt", value),
                };
                (
                    filter.column().as_str().to_string(),
                    format!("{}.{}", op, Self::render_value(value)),
                )
            })
            .collect()
    }

    fn render_value(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            Value::Null => "null".to_string(),
            other => other.to_string(),
        }
    }

    fn conflict_target() -> String {
        CONFLICT_KEY
            .iter()
            .map(Column::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .header(header::ACCEPT, "application/json")
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry).
    async fn check_response_for_retry(response: Response) -> Result<Option<Response>, StoreError> {
        let status = response.status();
        if status.is_success() {
            Ok(Some(response))
        } else if status.as_u16() == 429 {
            Ok(None)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(StoreError::from_status(status.as_u16(), &body))
        }
    }

    /// Send a request, retrying with exponential backoff while rate limited
    async fn send(&self, build: impl Fn() -> RequestBuilder) -> Result<Response, StoreError> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = self.authorized(build()).send().await?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => return Ok(response),
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(StoreError::RateLimited);
                    }
                    warn!(table = TABLE_NAME, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2;
                }
            }
        }
    }
}

#[async_trait]
impl CredentialTable for RestTable {
    async fn select(&self, filters: &Filters) -> Result<Vec<CredentialValue>, StoreError> {
        let mut params = vec![("select".to_string(), SELECT_COLUMNS.to_string())];
        params.extend(Self::filter_params(filters));

        let response = self
            .send(|| self.client.get(&self.table_url).query(&params))
            .await?;

        let text = response.text().await?;
        let rows: Vec<CredentialValue> = serde_json::from_str(&text)
            .map_err(|e| StoreError::InvalidResponse(format!("Failed to parse rows: {}", e)))?;
        debug!(rows = rows.len(), "Credential rows selected");
        Ok(rows)
    }

    async fn upsert(&self, row: &CredentialRow) -> Result<(), StoreError> {
        let params = [("on_conflict", Self::conflict_target())];

        self.send(|| {
            self.client
                .post(&self.table_url)
                .query(&params)
                .header("Prefer", PREFER_MERGE)
                .json(row)
        })
        .await?;
        Ok(())
    }

    async fn update(&self, filters: &Filters, patch: &RowPatch) -> Result<(), StoreError> {
        let params = Self::filter_params(filters);

        self.send(|| {
            self.client
                .patch(&self.table_url)
                .query(&params)
                .header("Prefer", PREFER_MINIMAL)
                .json(patch)
        })
        .await?;
        Ok(())
    }
}
