//! HTTP backfill source.
//!
//! Fetches `GET {base}/api/anomalies/timerange?start=..&end=..` with both
//! bounds in RFC 3339. The body is expected to be a JSON array of raw
//! records; a bare object is treated as a single record and `null` as an
//! empty batch. Records are passed to the merger undecoded.

use std::time::Duration;

use airwatch_core::{BackfillSource, SourceError};
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Url;
use serde_json::Value;
use tracing::debug;

use crate::error::FeedError;

/// Path of the time-range endpoint, relative to the base URL.
pub const TIMERANGE_PATH: &str = "api/anomalies/timerange";

/// Backfill source over the historical HTTP API.
#[derive(Debug, Clone)]
pub struct HttpBackfill {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpBackfill {
    /// Build a source for the API rooted at `base_url`, with a per-request
    /// `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FeedError> {
        let endpoint = timerange_endpoint(base_url)?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FeedError::Client(e.to_string()))?;
        Ok(Self { client, endpoint })
    }

    /// The full time-range endpoint, without query parameters.
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// The request URL for one window.
    pub fn request_url(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("start", &start.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            .append_pair("end", &end.to_rfc3339_opts(SecondsFormat::AutoSi, true));
        url
    }
}

impl BackfillSource for HttpBackfill {
    async fn fetch(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Value>, SourceError> {
        let url = self.request_url(start, end);
        let endpoint = self.endpoint.to_string();

        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| SourceError::Connect {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                endpoint,
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;
        let records = records_from_body(&body)?;
        debug!(%start, %end, records = records.len(), "backfill response received");
        Ok(records)
    }
}

/// Resolve the time-range endpoint under `base_url`.
fn timerange_endpoint(base_url: &str) -> Result<Url, FeedError> {
    let invalid = |reason: String| FeedError::InvalidUrl {
        url: base_url.to_owned(),
        reason,
    };
    let mut base = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
    if !matches!(base.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {:?}", base.scheme())));
    }
    // A base without a trailing slash would lose its last segment on join.
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(TIMERANGE_PATH).map_err(|e| invalid(e.to_string()))
}

/// Split a response body into raw records.
fn records_from_body(body: &[u8]) -> Result<Vec<Value>, SourceError> {
    let value: Value = serde_json::from_slice(body).map_err(|e| SourceError::Decode(e.to_string()))?;
    match value {
        Value::Array(records) => Ok(records),
        Value::Null => Ok(Vec::new()),
        record @ Value::Object(_) => Ok(vec![record]),
        other => Err(SourceError::Decode(format!(
            "expected an array of records, found {}",
            kind(&other)
        ))),
    }
}

const fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
