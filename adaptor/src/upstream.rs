//! Client for the upstream time-series API.

use crate::error::{check, CallError};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;

/// One upstream data point.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Reading {
    pub timestamp: String,
    pub value: f64,
    #[serde(default)]
    pub predicted: bool,
}

#[derive(Deserialize)]
struct TimeseriesResponse {
    #[serde(default)]
    data: Vec<Reading>,
}

#[derive(Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl UpstreamClient {
    pub fn new(http: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        UpstreamClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Readings of `measurement` on device `tag` within `[from, to]`.
    pub async fn fetch(
        &self,
        tag: &str,
        measurement: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Reading>, CallError> {
        let from = from.to_rfc3339_opts(SecondsFormat::Secs, true);
        let to = to.to_rfc3339_opts(SecondsFormat::Secs, true);
        let resp = self
            .http
            .get(format!("{}/timeseries", self.base_url))
            .header("X-Api-Key", &self.api_key)
            .query(&[
                ("device", tag),
                ("measurement", measurement),
                ("from", from.as_str()),
                ("to", to.as_str()),
            ])
            .send()
            .await
            .map_err(CallError::from_reqwest)?;
        let body: TimeseriesResponse = check(resp).await?.json().await.map_err(CallError::from_reqwest)?;
        tracing::debug!(tag, measurement, readings = body.data.len(), "fetched upstream readings");
        Ok(body.data)
    }
}
