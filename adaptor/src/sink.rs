//! Client for the farm-api endpoints the feeder needs.

use crate::error::{check, CallError};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Scopes the feeder asks for when logging in.
pub const FEEDER_SCOPES: &str = "read_devices write_samples";
const PAGE_SIZE: u32 = 1000;

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct DeviceRef {
    pub id: String,
    pub tag: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct SensorRef {
    pub id: String,
    pub measurement: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct ListMeta {
    #[serde(default)]
    next_offset: Option<u32>,
}

/// Outcome of forwarding one sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Forwarded {
    Created,
    /// The API already holds this sample.
    Duplicate,
}

#[derive(Default)]
struct Session {
    credentials: Option<(String, String)>,
    token: Option<String>,
}

#[derive(Clone)]
pub struct FarmClient {
    http: reqwest::Client,
    base_url: String,
    session: Arc<RwLock<Session>>,
}

impl FarmClient {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        FarmClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            session: Arc::new(RwLock::new(Session::default())),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Password-grant login; later calls carry the token and log in again when it is rejected.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), CallError> {
        let resp = self
            .http
            .post(self.url("/users/token"))
            .form(&[
                ("grant_type", "password"),
                ("username", username),
                ("password", password),
                ("scope", FEEDER_SCOPES),
            ])
            .send()
            .await
            .map_err(CallError::from_reqwest)?;
        let body: TokenResponse = check(resp).await?.json().await.map_err(CallError::from_reqwest)?;
        let mut session = self.session.write().await;
        session.credentials = Some((username.to_string(), password.to_string()));
        session.token = Some(body.access_token);
        tracing::info!(username, "logged in to farm-api");
        Ok(())
    }

    async fn send_as(&self, req: reqwest::RequestBuilder, token: Option<&str>) -> Result<reqwest::Response, CallError> {
        let req = match token {
            Some(t) => req.bearer_auth(t),
            None => req,
        };
        req.send().await.map_err(CallError::from_reqwest)
    }

    /// Send with the current token. On a 401 the client logs in once more and repeats the request.
    async fn send(&self, build: impl Fn() -> reqwest::RequestBuilder) -> Result<reqwest::Response, CallError> {
        let token = self.session.read().await.token.clone();
        let resp = self.send_as(build(), token.as_deref()).await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return Ok(resp);
        }
        let credentials = self.session.read().await.credentials.clone();
        let Some((username, password)) = credentials else {
            return Ok(resp);
        };
        // another task may have refreshed it already
        if self.session.read().await.token == token {
            tracing::info!(username = %username, "access token rejected, logging in again");
            self.login(&username, &password).await?;
        }
        let token = self.session.read().await.token.clone();
        self.send_as(build(), token.as_deref()).await
    }

    /// Every item of a paged list endpoint, following `meta.next_offset`.
    async fn list_all<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        key: &str,
        filter: (&str, &str),
    ) -> Result<Vec<T>, CallError> {
        let mut out = Vec::new();
        let mut offset = 0u32;
        loop {
            let resp = self
                .send(|| {
                    self.http
                        .get(self.url(path))
                        .query(&[filter])
                        .query(&[("limit", PAGE_SIZE), ("offset", offset)])
                })
                .await?;
            let mut body: Value = check(resp).await?.json().await.map_err(CallError::from_reqwest)?;
            let items: Vec<T> = serde_json::from_value(body.get_mut(key).map(Value::take).unwrap_or_default())
                .map_err(|e| CallError::Decode(format!("{}: {}", path, e)))?;
            let meta: ListMeta = serde_json::from_value(body.get_mut("meta").map(Value::take).unwrap_or_default())
                .map_err(|e| CallError::Decode(format!("{} meta: {}", path, e)))?;
            out.extend(items);
            match meta.next_offset {
                Some(next) => offset = next,
                None => return Ok(out),
            }
        }
    }

    pub async fn devices(&self, vendor: &str) -> Result<Vec<DeviceRef>, CallError> {
        self.list_all("/devices", "devices", ("vendor", vendor)).await
    }

    pub async fn sensors(&self, device_id: &str) -> Result<Vec<SensorRef>, CallError> {
        self.list_all("/sensors", "sensors", ("device", device_id)).await
    }

    /// POST one sample. A 409 means it was ingested before.
    pub async fn post_sample(&self, sample: &Value) -> Result<Forwarded, CallError> {
        let resp = self.send(|| self.http.post(self.url("/samples")).json(sample)).await?;
        if resp.status() == StatusCode::CONFLICT {
            return Ok(Forwarded::Duplicate);
        }
        check(resp).await?;
        Ok(Forwarded::Created)
    }
}
