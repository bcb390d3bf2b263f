//! Failures of a single HTTP call, classified for retrying.

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CallError {
    #[error("request failed: {message}")]
    Transport { message: String, transient: bool },
    #[error("HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("invalid response: {0}")]
    Decode(String),
}

impl CallError {
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_decode() {
            return CallError::Decode(e.to_string());
        }
        CallError::Transport {
            transient: e.is_connect() || e.is_timeout(),
            message: e.to_string(),
        }
    }

    /// Connect/timeout errors, 429 and 5xx are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            CallError::Transport { transient, .. } => *transient,
            CallError::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            CallError::Decode(_) => false,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            CallError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Pass successful responses through; turn any other status into `CallError::Status`.
pub async fn check(resp: reqwest::Response) -> Result<reqwest::Response, CallError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(CallError::Status { status, body })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> CallError {
        CallError::Status {
            status: StatusCode::from_u16(code).unwrap(),
            body: String::new(),
        }
    }

    #[test]
    fn transient_statuses() {
        assert!(status(429).is_transient());
        assert!(status(503).is_transient());
        assert!(!status(409).is_transient());
        assert!(!status(422).is_transient());
        assert!(!CallError::Decode("x".into()).is_transient());
    }
}
