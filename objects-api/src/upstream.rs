use axum::body::Bytes;
use axum::http::{HeaderValue, StatusCode, header::CONTENT_TYPE};
use reqwest::{RequestBuilder, Url};
use serde_json::Value;

use crate::config::ConfigError;

/// Result of a call that reached the objects API and got an answer back.
#[derive(Debug)]
pub enum UpstreamOutcome {
    Success(Value),
    Failure(UpstreamFailure),
}

/// A non-2xx answer, kept byte for byte so it can be handed to the client.
#[derive(Debug, Clone)]
pub struct UpstreamFailure {
    pub status: StatusCode,
    pub body: Bytes,
    pub content_type: Option<HeaderValue>,
    /// Human readable reason, for the audit record.
    pub message: String,
}

/// The call produced no usable answer.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("request to objects API failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("objects API returned a body that is not JSON: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Thin client for the external objects REST resource.
///
/// Every method makes exactly one attempt; retrying is left to the caller.
#[derive(Debug, Clone)]
pub struct ObjectsClient {
    client: reqwest::Client,
    base_url: Url,
}

impl ObjectsClient {
    pub fn new(client: reqwest::Client, base_url: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason,
        };

        let base_url = Url::parse(base_url).map_err(|err| invalid(err.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(invalid("URL cannot carry a path".to_string()));
        }

        Ok(ObjectsClient { client, base_url })
    }

    pub async fn list(&self) -> Result<UpstreamOutcome, UpstreamError> {
        self.execute(self.client.get(self.object_url(None))).await
    }

    pub async fn get(&self, id: &str) -> Result<UpstreamOutcome, UpstreamError> {
        self.execute(self.client.get(self.object_url(Some(id)))).await
    }

    pub async fn create(&self, body: &Value) -> Result<UpstreamOutcome, UpstreamError> {
        self.execute(self.client.post(self.object_url(None)).json(body)).await
    }

    pub async fn update(&self, id: &str, body: &Value) -> Result<UpstreamOutcome, UpstreamError> {
        self.execute(self.client.put(self.object_url(Some(id))).json(body)).await
    }

    pub async fn delete(&self, id: &str) -> Result<UpstreamOutcome, UpstreamError> {
        self.execute(self.client.delete(self.object_url(Some(id)))).await
    }

    fn object_url(&self, id: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        if let Some(id) = id {
            // checked in new(), the base always has path segments
            if let Ok(mut segments) = url.path_segments_mut() {
                segments.pop_if_empty().push(id);
            }
        }
        url
    }

    async fn execute(&self, request: RequestBuilder) -> Result<UpstreamOutcome, UpstreamError> {
        let response = request.send().await?;

        let status = response.status();
        let content_type = response.headers().get(CONTENT_TYPE).cloned();
        let body = response.bytes().await?;

        if status.is_success() {
            let value = serde_json::from_slice(&body).map_err(UpstreamError::Decode)?;
            return Ok(UpstreamOutcome::Success(value));
        }

        let message = failure_message(status, &body);
        Ok(UpstreamOutcome::Failure(UpstreamFailure {
            status,
            body,
            content_type,
            message,
        }))
    }
}

// prefer the upstream's own error text over our interpretation of the status
fn failure_message(status: StatusCode, body: &[u8]) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(body) {
        for key in ["error", "message"] {
            if let Some(message) = map.get(key).and_then(Value::as_str) {
                return message.to_string();
            }
        }
    }

    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if !text.is_empty() {
        return text.to_string();
    }

    status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| status.to_string())
}
