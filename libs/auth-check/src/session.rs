use async_trait::async_trait;
use axum::http::{HeaderMap, StatusCode, header};
use axum_extra::extract::CookieJar;
use serde::Deserialize;

use crate::context::get_request_metadata;

/// Token bundle handed out by the identity platform for a signed-in session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTokens {
    pub access_token: Option<String>,
    pub id_token: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("identity service answered with unexpected status {0}")]
    UnexpectedStatus(u16),
}

/// The identity platform's "fetch current session" operation.
///
/// `Ok(None)` means the request carries no signed-in session.
#[async_trait]
pub trait SessionFetcher: Send + Sync {
    async fn fetch_session(&self, headers: &HeaderMap) -> Result<Option<SessionTokens>, SessionError>;
}

/// Asks the identity service about the session cookies of a request.
#[derive(Debug, Clone)]
pub struct HttpSessionFetcher {
    client: reqwest::Client,
    identity_service_url: String,
}

impl HttpSessionFetcher {
    pub fn new(client: reqwest::Client, identity_service_url: impl Into<String>) -> Self {
        let identity_service_url = identity_service_url.into();
        HttpSessionFetcher {
            client,
            identity_service_url: identity_service_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl SessionFetcher for HttpSessionFetcher {
    async fn fetch_session(&self, headers: &HeaderMap) -> Result<Option<SessionTokens>, SessionError> {
        let Some(cookie_header) = headers.get(header::COOKIE) else {
            tracing::debug!("No cookie header, skipping session lookup");
            return Ok(None);
        };

        if CookieJar::from_headers(headers).iter().next().is_none() {
            tracing::debug!("Cookie header holds no cookies, skipping session lookup");
            return Ok(None);
        }

        // the identity service sees our address, not the client's, so pass it along
        let client_ip = get_request_metadata(headers).ip_address;

        let response = self
            .client
            .get(format!("{}/auth/session", self.identity_service_url))
            .header(header::COOKIE, cookie_header.clone())
            .header("X-Client-IP", client_ip)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            tracing::debug!("Identity service reports no session ({})", status);
            return Ok(None);
        }

        if !status.is_success() {
            return Err(SessionError::UnexpectedStatus(status.as_u16()));
        }

        Ok(Some(response.json::<SessionTokens>().await?))
    }
}

/// Used when no identity service is configured: every request is anonymous.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSessionFetcher;

#[async_trait]
impl SessionFetcher for NoSessionFetcher {
    async fn fetch_session(&self, _headers: &HeaderMap) -> Result<Option<SessionTokens>, SessionError> {
        Ok(None)
    }
}
