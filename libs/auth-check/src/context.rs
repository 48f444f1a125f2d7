use axum::http::HeaderMap;

use audit::{RequestMetadata, UserContext};

use crate::claims::{TokenDecodeError, decode_id_token_claims, user_context_from_claims};
use crate::session::{SessionError, SessionFetcher};

/// Ip address recorded when no proxy header names the client.
pub const UNKNOWN_IP: &str = "unknown";

#[derive(Debug, thiserror::Error)]
enum ContextError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Token(#[from] TokenDecodeError),
}

/// Identity and client details resolved once per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub user: Option<UserContext>,
    pub metadata: RequestMetadata,
}

/// Resolves the signed-in user of a request.
///
/// Returns `None` for anonymous requests. Failures (identity service down,
/// malformed token) are logged and also yield `None`; they never fail the
/// request itself.
pub async fn get_user_context(fetcher: &dyn SessionFetcher, headers: &HeaderMap) -> Option<UserContext> {
    match resolve_user_context(fetcher, headers).await {
        Ok(user) => user,
        Err(err) => {
            tracing::warn!("Failed to get user context: {}", err);
            None
        }
    }
}

async fn resolve_user_context(
    fetcher: &dyn SessionFetcher,
    headers: &HeaderMap,
) -> Result<Option<UserContext>, ContextError> {
    let Some(tokens) = fetcher.fetch_session(headers).await? else {
        return Ok(None);
    };

    if tokens.access_token.as_deref().is_none_or(str::is_empty) {
        tracing::debug!("No access token found, user not authenticated");
        return Ok(None);
    }

    let Some(id_token) = tokens.id_token.filter(|token| !token.is_empty()) else {
        tracing::debug!("No ID token found");
        return Ok(None);
    };

    let claims = decode_id_token_claims(&id_token)?;
    let user = user_context_from_claims(&claims);
    tracing::debug!("User context extracted for {}", user.user_id);

    Ok(Some(user))
}

/// Reads user agent, client ip and caller supplied request id from the headers.
pub fn get_request_metadata(headers: &HeaderMap) -> RequestMetadata {
    let header_value = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };

    let ip_address = header_value("x-forwarded-for")
        .or_else(|| header_value("x-real-ip"))
        .unwrap_or_else(|| UNKNOWN_IP.to_string());

    RequestMetadata {
        user_agent: header_value("user-agent"),
        ip_address,
        request_id: header_value("x-request-id"),
    }
}
