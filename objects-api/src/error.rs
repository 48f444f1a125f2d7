use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::{StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::upstream::UpstreamFailure;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Ways a route can fail towards the client.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    /// Forwarded to the client exactly as the objects API sent it.
    Upstream(UpstreamFailure),
    /// Carries only a short message; details stay in the audit record and logs.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(error) => (StatusCode::BAD_REQUEST, Json(ErrorResponse { error })).into_response(),
            ApiError::Internal(error) => {
                (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse { error })).into_response()
            }
            ApiError::Upstream(failure) => {
                let mut response = (failure.status, failure.body).into_response();
                if let Some(content_type) = failure.content_type {
                    response.headers_mut().insert(CONTENT_TYPE, content_type);
                }
                response
            }
        }
    }
}

// malformed or missing request bodies never reach the upstream
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
