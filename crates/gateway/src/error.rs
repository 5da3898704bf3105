//! HTTP error responses.

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use faceagent_core::StoreError;
use serde::Serialize;
use tracing::error;

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

/// Failures a request can end with before the event stream starts.
#[derive(Debug)]
pub enum ApiError {
    /// 401, with `WWW-Authenticate: Bearer`
    Unauthorized(&'static str),
    /// 404
    NotFound(String),
    /// 422
    Unprocessable(String),
    /// 500
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn detail(&self) -> String {
        match self {
            ApiError::Unauthorized(msg) => (*msg).to_string(),
            ApiError::NotFound(msg) | ApiError::Unprocessable(msg) => msg.clone(),
            ApiError::Internal(_) => "Internal server error".into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let ApiError::Internal(cause) = &self {
            error!(%cause, "Request failed");
        }
        let mut response = (status, Json(ErrorResponse { detail: self.detail() })).into_response();
        if matches!(self, ApiError::Unauthorized(_)) {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}
