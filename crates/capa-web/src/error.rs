//! Gateway errors rendered as HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use capa_core::{ErrorCode, GatewayError};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub type Result<T> = std::result::Result<T, HttpError>;

/// Error body shared by every endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(rename = "errorCode")]
    pub error_code: String,
    pub message: String,
}

impl ErrorResponse {
    #[must_use]
    pub fn from_error(err: &GatewayError) -> Self {
        Self {
            error_code: err.code.as_str().to_string(),
            message: err.message.clone(),
        }
    }
}

/// A [`GatewayError`] on its way out of a handler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(transparent)]
pub struct HttpError(#[from] pub GatewayError);

impl HttpError {
    /// 400 for failures caused by the request, 500 for everything else.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        status_for(self.0.code)
    }
}

#[must_use]
pub const fn status_for(code: ErrorCode) -> StatusCode {
    if code.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse::from_error(&self.0);
        debug!(
            error_code = %body.error_code,
            message = %body.message,
            status = status.as_u16(),
            "request failed"
        );
        (status, Json(body)).into_response()
    }
}
