use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::{CommerceError, ErrorKind};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
}

impl CommerceError {
    pub fn status_code(&self) -> StatusCode {
        match (self.kind(), self) {
            (_, CommerceError::Forbidden(_)) => StatusCode::FORBIDDEN,
            (ErrorKind::NotFound, _) => StatusCode::NOT_FOUND,
            (ErrorKind::InvalidInput, _) => StatusCode::BAD_REQUEST,
            (ErrorKind::InsufficientStock, _) | (ErrorKind::Conflict, _) => StatusCode::CONFLICT,
            (ErrorKind::Unauthorized, _) => StatusCode::UNAUTHORIZED,
            (ErrorKind::Internal, _) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self.kind() {
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::InsufficientStock => "insufficient_stock",
            ErrorKind::Unauthorized if matches!(self, CommerceError::Forbidden(_)) => "forbidden",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Internal => "internal",
        }
    }
}

impl IntoResponse for CommerceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(ErrorResponse { error: self.code(), message })).into_response()
    }
}
