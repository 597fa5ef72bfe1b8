//! API error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParam { name: &'static str, reason: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid health feed: {0}")]
    InvalidFeed(#[from] serde_json::Error),
}

impl ApiError {
    pub fn invalid(name: &'static str, reason: impl ToString) -> Self {
        Self::InvalidParam {
            name,
            reason: reason.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidParam { .. } | ApiError::InvalidFeed(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::debug!(status = status.as_u16(), error = %self, "Inspection request rejected");
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::invalid("ip", "bad").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::NotFound("cache".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::invalid("ip", "bad").to_string(),
            "invalid parameter 'ip': bad"
        );
    }
}
