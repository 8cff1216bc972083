use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::captures::CaptureError;
use crate::log::LogError;
use crate::nutrition::EstimationError;
use crate::store::StoreError;

/// Error returned by every handler.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    TooLarge(String),
    #[error(transparent)]
    Estimation(#[from] EstimationError),
    #[error("internal server error")]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: &'static str,
    pub retryable: bool,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Estimation(e) => match e {
                EstimationError::MissingCredentials => StatusCode::SERVICE_UNAVAILABLE,
                EstimationError::EmptyInput | EstimationError::InvalidImage(_) => StatusCode::BAD_REQUEST,
                EstimationError::Timeout
                | EstimationError::Transport(_)
                | EstimationError::Status { .. } => StatusCode::BAD_GATEWAY,
                EstimationError::Malformed(_) | EstimationError::NoMatch => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
            },
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::TooLarge(_) => "too_large",
            ApiError::Estimation(e) => e.kind(),
            ApiError::Internal(_) => "internal",
        }
    }

    pub fn retryable(&self) -> bool {
        match self {
            ApiError::Conflict(_) => true,
            ApiError::Estimation(e) => e.is_retryable(),
            _ => false,
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error: self.to_string(),
            kind: self.kind(),
            retryable: self.retryable(),
        }
    }
}

impl From<LogError> for ApiError {
    fn from(e: LogError) -> Self {
        match e {
            LogError::EmptyMeal | LogError::InvalidFood(_) | LogError::InvalidGoal(_) => {
                ApiError::Validation(e.to_string())
            }
            LogError::MealNotFound(_) | LogError::FoodNotFound { .. } => ApiError::NotFound(e.to_string()),
            LogError::Store(StoreError::Conflict { .. }) => {
                ApiError::Conflict("log was modified concurrently, try again".into())
            }
            LogError::Store(StoreError::Backend(e)) => ApiError::Internal(e),
        }
    }
}

impl From<CaptureError> for ApiError {
    fn from(e: CaptureError) -> Self {
        match e {
            CaptureError::TooLarge => ApiError::TooLarge(e.to_string()),
            CaptureError::Storage(e) => ApiError::Internal(e),
            _ => ApiError::Validation(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let ApiError::Internal(e) = &self {
            error!(error = ?e, "request failed");
        }
        (status, Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::nutrition::ParseError;

    #[test]
    fn estimation_errors_map_to_statuses() {
        let cases = [
            (EstimationError::MissingCredentials, StatusCode::SERVICE_UNAVAILABLE, false),
            (EstimationError::Timeout, StatusCode::BAD_GATEWAY, true),
            (
                EstimationError::Status {
                    status: 500,
                    message: "boom".into(),
                },
                StatusCode::BAD_GATEWAY,
                true,
            ),
            (
                EstimationError::Status {
                    status: 401,
                    message: "bad key".into(),
                },
                StatusCode::BAD_GATEWAY,
                false,
            ),
            (EstimationError::Malformed(ParseError::NoJson), StatusCode::UNPROCESSABLE_ENTITY, false),
            (EstimationError::NoMatch, StatusCode::UNPROCESSABLE_ENTITY, false),
            (EstimationError::EmptyInput, StatusCode::BAD_REQUEST, false),
        ];
        for (err, status, retryable) in cases {
            let api = ApiError::from(err);
            assert_eq!(api.status(), status, "{api}");
            assert_eq!(api.retryable(), retryable, "{api}");
        }
    }

    #[test]
    fn log_errors_map_to_statuses() {
        assert_eq!(ApiError::from(LogError::EmptyMeal).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::from(LogError::MealNotFound(Uuid::new_v4())).status(),
            StatusCode::NOT_FOUND
        );
        let conflict = ApiError::from(LogError::Store(StoreError::Conflict { expected: 1, found: 2 }));
        assert_eq!(conflict.status(), StatusCode::CONFLICT);
        assert!(conflict.retryable());
        let backend = ApiError::from(LogError::Store(StoreError::Backend(anyhow::anyhow!("db down"))));
        assert_eq!(backend.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(backend.body().error, "internal server error");
    }

    #[test]
    fn body_shape() {
        let body = serde_json::to_value(ApiError::from(EstimationError::Timeout).body()).unwrap();
        assert_eq!(body["kind"], "timeout");
        assert_eq!(body["retryable"], true);
        assert!(body["error"].as_str().unwrap().contains("timed out"));
    }
}
