//! HTTP error response mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use fieldhub_domain::error::{FieldHubError, ValidationError};

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Maps [`FieldHubError`] to an HTTP response with appropriate status code.
#[derive(Debug)]
pub struct ApiError(FieldHubError);

impl From<FieldHubError> for ApiError {
    fn from(err: FieldHubError) -> Self {
        Self(err)
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            FieldHubError::Validation(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            FieldHubError::NotFound(err) => (StatusCode::NOT_FOUND, err.to_string()),
            FieldHubError::Storage(_) | FieldHubError::Transport(_) => {
                tracing::error!(err = %self.0.describe(), "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}
