use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use datepoll_core::FieldErrors;
use serde_json::json;
use thiserror::Error;

/// Challenge sent with 401 responses
pub const TOKEN_CHALLENGE: &str = r#"Token realm="Application""#;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("HTTP Token: Access denied.")]
    Unauthorized,

    #[error("{0}")]
    Validation(#[from] FieldErrors),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(field_errors(&err))
    }
}

/// Flatten `validator` output into the field error map
pub fn field_errors(err: &validator::ValidationErrors) -> FieldErrors {
    let mut errors = FieldErrors::new();
    for (field, failures) in err.field_errors() {
        for failure in failures {
            let message = failure
                .message
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| format!("is invalid ({})", failure.code));
            errors.add(field.to_string(), message);
        }
    }
    errors
}

/// Client-facing message of an error response.
///
/// Stored in the response extensions so browser requests can be answered
/// with an HTML page instead of the JSON body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMessage(pub String);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                "Database error".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
            AppError::Validation(errors) => {
                tracing::debug!(%errors, "Rejected invalid input");
                self.to_string()
            }
            AppError::NotFound(_) | AppError::Unauthorized | AppError::BadRequest(_) => {
                tracing::debug!(error = %self, "Client error");
                self.to_string()
            }
        };

        let body = match &self {
            AppError::Validation(errors) => json!({ "error": message, "errors": errors }),
            _ => json!({ "error": message }),
        };

        let mut response = if matches!(self, AppError::Unauthorized) {
            (
                status,
                [(header::WWW_AUTHENTICATE, TOKEN_CHALLENGE)],
                Json(body),
            )
                .into_response()
        } else {
            (status, Json(body)).into_response()
        };
        response.extensions_mut().insert(ErrorMessage(message));
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Sample {
        #[validate(length(max = 3, message = "is too long (maximum is 3 characters)"))]
        name: String,
        #[validate(length(min = 1))]
        tag: String,
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::Validation(FieldErrors::single("state", "is invalid")).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::Internal("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_validator_conversion() {
        let sample = Sample {
            name: "toolong".into(),
            tag: String::new(),
        };
        let errors = field_errors(&sample.validate().unwrap_err());
        assert_eq!(errors.get("name"), ["is too long (maximum is 3 characters)"]);
        assert_eq!(errors.get("tag"), ["is invalid (length)"]);
    }

    #[test]
    fn test_unauthorized_response_has_challenge() {
        let response = AppError::Unauthorized.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            TOKEN_CHALLENGE
        );
    }

    #[test]
    fn test_response_carries_message() {
        let response = AppError::NotFound("Appointment vote 1 not found".into()).into_response();
        assert_eq!(
            response.extensions().get::<ErrorMessage>(),
            Some(&ErrorMessage("Not found: Appointment vote 1 not found".into()))
        );

        let response = AppError::Internal("secret detail".into()).into_response();
        assert_eq!(
            response.extensions().get::<ErrorMessage>(),
            Some(&ErrorMessage("Internal server error".into()))
        );
    }
}
