use crate::error::{AuthError, ValidationError, VaultError};
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

/// Everything a handler can fail with, already decided as to what the
/// client is allowed to see.
#[derive(Debug)]
pub enum ApiError {
    Vault(VaultError),
    Multipart(MultipartError),
    /// Authorized job, but the file is not one of its outputs.
    NotFound,
}

impl From<VaultError> for ApiError {
    fn from(e: VaultError) -> Self {
        ApiError::Vault(e)
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::Vault(e.into())
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        ApiError::Vault(e.into())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        ApiError::Vault(e.into())
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        ApiError::Multipart(e)
    }
}

impl ApiError {
    fn parts(&self) -> (StatusCode, String, &'static str) {
        match self {
            ApiError::Vault(VaultError::Validation(e)) => {
                let status = if e.is_payload_limit() {
                    StatusCode::PAYLOAD_TOO_LARGE
                } else {
                    StatusCode::BAD_REQUEST
                };
                (status, e.to_string(), "invalid_request")
            }
            // Both variants render the same; which one it was stays in the logs.
            ApiError::Vault(VaultError::Auth(e)) => (
                StatusCode::FORBIDDEN,
                e.public_message().to_string(),
                "unauthorized",
            ),
            ApiError::Vault(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                "internal",
            ),
            ApiError::Multipart(e) => (e.status(), e.body_text(), "invalid_request"),
            ApiError::NotFound => (
                StatusCode::NOT_FOUND,
                "File not found".to_string(),
                "not_found",
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, code) = self.parts();

        match &self {
            ApiError::Vault(VaultError::Auth(e)) => {
                tracing::debug!(reason = %e, "Rejected job access")
            }
            ApiError::Vault(e) if status.is_server_error() => {
                tracing::error!(error = %e, "Request failed")
            }
            ApiError::Multipart(e) => tracing::debug!(error = %e, "Malformed multipart body"),
            _ => {}
        }

        (
            status,
            Json(ErrorResponse {
                error: message,
                code,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    #[test]
    fn test_auth_variants_are_indistinguishable() {
        let not_found = ApiError::from(AuthError::NotFound).parts();
        let invalid = ApiError::from(AuthError::InvalidToken).parts();
        assert_eq!(not_found, invalid);
        assert_eq!(not_found.0, StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_validation_statuses() {
        assert_eq!(
            ApiError::from(ValidationError::EmptyBatch).parts().0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(ValidationError::TooManyFiles(30, 20)).parts().0,
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }

    #[test]
    fn test_internal_errors_hide_details() {
        let err = ApiError::from(VaultError::Store(StoreError::UnknownJob(
            "secret-path".to_string(),
        )));
        let (status, message, _) = err.parts();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!message.contains("secret-path"));
    }
}
