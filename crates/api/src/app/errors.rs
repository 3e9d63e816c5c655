use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use thiserror::Error;

use gatehouse_auth::{AuthzError, PasswordError, TokenError};
use gatehouse_core::DomainError;
use gatehouse_infra::StoreError;

/// Every failure a handler can surface, mapped to one stable status + code.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Unparseable body, query string or path id.
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Transaction(String),

    #[error("{0}")]
    Timeout(String),

    /// Logged with its cause; clients only see a generic message.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) | ApiError::Transaction(_) => StatusCode::CONFLICT,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Validation(_) => "validation_error",
            ApiError::Unauthenticated(_) => "unauthenticated",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::Transaction(_) => "transaction_error",
            ApiError::Timeout(_) => "timeout",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let code = self.code();
        match self {
            ApiError::Internal(cause) => {
                tracing::error!(%cause, "internal error");
                json_error(status, code, "internal server error")
            }
            ApiError::Timeout(cause) => {
                tracing::warn!(%cause, "store call timed out");
                json_error(status, code, "the request timed out")
            }
            ApiError::Transaction(cause) => {
                tracing::warn!(%cause, "batch write rolled back");
                json_error(status, code, "no changes were applied: the batch was rolled back")
            }
            other => json_error(status, code, other.to_string()),
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

impl From<DomainError> for ApiError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(_) => ApiError::Validation(value.to_string()),
            DomainError::InvalidId(_) => ApiError::BadRequest(value.to_string()),
            DomainError::NotFound(_) => ApiError::NotFound(value.to_string()),
            DomainError::Conflict(_) => ApiError::Conflict(value.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Validation(_) => ApiError::Validation(value.to_string()),
            StoreError::NotFound(_) => ApiError::NotFound(value.to_string()),
            StoreError::Conflict(_) => ApiError::Conflict(value.to_string()),
            StoreError::Transaction(_) => ApiError::Transaction(value.to_string()),
            StoreError::Timeout(_) => ApiError::Timeout(value.to_string()),
            StoreError::Backend(_) => ApiError::Internal(value.to_string()),
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(value: TokenError) -> Self {
        if value.is_authentication_failure() {
            ApiError::Unauthenticated(value.to_string())
        } else {
            ApiError::Internal(value.to_string())
        }
    }
}

impl From<AuthzError> for ApiError {
    fn from(value: AuthzError) -> Self {
        ApiError::Forbidden(value.to_string())
    }
}

impl From<PasswordError> for ApiError {
    fn from(value: PasswordError) -> Self {
        ApiError::Internal(value.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(value: JsonRejection) -> Self {
        ApiError::BadRequest(value.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(value: QueryRejection) -> Self {
        ApiError::BadRequest(value.body_text())
    }
}
