use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    /// Carries a stable machine-readable code next to the status class.
    #[error("{message}")]
    Coded {
        kind: Box<AppError>,
        code: &'static str,
        message: String,
    },
}

impl AppError {
    pub fn with_code(self, code: &'static str) -> Self {
        let message = match &self {
            AppError::Coded { message, .. } => message.clone(),
            other => other.message().to_string(),
        };
        AppError::Coded { kind: Box::new(self), code, message }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::PolicyViolation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::ExternalService(_) => StatusCode::BAD_GATEWAY,
            AppError::Coded { kind, .. } => kind.status_code(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Auth(_) => "AUTHENTICATION",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Internal(_) => "INTERNAL",
            AppError::Database(_) => "DATABASE",
            AppError::ValidationError(_) => "VALIDATION",
            AppError::Conflict(_) => "CONFLICT",
            AppError::PolicyViolation(_) => "POLICY_VIOLATION",
            AppError::ExternalService(_) => "EXTERNAL_SERVICE",
            AppError::Coded { code, .. } => *code,
        }
    }

    fn message(&self) -> &str {
        match self {
            AppError::Auth(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::BadRequest(msg)
            | AppError::Internal(msg)
            | AppError::Database(msg)
            | AppError::ValidationError(msg)
            | AppError::Conflict(msg)
            | AppError::PolicyViolation(msg)
            | AppError::ExternalService(msg) => msg,
            AppError::Coded { message, .. } => message,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.message();

        if status.is_server_error() {
            tracing::error!("Error: {}: {}", status, message);
        } else {
            tracing::warn!("Error: {}: {}", status, message);
        }

        let body = Json(json!({
            "error": message,
            "code": self.code(),
        }));

        (status, body).into_response()
    }
}
