//! Application-wide error types.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use blockfund_escrow::EscrowError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing caller identity: set the x-principal header")]
    MissingPrincipal,

    #[error(transparent)]
    Escrow(#[from] EscrowError),
}

pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

impl ServiceError {
    /// Stable identifier clients can match on.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Database(_) => "database_error",
            Self::Migrate(_) => "migration_error",
            Self::Config(_) => "config_error",
            Self::MissingPrincipal => "missing_principal",
            Self::Escrow(err) => err.code(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Database(_) | Self::Migrate(_) | Self::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::MissingPrincipal => StatusCode::UNAUTHORIZED,
            Self::Escrow(err) => escrow_status(err),
        }
    }
}

fn escrow_status(err: &EscrowError) -> StatusCode {
    if err.is_not_found() {
        return StatusCode::NOT_FOUND;
    }
    match err {
        EscrowError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        EscrowError::Unauthorized(_) => StatusCode::FORBIDDEN,
        EscrowError::NotEligible(_) => StatusCode::UNPROCESSABLE_ENTITY,
        EscrowError::LedgerImbalance { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        // lifecycle and state-machine preconditions
        _ => StatusCode::CONFLICT,
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.code(), "request failed");
        }
        let body = ErrorResponse {
            error: self.to_string(),
            code: self.code(),
        };
        (status, Json(body)).into_response()
    }
}
