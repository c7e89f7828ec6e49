use service_core::error::AppError;
use thiserror::Error;

/// Failures raised by the tax rate ledger and its repositories.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// No current rate exists. The ledger is expected to always hold one.
    #[error("No current tax rate is configured")]
    NotFound,

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl LedgerError {
    /// Label used for the error counter.
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::NotFound => "not_found",
            LedgerError::Conflict(_) => "conflict",
            LedgerError::Forbidden(_) => "forbidden",
            LedgerError::Validation(_) => "validation",
            LedgerError::Storage(_) => "storage",
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            // A ledger without a current rate is a deployment fault, not a client error.
            LedgerError::NotFound => {
                AppError::InternalError(anyhow::anyhow!("No current tax rate is configured"))
            }
            LedgerError::Conflict(msg) => AppError::Conflict(anyhow::anyhow!(msg)),
            LedgerError::Forbidden(msg) => AppError::Forbidden(anyhow::anyhow!(msg)),
            LedgerError::Validation(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            LedgerError::Storage(e) => AppError::DatabaseError(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn business_rules_map_to_client_errors() {
        let conflict: AppError = LedgerError::Conflict("too early".into()).into();
        let forbidden: AppError = LedgerError::Forbidden("in effect".into()).into();
        let invalid: AppError = LedgerError::Validation("rate must be positive".into()).into();

        assert_eq!(conflict.status_code(), StatusCode::CONFLICT);
        assert_eq!(forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(invalid.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn missing_current_rate_and_storage_are_server_errors() {
        let missing: AppError = LedgerError::NotFound.into();
        let storage: AppError = LedgerError::Storage(anyhow::anyhow!("pool timed out")).into();

        assert_eq!(missing.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(storage.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
