use rust_decimal::Decimal;

use super::eligibility::DenialReason;
use super::repository::RepositoryError;

/// Coarse classification surfaced to callers; the HTTP layer maps it to a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    BadRequest,
    Forbidden,
    TooManyRequests,
    Internal,
}

/// Error raised by the marketplace services. All variants except `Storage` are expected,
/// recoverable outcomes that leave no partial state behind.
#[derive(Debug, thiserror::Error)]
pub enum MarketError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Denied(DenialReason),
    #[error("{0}")]
    Forbidden(String),
    #[error("one submission allowed every {window_secs}s, retry in {retry_after_secs}s")]
    TooManyRequests {
        retry_after_secs: u64,
        window_secs: u64,
    },
    #[error("insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance {
        available: Decimal,
        requested: Decimal,
    },
    #[error(transparent)]
    Storage(#[from] RepositoryError),
}

impl MarketError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MarketError::NotFound(_) | MarketError::Storage(RepositoryError::NotFound) => {
                ErrorKind::NotFound
            }
            MarketError::BadRequest(_)
            | MarketError::Denied(_)
            | MarketError::InsufficientBalance { .. } => ErrorKind::BadRequest,
            MarketError::Forbidden(_) => ErrorKind::Forbidden,
            MarketError::TooManyRequests { .. } => ErrorKind::TooManyRequests,
            MarketError::Storage(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn missing(what: &str, id: impl std::fmt::Display) -> Self {
        MarketError::NotFound(format!("{what} {id} not found"))
    }
}
