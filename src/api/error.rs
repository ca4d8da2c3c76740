use thiserror::Error;

use crate::db::StoreError;
use crate::validation::ValidationError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unknown chain: {0}")]
    UnknownChain(String),

    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::MissingParameter(param) => ApiError::MissingParameter(param),
            ValidationError::InvalidAddress { field, value } => {
                ApiError::InvalidParameter(format!("{field}: invalid address {value}"))
            }
            ValidationError::InvalidParameter(msg) => ApiError::InvalidParameter(msg),
        }
    }
}
