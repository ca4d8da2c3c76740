use alloy::primitives::Address;
use std::str::FromStr;
use thiserror::Error;

/// Hard ceiling on a single page of query results.
pub const MAX_QUERY_LIMIT: i64 = 1_000_000;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid address for {field}: {value}")]
    InvalidAddress { field: String, value: String },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Parses a 20-byte `0x` hex address, naming `field` in the error.
pub fn validate_address(field: &str, value: &str) -> Result<Address, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingParameter(field.to_string()));
    }

    if !trimmed.starts_with("0x") || trimmed.len() != 42 {
        return Err(ValidationError::InvalidAddress {
            field: field.to_string(),
            value: value.to_string(),
        });
    }

    Address::from_str(trimmed).map_err(|_| ValidationError::InvalidAddress {
        field: field.to_string(),
        value: value.to_string(),
    })
}

pub fn validate_limit(limit: i64) -> Result<i64, ValidationError> {
    if !(1..=MAX_QUERY_LIMIT).contains(&limit) {
        return Err(ValidationError::InvalidParameter(format!(
            "limit must be between 1 and {MAX_QUERY_LIMIT}, got {limit}"
        )));
    }
    Ok(limit)
}

pub fn validate_offset(offset: i64) -> Result<i64, ValidationError> {
    if offset < 0 {
        return Err(ValidationError::InvalidParameter(format!(
            "offset must be non-negative, got {offset}"
        )));
    }
    Ok(offset)
}
