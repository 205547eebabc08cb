//! Error types for the tax engine
//!
//! Only configuration problems are fatal. Inconsistent transaction history is
//! reported through [`crate::summary::DataQualityWarning`] instead.

use thiserror::Error;

/// Fatal errors raised before any computation starts
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaxError {
    #[error("invalid configuration: unsupported {field} '{value}' (expected one of: {expected})")]
    InvalidConfiguration {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("invalid configuration: {0}")]
    InvalidRule(String),
}

impl TaxError {
    pub fn unsupported(field: &'static str, value: impl Into<String>, expected: &'static str) -> Self {
        TaxError::InvalidConfiguration {
            field,
            value: value.into(),
            expected,
        }
    }

    /// True for every configuration-class error
    pub fn is_invalid_configuration(&self) -> bool {
        matches!(
            self,
            TaxError::InvalidConfiguration { .. } | TaxError::InvalidRule(_)
        )
    }
}

pub type TaxResult<T> = Result<T, TaxError>;
