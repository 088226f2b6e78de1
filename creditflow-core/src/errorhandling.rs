//! Errors raised by creditflow operators.
//!
//! Configuration errors are raised on construction and are fatal to the operator
//! instance. Transform errors abort the current `update` call and reach the caller.
//! Failures of remote computations never appear here: they are contained by
//! [GatherFallback](crate::operators::GatherFallback).
use thiserror::Error;

use crate::credit::CreditError;
use crate::remote::SubmitError;

/// Error type accepted from user supplied functions
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Malformed operator parameters
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration for operator '{operator}': {reason}")]
    InvalidConfiguration { operator: String, reason: String },
}

impl ConfigError {
    /// Check `value` is usable as a size, i.e. strictly positive
    pub(crate) fn require_positive(
        operator: &str,
        parameter: &str,
        value: usize,
    ) -> Result<usize, ConfigError> {
        if value == 0 {
            Err(ConfigError::InvalidConfiguration {
                operator: operator.to_owned(),
                reason: format!("Expected `{parameter}` to be a positive integer. Got {value}."),
            })
        } else {
            Ok(value)
        }
    }
}

/// A mapping operator could not transform a batch
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("Function of operator '{operator}' failed")]
    Function {
        operator: String,
        #[source]
        source: BoxError,
    },
    #[error("Operator '{operator}' could not submit work for remote execution")]
    Submit {
        operator: String,
        #[source]
        source: SubmitError,
    },
}

/// Errors surfaced by an operator's `update`
#[derive(Debug, Error)]
pub enum OperatorError {
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error(transparent)]
    Credit(#[from] CreditError),
    #[error("Operator '{0}' requires a running tokio runtime")]
    NoRuntime(String),
    #[error("Asynchronous operator task did not complete")]
    Join(#[from] tokio::task::JoinError),
}
