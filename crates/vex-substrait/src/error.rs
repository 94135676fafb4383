//! # Translation Errors
//!
//! Two error kinds cover the whole translation surface:
//!
//! - `Invalid`: malformed or self-inconsistent input -- wrong arity, an
//!   anchor with no registered identifier, a join expression of the wrong
//!   shape, schema metadata that the wire format cannot carry. Failures from
//!   external collaborators (named-table providers, sink factories) are
//!   reported as `Invalid` rather than masked.
//! - `NotImplemented`: well-formed input using a feature this translator
//!   deliberately does not support -- an unsupported relation kind, aggregate
//!   phase, or native type with no wire equivalent.
//!
//! All errors are returned; nothing is thrown across component boundaries or
//! silently defaulted.

use thiserror::Error;
use vex_core::expr::BindError;
use vex_core::plan::PlanError;

#[derive(Debug, Error)]
pub enum SubstraitError {
    #[error("Invalid: {0}")]
    Invalid(String),
    #[error("NotImplemented: {0}")]
    NotImplemented(String),
}

impl SubstraitError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        SubstraitError::Invalid(msg.into())
    }

    pub fn not_implemented(msg: impl Into<String>) -> Self {
        SubstraitError::NotImplemented(msg.into())
    }
}

impl From<BindError> for SubstraitError {
    fn from(err: BindError) -> Self {
        SubstraitError::Invalid(err.to_string())
    }
}

impl From<PlanError> for SubstraitError {
    fn from(err: PlanError) -> Self {
        SubstraitError::Invalid(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SubstraitError>;
