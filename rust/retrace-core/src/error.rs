//! Error types for cell construction, parsing and serialization.

use thiserror::Error;

/// Errors raised while building, slicing or (de)serializing cells.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CellError {
    #[error("cell overflow: {0}")]
    Overflow(String),

    #[error("cell underflow: {0}")]
    Underflow(String),

    #[error("invalid exotic cell: {0}")]
    InvalidExotic(String),

    #[error("invalid boc: {0}")]
    InvalidBoc(String),

    #[error("invalid tag {tag:#x} for {what}")]
    InvalidTag { what: &'static str, tag: u64 },

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl CellError {
    pub(crate) fn underflow(what: impl Into<String>) -> Self {
        CellError::Underflow(what.into())
    }

    pub(crate) fn overflow(what: impl Into<String>) -> Self {
        CellError::Overflow(what.into())
    }
}

pub type CellResult<T> = Result<T, CellError>;
