//! Record and identity error types

use thiserror::Error;

/// Errors raised by record identity handling
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("invalid id fields for {kind}: expected [{}], got [{}]", expected.join(", "), got.join(", "))]
    IdFieldMismatch {
        kind: String,
        expected: Vec<String>,
        got: Vec<String>,
    },

    #[error("entity id '{id}' does not split into the {expected} id fields of {kind}")]
    IdArityMismatch {
        kind: String,
        id: String,
        expected: usize,
    },

    #[error("record has no surrogate key and no populated id fields for {kind}")]
    MissingIdentity { kind: String },

    #[error("missing field: {0}")]
    MissingField(String),
}

pub type Result<T> = std::result::Result<T, RecordError>;
