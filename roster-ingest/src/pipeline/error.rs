//! Fatal import errors
//!
//! Row-level problems are [`ValidationError`](super::ValidationError)s and batch-level
//! problems are [`BatchError`](super::BatchError)s; neither stops the stream on its own.

use thiserror::Error;

use super::Field;

/// Errors that abort an import before (or while) rows flow
#[derive(Debug, Error)]
pub enum ImportError {
    /// Required header(s) could not be resolved
    #[error("Missing required columns: {}", join_fields(.missing))]
    MissingColumns { missing: Vec<Field> },

    /// No header row at all
    #[error("Input is empty: no header row")]
    EmptyInput,

    /// The byte stream could not be read
    #[error("Unreadable input: {0}")]
    UnreadableInput(String),

    /// Pipeline settings rejected before start
    #[error("Invalid import configuration: {0}")]
    Config(String),
}

fn join_fields(fields: &[Field]) -> String {
    fields
        .iter()
        .map(Field::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
