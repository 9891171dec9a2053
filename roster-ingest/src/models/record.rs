//! Canonical contact record

use serde::{Deserialize, Serialize};

/// Bound parameters one record contributes to an upsert statement
pub const PARAMS_PER_RECORD: usize = 3;

/// Validated, normalized contact row
///
/// Built by the record validator; never mutated afterwards. A later record
/// with the same email supersedes it during persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    email: String,
    first_name: String,
    last_name: Option<String>,
}

impl Record {
    /// Build a record from already-normalized values
    pub fn new(
        email: impl Into<String>,
        first_name: impl Into<String>,
        last_name: Option<String>,
    ) -> Self {
        Self {
            email: email.into(),
            first_name: first_name.into(),
            last_name,
        }
    }

    /// Natural key (lowercased, trimmed)
    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn first_name(&self) -> &str {
        &self.first_name
    }

    pub fn last_name(&self) -> Option<&str> {
        self.last_name.as_deref()
    }
}
