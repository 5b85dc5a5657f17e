//! Terrain engine setup errors.

use thiserror::Error;

/// Errors that prevent a terrain engine from starting.
///
/// Held in the node's status; while set, paging does not run.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TerrainError {
    /// `update` was called before a map was assigned.
    #[error("no map assigned to terrain")]
    NoMap,

    #[error("invalid terrain setting '{field}': {reason}")]
    InvalidSettings { field: &'static str, reason: String },

    /// Settings document could not be parsed.
    #[error("failed to parse terrain settings: {0}")]
    Parse(String),
}

impl TerrainError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidSettings {
            field,
            reason: reason.into(),
        }
    }
}
