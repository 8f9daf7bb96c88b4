//! Error kinds for the scheduling core, per the ERROR HANDLING DESIGN.
//!
//! Validation errors are returned as `Result` values; only
//! [`ScheduleError::InternalInvariant`] is meant to represent a bug that a
//! caller cannot meaningfully recover from.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("invalid input in field `{field}`: {message}")]
    InvalidInput { field: String, message: String },

    #[error("{kind} `{id}` not found")]
    NotFound { kind: String, id: String },

    #[error("slot `{slot_id}` changed since it was read (version conflict)")]
    VersionConflict { slot_id: String },

    #[error("store unavailable after {attempts} attempts: {message}")]
    StoreUnavailable { attempts: u32, message: String },

    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),
}

impl ScheduleError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

pub type ScheduleResult<T> = Result<T, ScheduleError>;
