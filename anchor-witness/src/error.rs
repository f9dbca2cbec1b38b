//! Error types for the witness subsystem.
//!
//! Drivers discriminate on the error kind: `Transient` failures may be
//! retried, `NotFound` is a normal flow signal, everything else is surfaced
//! to the operator. Messages embed `anchorID[...]` and `witness[...]`
//! context so log lines correlate across delivery paths.

use anchor_core::WitnessType;
use thiserror::Error;

use crate::policy::config::PolicyParseError;
use crate::policy::selector::SelectionError;

/// Errors surfaced to drivers of the witness subsystem.
#[derive(Error, Debug)]
pub enum WitnessError {
    /// Retryable backend failure: connection, batch-write or query errors.
    #[error("{0}")]
    Transient(String),

    /// Non-retryable data failure: a stored record could not be decoded.
    #[error("{0}")]
    Permanent(String),

    /// The anchor or witness is not on record; a normal flow signal.
    #[error("{0}")]
    NotFound(String),

    /// The witness policy expression could not be parsed.
    #[error(transparent)]
    Parse(#[from] PolicyParseError),

    /// Selection could not meet the policy for one witness class.
    #[error("unable to satisfy witness policy[{policy}] for {class} witnesses: {source}")]
    Selection {
        class: WitnessType,
        policy: String,
        #[source]
        source: SelectionError,
    },
}

impl WitnessError {
    pub(crate) fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub(crate) fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    pub(crate) fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// True when the caller may retry the failed operation.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// True when the anchor or witness was simply absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result type alias for witness subsystem operations.
pub type WitnessResult<T> = Result<T, WitnessError>;
