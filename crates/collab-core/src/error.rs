//! Error types shared by the OT adapter boundary.
//!
//! Strongly-typed errors per layer, following the protocol core's convention
//! of never using bare `std::io::Error` for protocol logic.

use thiserror::Error;

/// Errors raised by an [`crate::ot::OtDocument`] while applying a step.
///
/// Application is total-or-fail (§3 Step): any of these aborts the whole
/// batch, never partially mutating the document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OtError {
    /// A position referenced by the step falls outside the document.
    #[error("position {position} out of bounds (document length {len})")]
    PositionOutOfBounds {
        /// The offending position.
        position: i64,
        /// The document's current length.
        len: usize,
    },

    /// `from > to` or another structurally invalid range was supplied.
    #[error("invalid range [{from}, {to})")]
    InvalidRange {
        /// Range start.
        from: i64,
        /// Range end.
        to: i64,
    },

    /// The step's `stepType` is not recognized by this OT adapter.
    #[error("unknown step type: {0}")]
    UnknownStepType(String),

    /// The step's JSON form could not be parsed into a concrete step.
    #[error("malformed step JSON: {0}")]
    MalformedStep(String),
}

impl OtError {
    /// Returns a human-readable reason suitable for an `apply_failed` error
    /// message (§4.2 `handleSteps` step 2, §7).
    #[must_use]
    pub fn reason(&self) -> String {
        self.to_string()
    }
}
