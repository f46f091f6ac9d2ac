//! Error taxonomy for the state system
//!
//! Three families of failures, handled differently:
//!
//! - `NotFound` / `PathNotFound`: a caller used a quark or path that was
//!   never created. Always surfaced — this is a programming error in the
//!   domain handler, never defaulted away.
//! - `OutOfOrder` / `AlreadyOpen`: malformed or truncated trace input.
//!   Recoverable under [`ErrorPolicy::SkipAndContinue`](crate::config::ErrorPolicy).
//! - `NothingOpen`: a pop/close with no matching open interval. Treated as
//!   a no-op by default (truncated traces commonly end mid-activity).
//!
//! Correlation lookup misses are *not* errors anywhere in this crate; they
//! are `Option::None` with a configured placeholder fallback.

use crate::attribute_tree::Quark;
use thiserror::Error;

/// Errors for state system operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("unknown attribute quark {quark}")]
    NotFound { quark: Quark },

    #[error("no attribute at path '{path}'")]
    PathNotFound { path: String },

    #[error(
        "out-of-order interval on quark {quark}: [{start}, {end}] conflicts with last end {last_end}"
    )]
    OutOfOrder {
        quark: Quark,
        start: i64,
        end: i64,
        last_end: i64,
    },

    #[error("quark {quark} already has an open interval since {since}")]
    AlreadyOpen { quark: Quark, since: i64 },

    #[error("quark {quark} has no open interval to close")]
    NothingOpen { quark: Quark },

    #[error("event '{event}' is missing required field '{field}'")]
    MissingField { event: String, field: String },

    #[error("event '{event}' field '{field}' has the wrong type (expected {expected})")]
    FieldTypeMismatch {
        event: String,
        field: String,
        expected: &'static str,
    },

    #[error("processing aborted by fail-fast policy: {source}")]
    Aborted {
        #[source]
        source: Box<StateError>,
    },
}

impl StateError {
    /// True for errors that indicate bad trace *input* rather than a bug in
    /// the calling handler. Only these may be absorbed by skip-and-continue.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            StateError::OutOfOrder { .. }
                | StateError::AlreadyOpen { .. }
                | StateError::NothingOpen { .. }
                | StateError::MissingField { .. }
                | StateError::FieldTypeMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, StateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_error_classification() {
        assert!(StateError::NothingOpen { quark: 3 }.is_data_error());
        assert!(StateError::OutOfOrder {
            quark: 1,
            start: 5,
            end: 9,
            last_end: 7
        }
        .is_data_error());
        assert!(!StateError::NotFound { quark: 9 }.is_data_error());
        assert!(!StateError::PathNotFound {
            path: "gpu0/queues".into()
        }
        .is_data_error());
    }

    #[test]
    fn test_display_messages() {
        let err = StateError::AlreadyOpen { quark: 4, since: 100 };
        assert_eq!(
            err.to_string(),
            "quark 4 already has an open interval since 100"
        );
    }
}
