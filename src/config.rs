//! Processing policies
//!
//! Defaults favor resilience: real captures are routinely truncated or
//! partially corrupted, and dropping one bad mutation beats losing the
//! whole timeline.

/// How to react when a mutation is rejected as malformed trace input
/// (`OutOfOrder`, `AlreadyOpen`, field validation failures).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Abort processing the trace on the first data error
    FailFast,
    /// Drop the offending mutation, log a warning, keep going
    #[default]
    SkipAndContinue,
}

/// What to do when a pop arrives with no matching open interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnmatchedPopPolicy {
    /// Silently ignore
    Ignore,
    /// Ignore, but emit a `tracing::warn!`
    #[default]
    Warn,
}

/// Whether a correlation lookup consumes the stored snapshot
///
/// `Retain` is the default: one launch may legitimately be joined by
/// several completions (e.g., a memory copy and a kernel tied to the same
/// API call).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CorrelationRetention {
    #[default]
    Retain,
    ConsumeOnLookup,
}

/// Configuration for one processing run
#[derive(Debug, Clone)]
pub struct StateConfig {
    pub error_policy: ErrorPolicy,
    pub unmatched_pop: UnmatchedPopPolicy,
    pub correlation_retention: CorrelationRetention,
    /// Substituted when a completion event's correlation key was never
    /// recorded (launch filtered out or before the capture window)
    pub correlation_placeholder: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        StateConfig {
            error_policy: ErrorPolicy::default(),
            unmatched_pop: UnmatchedPopPolicy::default(),
            correlation_retention: CorrelationRetention::default(),
            correlation_placeholder: "unknown".to_string(),
        }
    }
}

impl StateConfig {
    /// Strict configuration for validating well-formed fixtures in tests
    /// and CI: abort on any data error.
    pub fn strict() -> Self {
        StateConfig {
            error_policy: ErrorPolicy::FailFast,
            ..StateConfig::default()
        }
    }
}
