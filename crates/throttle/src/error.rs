//! Admission errors.
//!
//! Both are guaranteed side-effect free: when one is raised, no flow was
//! created and no record was appended.

use std::time::Duration;

use thiserror::Error;

/// A flow request the throttle refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ThrottleError {
    /// The (agent, user) pair already hit its daily request quota.
    #[error("daily flow request limit exceeded: {count} of {limit} in the last 24h")]
    DailyLimitExceeded { count: u64, limit: u64 },

    /// An identical request was accepted within the duplicate window.
    #[error("identical flow requested within the last {}s", interval.as_secs())]
    DuplicateFlow { interval: Duration },
}

/// Result alias for throttle operations.
pub type Result<T> = std::result::Result<T, ThrottleError>;
