//! Error types for rule validation, evaluation, and dispatch.

use drover_core::error::{AgentStoreError, FlowError, HuntError};
use thiserror::Error;

/// A condition that cannot be evaluated against any snapshot.
///
/// Raised at evaluation time, per rule and per cycle; a malformed rule is
/// skipped and reported, never treated as a silent non-match.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidRuleError {
    /// The condition names no field to inspect.
    #[error("condition references no field")]
    FieldUnset,

    /// The condition names a field the snapshot does not carry.
    #[error("condition references unknown field '{field}'")]
    UnknownField { field: String },

    /// The regex pattern does not compile.
    #[error("pattern '{pattern}' failed to compile: {message}")]
    BadPattern { pattern: String, message: String },
}

/// Errors that can occur during rule management and task dispatch.
#[derive(Debug, Error)]
pub enum ForemanError {
    /// No rule with the given id exists.
    #[error("rule not found: {0}")]
    RuleNotFound(String),

    /// Create-time validation failure (bad pattern, inverted expiry).
    #[error("rule rejected: {0}")]
    BadRule(String),

    /// Evaluation-time rule failure.
    #[error("invalid rule: {0}")]
    InvalidRule(#[from] InvalidRuleError),

    /// Agent store failure.
    #[error("agent store error: {0}")]
    Agent(#[from] AgentStoreError),

    /// Flow engine failure.
    #[error("flow engine error: {0}")]
    Flow(#[from] FlowError),

    /// Hunt registry failure.
    #[error("hunt registry error: {0}")]
    Hunt(#[from] HuntError),
}

/// Result alias for foreman operations.
pub type Result<T> = std::result::Result<T, ForemanError>;
