//! Shared error types for collaborator interfaces.
//!
//! Control-plane components propagate these as typed failures and never
//! retry internally; retry policy belongs to the embedding system.

use thiserror::Error;

/// Errors surfaced by the flow-creation collaborator.
#[derive(Debug, Error)]
pub enum FlowError {
    /// The acting user lacks an approval grant for the target agent.
    /// Propagated to the caller unchanged; the control plane never retries.
    #[error("user '{user}' has no approval for agent '{agent_id}'")]
    ApprovalMissing { agent_id: String, user: String },

    /// The execution tier refused the flow request.
    #[error("flow request rejected: {0}")]
    Rejected(String),

    /// The execution tier could not be reached.
    #[error("flow engine unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by the agent-reporting collaborator.
#[derive(Debug, Error)]
pub enum AgentStoreError {
    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    #[error("agent store unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by the hunt registry collaborator.
#[derive(Debug, Error)]
pub enum HuntError {
    #[error("unknown hunt: {0}")]
    UnknownHunt(String),

    #[error("hunt registry unavailable: {0}")]
    Unavailable(String),
}

/// Malformed environment configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}
