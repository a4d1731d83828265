//! Collaborator interfaces implemented by the embedding platform.
//!
//! The control plane never reaches the outside world directly: flow
//! creation, agent state, hunt membership and metrics all go through these
//! traits. In-memory implementations for tests and the worker live in
//! [`crate::memory`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{AgentStoreError, FlowError, HuntError};
use crate::flow::{FlowId, FlowSpec};
use crate::snapshot::AgentSnapshot;

/// Creates flows on agents. Submission is awaited, execution never is.
#[async_trait]
pub trait FlowEngine: Send + Sync {
    /// Start `flow` on `agent_id` on behalf of `creator`.
    ///
    /// Access failures ([`FlowError::ApprovalMissing`]) are the engine's to
    /// raise and the caller's to surface unchanged.
    async fn start_flow(
        &self,
        agent_id: &str,
        flow: &FlowSpec,
        creator: &str,
    ) -> Result<FlowId, FlowError>;
}

/// Read access to the fleet's latest per-agent snapshots.
#[async_trait]
pub trait AgentStore: Send + Sync {
    async fn read_snapshot(&self, agent_id: &str) -> Result<AgentSnapshot, AgentStoreError>;

    /// Ids of agents that checked in at or after `cutoff`.
    async fn checked_in_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<String>, AgentStoreError>;
}

/// Hunt membership bookkeeping.
#[async_trait]
pub trait HuntRegistry: Send + Sync {
    async fn enroll(&self, hunt_id: &str, agent_id: &str) -> Result<(), HuntError>;

    /// Tell a hunt that its dispatch rule was removed. Sent at most once
    /// per rule, on pruning or explicit deletion.
    async fn rule_expired(&self, hunt_id: &str, rule_id: &str) -> Result<(), HuntError>;
}

/// Counter and latency sink. Recording must be cheap and infallible;
/// callers invoke it on hot paths and never handle errors from it.
pub trait StatsRecorder: Send + Sync {
    fn increment_counter(&self, name: &str, delta: u64);
    fn record_latency(&self, name: &str, value: std::time::Duration);
}
