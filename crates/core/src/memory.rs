//! In-memory collaborator implementations.
//!
//! These back the worker binary and the test suites. All of them share the
//! same shape: `std::sync::RwLock` over a plain map or vector, so they are
//! usable from both async handlers and synchronous callers.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{AgentStoreError, FlowError, HuntError};
use crate::flow::{FlowId, FlowSpec};
use crate::snapshot::AgentSnapshot;
use crate::traits::{AgentStore, FlowEngine, HuntRegistry, StatsRecorder};

// ── Agent store ─────────────────────────────────────────────────────

struct AgentRecord {
    snapshot: AgentSnapshot,
    last_seen: DateTime<Utc>,
}

/// Agent snapshots keyed by id, with check-in bookkeeping.
#[derive(Default)]
pub struct MemoryAgentStore {
    agents: RwLock<HashMap<String, AgentRecord>>,
}

impl MemoryAgentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a check-in: replace the agent's snapshot, stamped now.
    pub fn upsert(&self, snapshot: AgentSnapshot) {
        self.upsert_at(snapshot, Utc::now());
    }

    pub fn upsert_at(&self, snapshot: AgentSnapshot, seen_at: DateTime<Utc>) {
        let mut guard = self.agents.write().expect("agent store lock poisoned");
        guard.insert(
            snapshot.agent_id.clone(),
            AgentRecord {
                snapshot,
                last_seen: seen_at,
            },
        );
    }
}

#[async_trait]
impl AgentStore for MemoryAgentStore {
    async fn read_snapshot(&self, agent_id: &str) -> Result<AgentSnapshot, AgentStoreError> {
        let guard = self.agents.read().expect("agent store lock poisoned");
        guard
            .get(agent_id)
            .map(|r| r.snapshot.clone())
            .ok_or_else(|| AgentStoreError::UnknownAgent(agent_id.to_string()))
    }

    async fn checked_in_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<String>, AgentStoreError> {
        let guard = self.agents.read().expect("agent store lock poisoned");
        let mut ids: Vec<String> = guard
            .values()
            .filter(|r| r.last_seen >= cutoff)
            .map(|r| r.snapshot.agent_id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }
}

// ── Flow engine ─────────────────────────────────────────────────────

/// One flow accepted by [`MemoryFlowEngine`].
#[derive(Debug, Clone)]
pub struct StartedFlow {
    pub flow_id: FlowId,
    pub agent_id: String,
    pub flow: FlowSpec,
    pub creator: String,
}

/// Accepts every flow request and remembers it, unless the target agent
/// has been marked denied.
#[derive(Default)]
pub struct MemoryFlowEngine {
    started: RwLock<Vec<StartedFlow>>,
    denied: RwLock<HashSet<String>>,
}

impl MemoryFlowEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make future requests for this agent fail with `ApprovalMissing`.
    pub fn deny_agent(&self, agent_id: impl Into<String>) {
        self.denied
            .write()
            .expect("flow engine lock poisoned")
            .insert(agent_id.into());
    }

    /// Every flow accepted so far, in submission order.
    pub fn started(&self) -> Vec<StartedFlow> {
        self.started
            .read()
            .expect("flow engine lock poisoned")
            .clone()
    }

    pub fn started_count(&self) -> usize {
        self.started.read().expect("flow engine lock poisoned").len()
    }
}

#[async_trait]
impl FlowEngine for MemoryFlowEngine {
    async fn start_flow(
        &self,
        agent_id: &str,
        flow: &FlowSpec,
        creator: &str,
    ) -> Result<FlowId, FlowError> {
        if self
            .denied
            .read()
            .expect("flow engine lock poisoned")
            .contains(agent_id)
        {
            return Err(FlowError::ApprovalMissing {
                agent_id: agent_id.to_string(),
                user: creator.to_string(),
            });
        }
        let flow_id = Uuid::new_v4().to_string();
        self.started
            .write()
            .expect("flow engine lock poisoned")
            .push(StartedFlow {
                flow_id: flow_id.clone(),
                agent_id: agent_id.to_string(),
                flow: flow.clone(),
                creator: creator.to_string(),
            });
        Ok(flow_id)
    }
}

// ── Hunt registry ───────────────────────────────────────────────────

/// Records hunt enrollments and rule-expiry notices.
#[derive(Default)]
pub struct MemoryHuntRegistry {
    enrollments: RwLock<Vec<(String, String)>>,
    expired_rules: RwLock<Vec<(String, String)>>,
}

impl MemoryHuntRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(hunt_id, agent_id)` pairs in enrollment order.
    pub fn enrollments(&self) -> Vec<(String, String)> {
        self.enrollments
            .read()
            .expect("hunt registry lock poisoned")
            .clone()
    }

    /// `(hunt_id, rule_id)` pairs, one per expiry notice received.
    pub fn expired_rules(&self) -> Vec<(String, String)> {
        self.expired_rules
            .read()
            .expect("hunt registry lock poisoned")
            .clone()
    }
}

#[async_trait]
impl HuntRegistry for MemoryHuntRegistry {
    async fn enroll(&self, hunt_id: &str, agent_id: &str) -> Result<(), HuntError> {
        self.enrollments
            .write()
            .expect("hunt registry lock poisoned")
            .push((hunt_id.to_string(), agent_id.to_string()));
        Ok(())
    }

    async fn rule_expired(&self, hunt_id: &str, rule_id: &str) -> Result<(), HuntError> {
        self.expired_rules
            .write()
            .expect("hunt registry lock poisoned")
            .push((hunt_id.to_string(), rule_id.to_string()));
        Ok(())
    }
}

// ── Stats ───────────────────────────────────────────────────────────

/// Counter and latency snapshots for tests and the worker's periodic
/// summary log line.
#[derive(Default)]
pub struct MemoryStatsRecorder {
    counters: RwLock<HashMap<String, u64>>,
    latencies: RwLock<HashMap<String, Vec<Duration>>>,
}

impl MemoryStatsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters
            .read()
            .expect("stats lock poisoned")
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    pub fn latencies(&self, name: &str) -> Vec<Duration> {
        self.latencies
            .read()
            .expect("stats lock poisoned")
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    /// All counters, name-sorted, for log summaries.
    pub fn counters(&self) -> Vec<(String, u64)> {
        let guard = self.counters.read().expect("stats lock poisoned");
        let mut out: Vec<(String, u64)> = guard.iter().map(|(k, v)| (k.clone(), *v)).collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

impl StatsRecorder for MemoryStatsRecorder {
    fn increment_counter(&self, name: &str, delta: u64) {
        let mut guard = self.counters.write().expect("stats lock poisoned");
        *guard.entry(name.to_string()).or_insert(0) += delta;
    }

    fn record_latency(&self, name: &str, value: Duration) {
        let mut guard = self.latencies.write().expect("stats lock poisoned");
        guard.entry(name.to_string()).or_default().push(value);
    }
}
