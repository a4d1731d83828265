//! Rule persistence and the per-agent dispatch ledger.
//!
//! Both seams are injected trait objects so the embedding system can back
//! them with its own database. The in-memory implementations use
//! `std::sync::RwLock` and are what the tests and the worker run against.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::schema::TaskRule;

/// Storage for task rules, kept in creation order.
pub trait RuleStore: Send + Sync {
    fn insert(&self, rule: TaskRule);
    fn get(&self, rule_id: &str) -> Option<TaskRule>;
    /// All rules in creation order.
    fn list(&self) -> Vec<TaskRule>;
    /// Flip the enabled flag; returns false when the rule does not exist.
    fn set_enabled(&self, rule_id: &str, enabled: bool) -> bool;
    fn remove(&self, rule_id: &str) -> Option<TaskRule>;
    /// Remove every rule whose expiry lies strictly before `now` and
    /// return the removed rules.
    fn remove_expired(&self, now: DateTime<Utc>) -> Vec<TaskRule>;
}

/// Per-agent record of which rules have been applied and up to which
/// creation point the agent has been evaluated.
///
/// The watermark is advanced only by the dispatcher's write path and only
/// forward; everything else just compares against it.
pub trait DispatchLedger: Send + Sync {
    fn watermark(&self, agent_id: &str) -> Option<DateTime<Utc>>;
    fn is_applied(&self, agent_id: &str, rule_id: &str) -> bool;
    fn mark_applied(&self, agent_id: &str, rule_id: &str);
    /// Raise the agent's watermark to `to`; lower values are ignored.
    fn advance_watermark(&self, agent_id: &str, to: DateTime<Utc>);
    /// Drop a removed rule's applied records for every agent.
    fn forget_rule(&self, rule_id: &str);
}

// ── In-memory implementations ───────────────────────────────────────

/// Rule storage backed by a creation-ordered vector.
#[derive(Default)]
pub struct MemoryRuleStore {
    rules: RwLock<Vec<TaskRule>>,
}

impl MemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RuleStore for MemoryRuleStore {
    fn insert(&self, rule: TaskRule) {
        self.rules.write().expect("rule store lock poisoned").push(rule);
    }

    fn get(&self, rule_id: &str) -> Option<TaskRule> {
        self.rules
            .read()
            .expect("rule store lock poisoned")
            .iter()
            .find(|r| r.id == rule_id)
            .cloned()
    }

    fn list(&self) -> Vec<TaskRule> {
        self.rules.read().expect("rule store lock poisoned").clone()
    }

    fn set_enabled(&self, rule_id: &str, enabled: bool) -> bool {
        let mut guard = self.rules.write().expect("rule store lock poisoned");
        match guard.iter_mut().find(|r| r.id == rule_id) {
            Some(rule) => {
                rule.enabled = enabled;
                true
            }
            None => false,
        }
    }

    fn remove(&self, rule_id: &str) -> Option<TaskRule> {
        let mut guard = self.rules.write().expect("rule store lock poisoned");
        let idx = guard.iter().position(|r| r.id == rule_id)?;
        Some(guard.remove(idx))
    }

    fn remove_expired(&self, now: DateTime<Utc>) -> Vec<TaskRule> {
        let mut guard = self.rules.write().expect("rule store lock poisoned");
        let (expired, kept): (Vec<TaskRule>, Vec<TaskRule>) =
            guard.drain(..).partition(|r| r.is_expired_at(now));
        *guard = kept;
        expired
    }
}

#[derive(Default)]
struct LedgerEntry {
    watermark: Option<DateTime<Utc>>,
    applied: HashSet<String>,
}

/// Dispatch ledger backed by a per-agent map.
#[derive(Default)]
pub struct MemoryDispatchLedger {
    agents: RwLock<HashMap<String, LedgerEntry>>,
}

impl MemoryDispatchLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DispatchLedger for MemoryDispatchLedger {
    fn watermark(&self, agent_id: &str) -> Option<DateTime<Utc>> {
        self.agents
            .read()
            .expect("dispatch ledger lock poisoned")
            .get(agent_id)
            .and_then(|e| e.watermark)
    }

    fn is_applied(&self, agent_id: &str, rule_id: &str) -> bool {
        self.agents
            .read()
            .expect("dispatch ledger lock poisoned")
            .get(agent_id)
            .map(|e| e.applied.contains(rule_id))
            .unwrap_or(false)
    }

    fn mark_applied(&self, agent_id: &str, rule_id: &str) {
        let mut guard = self.agents.write().expect("dispatch ledger lock poisoned");
        guard
            .entry(agent_id.to_string())
            .or_default()
            .applied
            .insert(rule_id.to_string());
    }

    fn advance_watermark(&self, agent_id: &str, to: DateTime<Utc>) {
        let mut guard = self.agents.write().expect("dispatch ledger lock poisoned");
        let entry = guard.entry(agent_id.to_string()).or_default();
        if entry.watermark.map_or(true, |current| to > current) {
            entry.watermark = Some(to);
        }
    }

    fn forget_rule(&self, rule_id: &str) {
        let mut guard = self.agents.write().expect("dispatch ledger lock poisoned");
        for entry in guard.values_mut() {
            entry.applied.remove(rule_id);
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────
