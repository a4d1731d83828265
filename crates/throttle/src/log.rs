//! The append-only request log the throttle decides against.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::signature::FlowSignature;

/// One accepted flow request. Append-only; retention is the embedding
/// system's business.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleRecord {
    pub agent_id: String,
    pub user: String,
    pub signature: FlowSignature,
    pub at: DateTime<Utc>,
}

/// Storage seam for throttle records. Queries run over trailing windows
/// per (agent, user); nothing is ever mutated or deleted here.
pub trait ThrottleLog: Send + Sync {
    fn append(&self, record: ThrottleRecord);
    /// Records for this (agent, user) strictly after `cutoff`, oldest
    /// first. A record exactly at `cutoff` is already outside the
    /// trailing window.
    fn records_since(&self, agent_id: &str, user: &str, cutoff: DateTime<Utc>)
        -> Vec<ThrottleRecord>;
}

/// Log backed by an append-ordered vector.
#[derive(Default)]
pub struct MemoryThrottleLog {
    records: RwLock<Vec<ThrottleRecord>>,
}

impl MemoryThrottleLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().expect("throttle log lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ThrottleLog for MemoryThrottleLog {
    fn append(&self, record: ThrottleRecord) {
        self.records
            .write()
            .expect("throttle log lock poisoned")
            .push(record);
    }

    fn records_since(
        &self,
        agent_id: &str,
        user: &str,
        cutoff: DateTime<Utc>,
    ) -> Vec<ThrottleRecord> {
        self.records
            .read()
            .expect("throttle log lock poisoned")
            .iter()
            .filter(|r| r.agent_id == agent_id && r.user == user && r.at > cutoff)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn record(agent: &str, user: &str, at: DateTime<Utc>) -> ThrottleRecord {
        ThrottleRecord {
            agent_id: agent.to_string(),
            user: user.to_string(),
            signature: FlowSignature::new("Collect", &json!({})),
            at,
        }
    }

    #[test]
    fn query_filters_by_pair_and_cutoff() {
        let log = MemoryThrottleLog::new();
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        log.append(record("A.1", "alice", t0));
        log.append(record("A.1", "alice", t0 + chrono::Duration::hours(2)));
        log.append(record("A.1", "bob", t0 + chrono::Duration::hours(2)));
        log.append(record("A.2", "alice", t0 + chrono::Duration::hours(2)));

        let hits = log.records_since("A.1", "alice", t0 + chrono::Duration::hours(1));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].at, t0 + chrono::Duration::hours(2));
        assert_eq!(log.len(), 4);

        // The cutoff instant itself is excluded.
        let boundary = log.records_since("A.1", "alice", t0 + chrono::Duration::hours(2));
        assert!(boundary.is_empty());
    }
}
