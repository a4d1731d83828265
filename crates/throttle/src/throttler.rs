//! [`Throttler`] — the admission gate in front of flow creation.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use drover_core::config::ThrottleConfig;

use crate::error::{Result, ThrottleError};
use crate::log::{ThrottleLog, ThrottleRecord};
use crate::signature::FlowSignature;

/// Gates flow-creation requests per (agent, user) pair.
///
/// The throttle only decides; it never creates flows. The contract with
/// callers is check-then-act: call
/// [`enforce_limits`](Throttler::enforce_limits), create the flow, and
/// only after creation succeeds call
/// [`record_request`](Throttler::record_request) — so a failed creation
/// never counts against anyone.
pub struct Throttler {
    log: Arc<dyn ThrottleLog>,
    /// Requests allowed per (agent, user) in a trailing 24h; zero disables.
    daily_request_limit: u64,
    /// Window in which an identical request is a duplicate; zero disables.
    dup_interval: Duration,
}

impl Throttler {
    pub fn new(log: Arc<dyn ThrottleLog>, config: &ThrottleConfig) -> Self {
        Self {
            log,
            daily_request_limit: config.daily_request_limit,
            dup_interval: config.dup_interval,
        }
    }

    /// Decide whether this request may proceed. Raising an error performs
    /// no action at all: no flow, no record.
    pub fn enforce_limits(
        &self,
        agent_id: &str,
        user: &str,
        flow_name: &str,
        args: &Value,
    ) -> Result<()> {
        self.enforce_limits_at(agent_id, user, flow_name, args, Utc::now())
    }

    /// [`enforce_limits`](Throttler::enforce_limits) at a fixed instant,
    /// for deterministic tests.
    pub fn enforce_limits_at(
        &self,
        agent_id: &str,
        user: &str,
        flow_name: &str,
        args: &Value,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if self.daily_request_limit > 0 {
            let cutoff = now - chrono::Duration::hours(24);
            let count = self.log.records_since(agent_id, user, cutoff).len() as u64;
            if count >= self.daily_request_limit {
                debug!(
                    agent_id = %agent_id,
                    user = %user,
                    count,
                    limit = self.daily_request_limit,
                    "daily flow quota exhausted"
                );
                return Err(ThrottleError::DailyLimitExceeded {
                    count,
                    limit: self.daily_request_limit,
                });
            }
        }

        if !self.dup_interval.is_zero() {
            let cutoff = now
                - chrono::Duration::from_std(self.dup_interval)
                    .unwrap_or_else(|_| chrono::Duration::zero());
            let signature = FlowSignature::new(flow_name, args);
            let duplicate = self
                .log
                .records_since(agent_id, user, cutoff)
                .iter()
                .any(|r| r.signature == signature);
            if duplicate {
                debug!(
                    agent_id = %agent_id,
                    user = %user,
                    signature = %signature,
                    "duplicate flow request suppressed"
                );
                return Err(ThrottleError::DuplicateFlow {
                    interval: self.dup_interval,
                });
            }
        }

        Ok(())
    }

    /// Record an accepted request. Call only after the flow was created.
    pub fn record_request(&self, agent_id: &str, user: &str, flow_name: &str, args: &Value) {
        self.record_request_at(agent_id, user, flow_name, args, Utc::now());
    }

    pub fn record_request_at(
        &self,
        agent_id: &str,
        user: &str,
        flow_name: &str,
        args: &Value,
        now: DateTime<Utc>,
    ) {
        self.log.append(ThrottleRecord {
            agent_id: agent_id.to_string(),
            user: user.to_string(),
            signature: FlowSignature::new(flow_name, args),
            at: now,
        });
    }
}

// ── Tests ───────────────────────────────────────────────────────────
