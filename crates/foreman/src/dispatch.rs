//! [`Foreman`] — evaluates dispatch rules against checking-in agents and
//! fires their bound actions at most once per rule generation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use drover_core::flow::FlowId;
use drover_core::traits::{AgentStore, FlowEngine, HuntRegistry};

use crate::error::{ForemanError, InvalidRuleError, Result};
use crate::evaluator::compile_pattern;
use crate::schema::{NewRule, RuleAction, RuleCondition, TaskRule};
use crate::store::{DispatchLedger, RuleStore};

/// Creator recorded on flows the foreman starts on its own authority.
const FOREMAN_CREATOR: &str = "foreman";

/// A flow started by a matching rule.
#[derive(Debug, Clone)]
pub struct DispatchedFlow {
    pub rule_id: String,
    pub flow_id: FlowId,
}

/// A hunt enrollment performed by a matching rule.
#[derive(Debug, Clone)]
pub struct HuntEnrollment {
    pub rule_id: String,
    pub hunt_id: String,
}

/// A rule whose conditions could not be evaluated this pass.
#[derive(Debug, Clone)]
pub struct RuleFailure {
    pub rule_id: String,
    pub error: InvalidRuleError,
}

/// An action that failed after its rule matched. The rule still counts as
/// applied; the action is not retried.
#[derive(Debug, Clone)]
pub struct ActionFailure {
    pub rule_id: String,
    pub message: String,
}

/// What one dispatch pass did for one agent.
#[derive(Debug, Default)]
pub struct AssignmentReport {
    /// Flows started, in rule-creation order.
    pub dispatched_flows: Vec<DispatchedFlow>,
    /// Hunts the agent was enrolled into, in rule-creation order.
    pub hunt_enrollments: Vec<HuntEnrollment>,
    /// Rules skipped because evaluation failed. They stay un-applied and
    /// get another chance on the next pass.
    pub failures: Vec<RuleFailure>,
    /// Matched rules whose action errored.
    pub action_failures: Vec<ActionFailure>,
}

impl AssignmentReport {
    /// Number of actions that actually fired.
    pub fn dispatched(&self) -> usize {
        self.dispatched_flows.len() + self.hunt_enrollments.len()
    }
}

/// Evaluates dispatch rules against agents and fires their actions.
///
/// Dispatch is at-most-once per (agent, rule): the ledger records every
/// applied rule, and a per-agent watermark tracks how far into the rule
/// timeline the agent has been evaluated. Call
/// [`assign_tasks_to_client`](Foreman::assign_tasks_to_client) whenever an
/// agent checks in; repeat calls with an unchanged rule set are no-ops.
pub struct Foreman {
    rules: Arc<dyn RuleStore>,
    ledger: Arc<dyn DispatchLedger>,
    agents: Arc<dyn AgentStore>,
    flows: Arc<dyn FlowEngine>,
    hunts: Arc<dyn HuntRegistry>,
}

impl Foreman {
    pub fn new(
        rules: Arc<dyn RuleStore>,
        ledger: Arc<dyn DispatchLedger>,
        agents: Arc<dyn AgentStore>,
        flows: Arc<dyn FlowEngine>,
        hunts: Arc<dyn HuntRegistry>,
    ) -> Self {
        Self {
            rules,
            ledger,
            agents,
            flows,
            hunts,
        }
    }

    // ── Rule management ─────────────────────────────────────────────

    /// Validate and store a new rule. New rules start enabled.
    pub fn create_rule(&self, new: NewRule) -> Result<TaskRule> {
        self.create_rule_at(new, Utc::now())
    }

    /// [`create_rule`](Foreman::create_rule) at a fixed creation instant.
    ///
    /// Validation covers what can be checked without a snapshot: regex
    /// patterns must compile and the expiry must lie after creation. Field
    /// references are checked at evaluation time, where the snapshot is.
    pub fn create_rule_at(&self, new: NewRule, now: DateTime<Utc>) -> Result<TaskRule> {
        if new.expires <= now {
            return Err(ForemanError::BadRule(format!(
                "expiry {} is not after creation {}",
                new.expires, now
            )));
        }
        for condition in &new.ruleset.conditions {
            if let RuleCondition::Regex(c) = condition {
                compile_pattern(&c.pattern).map_err(|e| ForemanError::BadRule(e.to_string()))?;
            }
        }

        let rule = TaskRule {
            id: Uuid::new_v4().to_string(),
            owner: new.owner,
            created: now,
            expires: new.expires,
            enabled: true,
            ruleset: new.ruleset,
            action: new.action,
        };
        info!(rule_id = %rule.id, owner = %rule.owner, "created dispatch rule");
        self.rules.insert(rule.clone());
        Ok(rule)
    }

    /// All rules in creation order.
    pub fn list_rules(&self) -> Vec<TaskRule> {
        self.rules.list()
    }

    /// Enable or disable a rule, the one mutation rules support.
    pub fn set_rule_enabled(&self, rule_id: &str, enabled: bool) -> Result<()> {
        if self.rules.set_enabled(rule_id, enabled) {
            info!(rule_id = %rule_id, enabled, "dispatch rule toggled");
            Ok(())
        } else {
            Err(ForemanError::RuleNotFound(rule_id.to_string()))
        }
    }

    /// Delete a rule explicitly. Hunt-bound rules get the same single
    /// expiry notice deletion-by-expiry would have sent.
    pub async fn delete_rule(&self, rule_id: &str) -> Result<()> {
        let rule = self
            .rules
            .remove(rule_id)
            .ok_or_else(|| ForemanError::RuleNotFound(rule_id.to_string()))?;
        self.retire(&rule).await;
        info!(rule_id = %rule_id, "deleted dispatch rule");
        Ok(())
    }

    /// Prune every expired rule, notifying each affected hunt once.
    /// Returns the number of rules removed.
    pub async fn expire_rules(&self) -> usize {
        self.expire_rules_at(Utc::now()).await
    }

    pub async fn expire_rules_at(&self, now: DateTime<Utc>) -> usize {
        let expired = self.rules.remove_expired(now);
        let count = expired.len();
        for rule in expired {
            self.retire(&rule).await;
            info!(rule_id = %rule.id, owner = %rule.owner, "dispatch rule expired");
        }
        count
    }

    /// Ledger cleanup and hunt notice for a rule leaving the store. A
    /// failed notice is logged, not retried; the rule is already gone.
    async fn retire(&self, rule: &TaskRule) {
        self.ledger.forget_rule(&rule.id);
        if let Some(hunt_id) = rule.hunt_id() {
            if let Err(e) = self.hunts.rule_expired(hunt_id, &rule.id).await {
                warn!(
                    rule_id = %rule.id,
                    hunt_id = %hunt_id,
                    error = %e,
                    "hunt expiry notice failed"
                );
            }
        }
    }

    // ── Dispatch ────────────────────────────────────────────────────

    /// Evaluate all outstanding rules against one agent and fire matching
    /// actions. Runs on every agent check-in.
    pub async fn assign_tasks_to_client(&self, agent_id: &str) -> Result<AssignmentReport> {
        self.assign_tasks_to_client_at(agent_id, Utc::now()).await
    }

    /// [`assign_tasks_to_client`](Foreman::assign_tasks_to_client) at a
    /// fixed instant, for deterministic tests.
    pub async fn assign_tasks_to_client_at(
        &self,
        agent_id: &str,
        now: DateTime<Utc>,
    ) -> Result<AssignmentReport> {
        // Expired rules are pruned lazily, at the start of every pass.
        self.expire_rules_at(now).await;

        let snapshot = self.agents.read_snapshot(agent_id).await?;
        let watermark = self.ledger.watermark(agent_id);
        let mut report = AssignmentReport::default();
        let mut newest_applied: Option<DateTime<Utc>> = None;

        for rule in self.rules.list() {
            if !rule.enabled {
                continue;
            }
            // Rules above the watermark are new since this agent was last
            // evaluated and cannot have been applied, so they skip the
            // ledger lookup. At or below it, the applied record is the
            // at-most-once guard; rules left un-applied down there by an
            // evaluation failure get another chance here.
            let seen = watermark.map_or(false, |w| rule.created <= w);
            if seen && self.ledger.is_applied(agent_id, &rule.id) {
                continue;
            }

            match rule.ruleset.evaluate(&snapshot) {
                Ok(true) => {
                    self.fire_action(&rule, agent_id, &mut report).await;
                    self.ledger.mark_applied(agent_id, &rule.id);
                    newest_applied =
                        Some(newest_applied.map_or(rule.created, |c| c.max(rule.created)));
                }
                Ok(false) => {
                    self.ledger.mark_applied(agent_id, &rule.id);
                    newest_applied =
                        Some(newest_applied.map_or(rule.created, |c| c.max(rule.created)));
                }
                Err(e) => {
                    warn!(
                        rule_id = %rule.id,
                        agent_id = %agent_id,
                        error = %e,
                        "rule evaluation failed, skipping this cycle"
                    );
                    report.failures.push(RuleFailure {
                        rule_id: rule.id.clone(),
                        error: e,
                    });
                }
            }
        }

        if let Some(newest) = newest_applied {
            self.ledger.advance_watermark(agent_id, newest);
        }
        Ok(report)
    }

    /// Fire a matched rule's action. Action errors land in the report; the
    /// caller records the rule applied either way, so a failed action is
    /// never re-fired.
    async fn fire_action(&self, rule: &TaskRule, agent_id: &str, report: &mut AssignmentReport) {
        match &rule.action {
            RuleAction::StartFlow { flow } => {
                match self.flows.start_flow(agent_id, flow, FOREMAN_CREATOR).await {
                    Ok(flow_id) => {
                        debug!(
                            rule_id = %rule.id,
                            agent_id = %agent_id,
                            flow = %flow.name,
                            flow_id = %flow_id,
                            "rule dispatched flow"
                        );
                        report.dispatched_flows.push(DispatchedFlow {
                            rule_id: rule.id.clone(),
                            flow_id,
                        });
                    }
                    Err(e) => {
                        warn!(
                            rule_id = %rule.id,
                            agent_id = %agent_id,
                            flow = %flow.name,
                            error = %e,
                            "flow dispatch failed"
                        );
                        report.action_failures.push(ActionFailure {
                            rule_id: rule.id.clone(),
                            message: e.to_string(),
                        });
                    }
                }
            }
            RuleAction::Hunt { hunt_id } => match self.hunts.enroll(hunt_id, agent_id).await {
                Ok(()) => {
                    debug!(
                        rule_id = %rule.id,
                        agent_id = %agent_id,
                        hunt_id = %hunt_id,
                        "rule enrolled agent into hunt"
                    );
                    report.hunt_enrollments.push(HuntEnrollment {
                        rule_id: rule.id.clone(),
                        hunt_id: hunt_id.clone(),
                    });
                }
                Err(e) => {
                    warn!(
                        rule_id = %rule.id,
                        agent_id = %agent_id,
                        hunt_id = %hunt_id,
                        error = %e,
                        "hunt enrollment failed"
                    );
                    report.action_failures.push(ActionFailure {
                        rule_id: rule.id.clone(),
                        message: e.to_string(),
                    });
                }
            },
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────
