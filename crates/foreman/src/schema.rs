//! Dispatch rule schema: condition leaves, rulesets, and task rules.

use chrono::{DateTime, Utc};
use drover_core::flow::FlowSpec;
use serde::{Deserialize, Serialize};

/// How a ruleset combines its member conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// True when at least one condition matches; an empty ruleset never
    /// matches.
    MatchAny,
    /// True when every condition matches; an empty ruleset always matches.
    MatchAll,
}

/// A boolean predicate tree evaluated against one agent snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSet {
    pub match_mode: MatchMode,
    #[serde(default)]
    pub conditions: Vec<RuleCondition>,
}

impl RuleSet {
    pub fn match_any(conditions: Vec<RuleCondition>) -> Self {
        Self {
            match_mode: MatchMode::MatchAny,
            conditions,
        }
    }

    pub fn match_all(conditions: Vec<RuleCondition>) -> Self {
        Self {
            match_mode: MatchMode::MatchAll,
            conditions,
        }
    }
}

/// A condition leaf. Matched exhaustively by the evaluator, so adding a
/// variant without handling it is a compile error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleCondition {
    Os(OsSelector),
    Label(LabelCondition),
    Regex(RegexCondition),
    Integer(IntegerCondition),
}

/// Operating-system selector.
///
/// A selector with no flag set matches no agent at all, including agents
/// whose OS would otherwise match. That is the documented contract, not an
/// oversight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsSelector {
    #[serde(default)]
    pub windows: bool,
    #[serde(default)]
    pub linux: bool,
    #[serde(default)]
    pub darwin: bool,
}

/// Membership test applied to a label condition's name list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelMatchMode {
    /// At least one listed label is present.
    Any,
    /// Every listed label is present.
    All,
    /// Exact negation of `Any`.
    NotAny,
    /// Exact negation of `All`.
    NotAll,
}

/// Label membership condition over the snapshot's label names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelCondition {
    pub names: Vec<String>,
    pub mode: LabelMatchMode,
}

/// Unanchored regex search over a string field's values. Multi-valued
/// fields match when any value matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegexCondition {
    /// Field to search; evaluation fails when unset or unknown.
    #[serde(default)]
    pub field: Option<String>,
    pub pattern: String,
}

/// Integer comparison against a numeric field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegerCondition {
    /// Field to compare; evaluation fails when unset or unknown.
    #[serde(default)]
    pub field: Option<String>,
    pub op: IntegerOp,
    pub value: i64,
}

/// Comparison operators for [`IntegerCondition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegerOp {
    Equal,
    LessThan,
    GreaterThan,
}

/// What a matching rule does to the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleAction {
    /// Start a flow directly on the agent.
    StartFlow { flow: FlowSpec },
    /// Enroll the agent into a hunt.
    Hunt { hunt_id: String },
}

/// A dispatch rule: condition tree, bound action, and expiry.
///
/// Immutable once created except for the enabled flag; removed by explicit
/// deletion or expiry pruning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRule {
    pub id: String,
    pub owner: String,
    pub created: DateTime<Utc>,
    pub expires: DateTime<Utc>,
    pub enabled: bool,
    pub ruleset: RuleSet,
    pub action: RuleAction,
}

impl TaskRule {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires
    }

    /// The hunt this rule feeds, when its action is hunt enrollment.
    pub fn hunt_id(&self) -> Option<&str> {
        match &self.action {
            RuleAction::Hunt { hunt_id } => Some(hunt_id.as_str()),
            RuleAction::StartFlow { .. } => None,
        }
    }
}

/// Parameters for creating a rule. The foreman assigns the id and creation
/// time; new rules start enabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRule {
    pub owner: String,
    pub expires: DateTime<Utc>,
    pub ruleset: RuleSet,
    pub action: RuleAction,
}
