//! Rule-driven task dispatch for checking-in agents.
//!
//! This crate provides:
//! - The dispatch rule schema: OS, label, regex, and integer condition
//!   leaves combined by match-any/match-all rulesets
//! - Pure, side-effect-free rule evaluation against agent snapshots
//! - `RuleStore` and `DispatchLedger` seams with in-memory implementations
//! - The [`Foreman`](dispatch::Foreman), which evaluates outstanding rules
//!   on every agent check-in and fires each matching rule's action at most
//!   once per rule generation

pub mod dispatch;
pub mod error;
pub mod evaluator;
pub mod schema;
pub mod store;

pub use dispatch::{AssignmentReport, Foreman};
pub use error::{ForemanError, InvalidRuleError};
pub use schema::{
    IntegerCondition, IntegerOp, LabelCondition, LabelMatchMode, MatchMode, NewRule, OsSelector,
    RegexCondition, RuleAction, RuleCondition, RuleSet, TaskRule,
};
pub use store::{DispatchLedger, MemoryDispatchLedger, MemoryRuleStore, RuleStore};
