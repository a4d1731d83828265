//! Pure condition and ruleset evaluation against agent snapshots.
//!
//! Evaluation is side-effect free and deterministic: the same rule against
//! the same snapshot always produces the same verdict. Failures are
//! confined to malformed rules ([`InvalidRuleError`]) and surface per rule,
//! so one bad rule never poisons a pass over the others.

use drover_core::snapshot::{AgentSnapshot, OsFamily};
use regex::Regex;

use crate::error::InvalidRuleError;
use crate::schema::{
    IntegerCondition, IntegerOp, LabelCondition, LabelMatchMode, MatchMode, OsSelector,
    RegexCondition, RuleCondition, RuleSet,
};

/// Compile a condition pattern, mapping failure to the rule error.
///
/// Shared between evaluation and create-time validation.
pub(crate) fn compile_pattern(pattern: &str) -> Result<Regex, InvalidRuleError> {
    Regex::new(pattern).map_err(|e| InvalidRuleError::BadPattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

impl RuleCondition {
    /// Evaluate this condition against one snapshot.
    pub fn evaluate(&self, snapshot: &AgentSnapshot) -> Result<bool, InvalidRuleError> {
        match self {
            RuleCondition::Os(sel) => Ok(sel.matches(snapshot)),
            RuleCondition::Label(cond) => Ok(cond.matches(snapshot)),
            RuleCondition::Regex(cond) => cond.matches(snapshot),
            RuleCondition::Integer(cond) => cond.matches(snapshot),
        }
    }
}

impl OsSelector {
    fn matches(&self, snapshot: &AgentSnapshot) -> bool {
        match snapshot.os {
            OsFamily::Windows => self.windows,
            OsFamily::Linux => self.linux,
            OsFamily::Darwin => self.darwin,
        }
    }
}

impl LabelCondition {
    fn matches(&self, snapshot: &AgentSnapshot) -> bool {
        let present = |name: &String| snapshot.has_label(name);
        match self.mode {
            LabelMatchMode::Any => self.names.iter().any(present),
            LabelMatchMode::All => self.names.iter().all(present),
            LabelMatchMode::NotAny => !self.names.iter().any(present),
            LabelMatchMode::NotAll => !self.names.iter().all(present),
        }
    }
}

impl RegexCondition {
    fn matches(&self, snapshot: &AgentSnapshot) -> Result<bool, InvalidRuleError> {
        let field = self
            .field
            .as_deref()
            .filter(|f| !f.is_empty())
            .ok_or(InvalidRuleError::FieldUnset)?;
        let values = snapshot
            .string_values(field)
            .ok_or_else(|| InvalidRuleError::UnknownField {
                field: field.to_string(),
            })?;
        let re = compile_pattern(&self.pattern)?;
        Ok(values.iter().any(|v| re.is_match(v)))
    }
}

impl IntegerCondition {
    fn matches(&self, snapshot: &AgentSnapshot) -> Result<bool, InvalidRuleError> {
        let field = self
            .field
            .as_deref()
            .filter(|f| !f.is_empty())
            .ok_or(InvalidRuleError::FieldUnset)?;
        let actual = snapshot
            .integer_value(field)
            .ok_or_else(|| InvalidRuleError::UnknownField {
                field: field.to_string(),
            })?;
        Ok(match self.op {
            IntegerOp::Equal => actual == self.value,
            IntegerOp::LessThan => actual < self.value,
            IntegerOp::GreaterThan => actual > self.value,
        })
    }
}

impl RuleSet {
    /// Evaluate the whole ruleset. Member errors propagate and fail the
    /// ruleset; evaluation short-circuits in condition order.
    pub fn evaluate(&self, snapshot: &AgentSnapshot) -> Result<bool, InvalidRuleError> {
        match self.match_mode {
            MatchMode::MatchAny => {
                for condition in &self.conditions {
                    if condition.evaluate(snapshot)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            MatchMode::MatchAll => {
                for condition in &self.conditions {
                    if !condition.evaluate(snapshot)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono::Utc;
    use drover_core::snapshot::AgentLabel;

    fn linux_snapshot() -> AgentSnapshot {
        let mut snap = AgentSnapshot::new("A.linux", OsFamily::Linux);
        snap.hostname = "build-01".to_string();
        snap.fqdn = "build-01.corp.example.com".to_string();
        snap.os_version = "6.1.0".to_string();
        snap.labels = vec![
            AgentLabel::new("frontend", "admin"),
            AgentLabel::new("canary", "admin"),
        ];
        snap.users = vec!["root".to_string(), "deploy".to_string()];
        snap.install_time = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        snap.integer_attrs.insert("memory_mb".to_string(), 8192);
        snap
    }

    fn os(windows: bool, linux: bool, darwin: bool) -> RuleCondition {
        RuleCondition::Os(OsSelector {
            windows,
            linux,
            darwin,
        })
    }

    fn label(mode: LabelMatchMode, names: &[&str]) -> RuleCondition {
        RuleCondition::Label(LabelCondition {
            names: names.iter().map(|n| n.to_string()).collect(),
            mode,
        })
    }

    fn regex(field: Option<&str>, pattern: &str) -> RuleCondition {
        RuleCondition::Regex(RegexCondition {
            field: field.map(str::to_string),
            pattern: pattern.to_string(),
        })
    }

    fn integer(field: Option<&str>, op: IntegerOp, value: i64) -> RuleCondition {
        RuleCondition::Integer(IntegerCondition {
            field: field.map(str::to_string),
            op,
            value,
        })
    }

    // ── OS selector ─────────────────────────────────────────────────

    #[test]
    fn os_selector_matches_selected_family() {
        let snap = linux_snapshot();
        assert!(os(false, true, false).evaluate(&snap).unwrap());
        assert!(os(true, true, true).evaluate(&snap).unwrap());
        assert!(!os(true, false, true).evaluate(&snap).unwrap());
    }

    #[test]
    fn os_selector_with_no_flags_matches_nothing() {
        // The all-false selector is a match-nothing rule even for agents
        // whose OS flag would otherwise line up.
        let snap = linux_snapshot();
        assert!(!os(false, false, false).evaluate(&snap).unwrap());
    }

    // ── Labels ──────────────────────────────────────────────────────

    #[test]
    fn label_any_needs_one_present() {
        let snap = linux_snapshot();
        assert!(label(LabelMatchMode::Any, &["canary", "missing"])
            .evaluate(&snap)
            .unwrap());
        assert!(!label(LabelMatchMode::Any, &["missing", "also-missing"])
            .evaluate(&snap)
            .unwrap());
    }

    #[test]
    fn label_all_needs_every_one_present() {
        let snap = linux_snapshot();
        assert!(label(LabelMatchMode::All, &["canary", "frontend"])
            .evaluate(&snap)
            .unwrap());
        assert!(!label(LabelMatchMode::All, &["canary", "missing"])
            .evaluate(&snap)
            .unwrap());
    }

    #[test]
    fn negated_label_modes_are_exact_complements() {
        let snap = linux_snapshot();
        let name_lists: &[&[&str]] = &[
            &[],
            &["canary"],
            &["missing"],
            &["canary", "missing"],
            &["canary", "frontend"],
        ];
        for names in name_lists {
            let any = label(LabelMatchMode::Any, names).evaluate(&snap).unwrap();
            let not_any = label(LabelMatchMode::NotAny, names).evaluate(&snap).unwrap();
            let all = label(LabelMatchMode::All, names).evaluate(&snap).unwrap();
            let not_all = label(LabelMatchMode::NotAll, names).evaluate(&snap).unwrap();
            assert_eq!(not_any, !any, "names: {names:?}");
            assert_eq!(not_all, !all, "names: {names:?}");
        }
    }

    // ── Regex ───────────────────────────────────────────────────────

    #[test]
    fn regex_is_substring_search() {
        let snap = linux_snapshot();
        assert!(regex(Some("fqdn"), "corp").evaluate(&snap).unwrap());
        assert!(regex(Some("fqdn"), "^build").evaluate(&snap).unwrap());
        assert!(!regex(Some("fqdn"), "warehouse").evaluate(&snap).unwrap());
    }

    #[test]
    fn regex_matches_any_value_of_multivalued_field() {
        let snap = linux_snapshot();
        assert!(regex(Some("labels"), "^can").evaluate(&snap).unwrap());
        assert!(regex(Some("users"), "deploy").evaluate(&snap).unwrap());
        assert!(!regex(Some("labels"), "backend").evaluate(&snap).unwrap());
    }

    #[test]
    fn regex_without_field_is_invalid() {
        let snap = linux_snapshot();
        assert_eq!(
            regex(None, "x").evaluate(&snap).unwrap_err(),
            InvalidRuleError::FieldUnset
        );
        assert_eq!(
            regex(Some(""), "x").evaluate(&snap).unwrap_err(),
            InvalidRuleError::FieldUnset
        );
    }

    #[test]
    fn regex_on_unknown_field_is_invalid() {
        let snap = linux_snapshot();
        assert!(matches!(
            regex(Some("serial_number"), "x").evaluate(&snap),
            Err(InvalidRuleError::UnknownField { .. })
        ));
    }

    #[test]
    fn regex_bad_pattern_is_invalid() {
        let snap = linux_snapshot();
        assert!(matches!(
            regex(Some("fqdn"), "[unclosed").evaluate(&snap),
            Err(InvalidRuleError::BadPattern { .. })
        ));
    }

    // ── Integer ─────────────────────────────────────────────────────

    #[test]
    fn integer_comparisons() {
        let snap = linux_snapshot();
        assert!(integer(Some("memory_mb"), IntegerOp::Equal, 8192)
            .evaluate(&snap)
            .unwrap());
        assert!(integer(Some("memory_mb"), IntegerOp::LessThan, 10_000)
            .evaluate(&snap)
            .unwrap());
        assert!(!integer(Some("memory_mb"), IntegerOp::GreaterThan, 10_000)
            .evaluate(&snap)
            .unwrap());
    }

    #[test]
    fn integer_on_timestamp_fields_uses_epoch_seconds() {
        let snap = linux_snapshot();
        let cutoff = Utc
            .with_ymd_and_hms(2024, 6, 1, 0, 0, 0)
            .unwrap()
            .timestamp();
        assert!(integer(Some("install_time"), IntegerOp::LessThan, cutoff)
            .evaluate(&snap)
            .unwrap());
    }

    #[test]
    fn integer_without_field_or_on_unknown_field_is_invalid() {
        let snap = linux_snapshot();
        assert_eq!(
            integer(None, IntegerOp::Equal, 1).evaluate(&snap).unwrap_err(),
            InvalidRuleError::FieldUnset
        );
        assert!(matches!(
            integer(Some("cpu_count"), IntegerOp::Equal, 1).evaluate(&snap),
            Err(InvalidRuleError::UnknownField { .. })
        ));
    }

    // ── RuleSet combination ─────────────────────────────────────────

    #[test]
    fn empty_match_any_is_false() {
        let snap = linux_snapshot();
        assert!(!RuleSet::match_any(vec![]).evaluate(&snap).unwrap());
    }

    #[test]
    fn empty_match_all_is_true() {
        let snap = linux_snapshot();
        assert!(RuleSet::match_all(vec![]).evaluate(&snap).unwrap());
    }

    #[test]
    fn match_any_and_match_all_combine_members() {
        let snap = linux_snapshot();
        let one_true = vec![os(false, true, false), os(true, false, false)];
        assert!(RuleSet::match_any(one_true.clone()).evaluate(&snap).unwrap());
        assert!(!RuleSet::match_all(one_true).evaluate(&snap).unwrap());

        let both_true = vec![os(false, true, false), label(LabelMatchMode::Any, &["canary"])];
        assert!(RuleSet::match_all(both_true).evaluate(&snap).unwrap());
    }

    #[test]
    fn member_error_fails_the_ruleset() {
        let snap = linux_snapshot();
        let ruleset = RuleSet::match_all(vec![os(false, true, false), regex(None, "x")]);
        assert!(matches!(
            ruleset.evaluate(&snap),
            Err(InvalidRuleError::FieldUnset)
        ));
    }

    // ── Wire shape ──────────────────────────────────────────────────

    #[test]
    fn conditions_deserialize_from_tagged_json() {
        let condition: RuleCondition = serde_json::from_value(serde_json::json!({
            "type": "regex",
            "field": "fqdn",
            "pattern": "corp",
        }))
        .unwrap();
        let snap = linux_snapshot();
        assert!(condition.evaluate(&snap).unwrap());

        // Omitted OS flags default to false, which keeps the match-nothing
        // selector representable as just {"type": "os"}.
        let condition: RuleCondition =
            serde_json::from_value(serde_json::json!({"type": "os"})).unwrap();
        assert!(!condition.evaluate(&snap).unwrap());
    }
}
