//! End-to-end dispatch scenarios over a small mixed fleet.

use std::sync::Arc;

use chrono::{Duration, Utc};
use drover_core::flow::FlowSpec;
use drover_core::memory::{MemoryAgentStore, MemoryFlowEngine, MemoryHuntRegistry};
use drover_core::snapshot::{AgentLabel, AgentSnapshot, OsFamily};
use drover_foreman::{
    Foreman, LabelCondition, LabelMatchMode, MemoryDispatchLedger, MemoryRuleStore, NewRule,
    OsSelector, RegexCondition, RuleAction, RuleCondition, RuleSet,
};

struct Fleet {
    foreman: Foreman,
    flows: Arc<MemoryFlowEngine>,
    hunts: Arc<MemoryHuntRegistry>,
}

const AGENTS: &[&str] = &["A.web", "A.db", "A.laptop"];

fn fleet() -> Fleet {
    let agents = Arc::new(MemoryAgentStore::new());
    let flows = Arc::new(MemoryFlowEngine::new());
    let hunts = Arc::new(MemoryHuntRegistry::new());
    let foreman = Foreman::new(
        Arc::new(MemoryRuleStore::new()),
        Arc::new(MemoryDispatchLedger::new()),
        agents.clone(),
        flows.clone(),
        hunts.clone(),
    );

    let mut web = AgentSnapshot::new("A.web", OsFamily::Linux);
    web.fqdn = "web-01.prod.example.com".to_string();
    web.labels = vec![AgentLabel::new("prod", "admin")];
    agents.upsert(web);

    let mut db = AgentSnapshot::new("A.db", OsFamily::Windows);
    db.fqdn = "db-01.prod.example.com".to_string();
    db.labels = vec![AgentLabel::new("prod", "admin")];
    agents.upsert(db);

    let mut laptop = AgentSnapshot::new("A.laptop", OsFamily::Darwin);
    laptop.fqdn = "laptop-9.corp.example.com".to_string();
    agents.upsert(laptop);

    Fleet {
        foreman,
        flows,
        hunts,
    }
}

async fn pass_over_fleet(fleet: &Fleet) {
    for agent_id in AGENTS {
        fleet.foreman.assign_tasks_to_client(agent_id).await.unwrap();
    }
}

// ── OS-gated flow dispatch ──────────────────────────────────────────

#[tokio::test]
async fn linux_interrogate_rule_reaches_only_linux_agents() {
    let fleet = fleet();
    fleet
        .foreman
        .create_rule(NewRule {
            owner: "admin".to_string(),
            expires: Utc::now() + Duration::days(7),
            ruleset: RuleSet::match_all(vec![RuleCondition::Os(OsSelector {
                linux: true,
                ..OsSelector::default()
            })]),
            action: RuleAction::StartFlow {
                flow: FlowSpec::new("Interrogate"),
            },
        })
        .unwrap();

    pass_over_fleet(&fleet).await;
    pass_over_fleet(&fleet).await;

    let started = fleet.flows.started();
    assert_eq!(started.len(), 1);
    assert_eq!(started[0].agent_id, "A.web");
    assert_eq!(started[0].flow.name, "Interrogate");
}

// ── Label-gated hunt enrollment ─────────────────────────────────────

#[tokio::test]
async fn prod_hunt_collects_every_prod_agent_once() {
    let fleet = fleet();
    fleet
        .foreman
        .create_rule(NewRule {
            owner: "admin".to_string(),
            expires: Utc::now() + Duration::days(7),
            ruleset: RuleSet::match_any(vec![RuleCondition::Label(LabelCondition {
                names: vec!["prod".to_string()],
                mode: LabelMatchMode::Any,
            })]),
            action: RuleAction::Hunt {
                hunt_id: "H.prod".to_string(),
            },
        })
        .unwrap();

    pass_over_fleet(&fleet).await;
    pass_over_fleet(&fleet).await;

    let mut enrolled = fleet.hunts.enrollments();
    enrolled.sort();
    assert_eq!(
        enrolled,
        vec![
            ("H.prod".to_string(), "A.db".to_string()),
            ("H.prod".to_string(), "A.web".to_string()),
        ]
    );
}

// ── Regex targeting ─────────────────────────────────────────────────

#[tokio::test]
async fn corp_domain_rule_targets_corp_hosts_only() {
    let fleet = fleet();
    fleet
        .foreman
        .create_rule(NewRule {
            owner: "dfir".to_string(),
            expires: Utc::now() + Duration::days(7),
            ruleset: RuleSet::match_all(vec![RuleCondition::Regex(RegexCondition {
                field: Some("fqdn".to_string()),
                pattern: r"\.corp\.".to_string(),
            })]),
            action: RuleAction::StartFlow {
                flow: FlowSpec::new("CollectBrowserHistory"),
            },
        })
        .unwrap();

    pass_over_fleet(&fleet).await;

    let started = fleet.flows.started();
    assert_eq!(started.len(), 1);
    assert_eq!(started[0].agent_id, "A.laptop");
}

// ── Expiry across a fleet ───────────────────────────────────────────

#[tokio::test]
async fn expired_hunt_rule_notifies_once_despite_many_agents() {
    let fleet = fleet();
    let rule = fleet
        .foreman
        .create_rule(NewRule {
            owner: "admin".to_string(),
            expires: Utc::now() + Duration::hours(1),
            ruleset: RuleSet::match_all(vec![]),
            action: RuleAction::Hunt {
                hunt_id: "H.sweep".to_string(),
            },
        })
        .unwrap();

    // Every agent checks in after the rule has lapsed; the first pass
    // prunes it, the rest find nothing.
    let later = Utc::now() + Duration::hours(2);
    for agent_id in AGENTS {
        fleet
            .foreman
            .assign_tasks_to_client_at(agent_id, later)
            .await
            .unwrap();
    }

    assert_eq!(
        fleet.hunts.expired_rules(),
        vec![("H.sweep".to_string(), rule.id)]
    );
    assert!(fleet.hunts.enrollments().is_empty());
}
