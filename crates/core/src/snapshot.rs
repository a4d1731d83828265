//! Per-check-in agent state visible to rule evaluation.
//!
//! A snapshot is produced by the agent-reporting collaborator at every
//! check-in and is read-only to the control plane. Rule conditions address
//! its contents through the field-lookup methods rather than the struct
//! fields, so free-form attributes and first-class fields resolve the same
//! way.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Operating-system family reported by an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OsFamily {
    Windows,
    Linux,
    Darwin,
}

impl OsFamily {
    /// Canonical lowercase name, also the value of the `os` rule field.
    pub fn name(&self) -> &'static str {
        match self {
            OsFamily::Windows => "windows",
            OsFamily::Linux => "linux",
            OsFamily::Darwin => "darwin",
        }
    }
}

impl std::fmt::Display for OsFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// An owner-tagged label attached to an agent.
///
/// Labels are multi-valued; rule matching goes by name, the owner records
/// which administrator (or the agent itself) attached it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentLabel {
    pub name: String,
    pub owner: String,
}

impl AgentLabel {
    pub fn new(name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
        }
    }
}

/// Immutable view of one agent as of its latest check-in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub agent_id: String,
    pub os: OsFamily,
    pub hostname: String,
    pub fqdn: String,
    pub os_version: String,
    #[serde(default)]
    pub labels: Vec<AgentLabel>,
    #[serde(default)]
    pub users: Vec<String>,
    pub install_time: DateTime<Utc>,
    pub last_boot: DateTime<Utc>,
    /// Free-form multi-valued string attributes reported by the agent.
    #[serde(default)]
    pub string_attrs: IndexMap<String, Vec<String>>,
    /// Free-form numeric attributes reported by the agent.
    #[serde(default)]
    pub integer_attrs: IndexMap<String, i64>,
}

impl AgentSnapshot {
    /// Create a minimal snapshot; callers fill in the fields they report.
    pub fn new(agent_id: impl Into<String>, os: OsFamily) -> Self {
        let now = Utc::now();
        Self {
            agent_id: agent_id.into(),
            os,
            hostname: String::new(),
            fqdn: String::new(),
            os_version: String::new(),
            labels: Vec::new(),
            users: Vec::new(),
            install_time: now,
            last_boot: now,
            string_attrs: IndexMap::new(),
            integer_attrs: IndexMap::new(),
        }
    }

    /// Whether any attached label carries this name, regardless of owner.
    pub fn has_label(&self, name: &str) -> bool {
        self.labels.iter().any(|l| l.name == name)
    }

    // ── Rule-visible field lookup ───────────────────────────────────

    /// All values of a string field, `None` when the name is unknown.
    ///
    /// First-class fields (`hostname`, `fqdn`, `os`, `os_version`, `labels`,
    /// `users`) shadow free-form attributes of the same name.
    pub fn string_values(&self, field: &str) -> Option<Vec<&str>> {
        match field {
            "hostname" => Some(vec![self.hostname.as_str()]),
            "fqdn" => Some(vec![self.fqdn.as_str()]),
            "os" => Some(vec![self.os.name()]),
            "os_version" => Some(vec![self.os_version.as_str()]),
            "labels" => Some(self.labels.iter().map(|l| l.name.as_str()).collect()),
            "users" => Some(self.users.iter().map(String::as_str).collect()),
            other => self
                .string_attrs
                .get(other)
                .map(|vs| vs.iter().map(String::as_str).collect()),
        }
    }

    /// The value of a numeric field, `None` when the name is unknown.
    ///
    /// `install_time` and `last_boot` resolve to epoch seconds.
    pub fn integer_value(&self, field: &str) -> Option<i64> {
        match field {
            "install_time" => Some(self.install_time.timestamp()),
            "last_boot" => Some(self.last_boot.timestamp()),
            other => self.integer_attrs.get(other).copied(),
        }
    }
}
