//! Shared domain types and collaborator interfaces for the drover control plane.
//!
//! This crate defines:
//! - Agent snapshots (per check-in fleet state) with rule-visible field access
//! - Flow specifications (the unit of work handed to the execution tier)
//! - Collaborator traits the control plane depends on but does not implement
//!   (`FlowEngine`, `HuntRegistry`, `AgentStore`, `StatsRecorder`)
//! - In-memory collaborator implementations for tests and the worker
//! - Environment-driven configuration and the duration grammar it uses

pub mod config;
pub mod duration;
pub mod error;
pub mod flow;
pub mod memory;
pub mod snapshot;
pub mod traits;

pub use config::Config;
pub use error::*;
pub use flow::{FlowId, FlowSpec};
pub use snapshot::{AgentLabel, AgentSnapshot, OsFamily};
pub use traits::{AgentStore, FlowEngine, HuntRegistry, StatsRecorder};
