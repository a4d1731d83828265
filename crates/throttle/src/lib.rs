//! Admission control for flow-creation requests.
//!
//! This crate provides:
//! - [`FlowSignature`](signature::FlowSignature): canonical request
//!   identity (flow name + key-order-insensitive arguments)
//! - The append-only [`ThrottleLog`](log::ThrottleLog) seam with an
//!   in-memory implementation
//! - The [`Throttler`](throttler::Throttler): per-(agent, user) daily
//!   quota and duplicate-submission suppression, both independently
//!   disabled by a zero threshold

pub mod error;
pub mod log;
pub mod signature;
pub mod throttler;

pub use error::ThrottleError;
pub use log::{MemoryThrottleLog, ThrottleLog, ThrottleRecord};
pub use signature::FlowSignature;
pub use throttler::Throttler;
