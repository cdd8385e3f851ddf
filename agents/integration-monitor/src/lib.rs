//! Integration Monitor
//!
//! Cyclic health monitoring for external integrations. Every cycle the
//! scheduler probes each registered integration, scores the result, keeps the
//! latest record per integration and decides whether to fail over or alert.
//!
//! # Components
//! - `scheduler` - lifecycle and fixed-cadence loop
//! - `engine` - health evaluation and the default probers
//! - `store` - current record per integration
//! - `dispatch` - failover and alert decisions
//! - `aggregate` - rate-limited system metrics
//! - `broadcast` - real-time health updates
//! - `handler` - read-only HTTP status API

pub mod aggregate;
pub mod broadcast;
pub mod client;
pub mod collaborators;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod handler;
pub mod history;
pub mod registry;
pub mod scheduler;
pub mod store;
pub mod telemetry;

// Re-export contracts
#[path = "../contracts/mod.rs"]
pub mod contracts;

pub use config::{FailoverPolicy, MonitorConfig};
pub use contracts::*;
pub use error::{MonitorError, Result};
pub use scheduler::{MonitorScheduler, MonitorSchedulerBuilder};
