//! 健康监控模块：周期性探测各供应商并维护健康状态。
//!
//! # Health Monitoring Module
//!
//! Active probing of every registered provider. Each provider keeps a bounded
//! record of recent probes; the classification drives the service's decision to
//! skip a provider before any call is made.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`HealthMonitor`] | Per-provider probe tasks, records and change events |
//! | [`HealthRecord`] | Ring buffer of recent probes with derived status |
//! | [`HealthConfig`] | Interval, thresholds, window size and retention |
//!
//! Status ladder: `healthy` → `degraded` → `unhealthy`. A provider that has never
//! been probed is reported `healthy`.

mod monitor;
mod record;

pub use monitor::{HealthChangeEvent, HealthConfig, HealthMonitor};
pub use record::{HealthRecord, HealthStatus, ProbeOutcome};
