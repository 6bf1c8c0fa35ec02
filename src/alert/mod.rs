//! Alerting for the pool monitoring service.
//!
//! Submodules:
//! - `thresholds`: risk ratio threshold checks.
//! - `health`: degraded-health evaluation of the TVL fetcher.

pub mod health;
pub mod thresholds;
