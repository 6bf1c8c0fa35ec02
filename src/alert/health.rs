//! Fetcher health evaluation.
//!
//! A single failed cycle is routine for free public APIs. Persistent failure
//! means the dashboard is showing a frozen or zero TVL, which operators need
//! to know about even though the fetcher itself keeps answering.
//!
//! # Clock injection
//! `evaluate_at` takes `now` rather than calling `Utc::now()` so the age of
//! the last good reading is deterministic in tests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fetcher::FetcherHealth;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Last cycle produced a live reading, or an override is active.
    Healthy,
    /// Some recent cycles fell back, but below the ceiling.
    Recovering,
    /// Consecutive all-source failures reached the ceiling.
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub consecutive_failures: u32,
    pub failure_ceiling: u32,
    /// Minutes since the last validated reading, if there ever was one.
    pub last_good_age_minutes: Option<i64>,
    pub message: String,
}

pub fn evaluate_at(health: &FetcherHealth, now: DateTime<Utc>) -> HealthReport {
    let status = if health.manual_override.is_some() || health.consecutive_failures == 0 {
        HealthStatus::Healthy
    } else if health.consecutive_failures >= health.failure_ceiling {
        HealthStatus::Degraded
    } else {
        HealthStatus::Recovering
    };

    let last_good_age_minutes = health
        .last_good_at
        .map(|at| (now - at).num_minutes().max(0));

    let message = match status {
        HealthStatus::Healthy if health.manual_override.is_some() => {
            "Manual override active; automatic fetching is paused".to_string()
        }
        HealthStatus::Healthy => "All good".to_string(),
        HealthStatus::Recovering => format!(
            "{} consecutive cycle(s) without a live reading",
            health.consecutive_failures
        ),
        HealthStatus::Degraded => match last_good_age_minutes {
            Some(age) => format!(
                "Degraded: {} consecutive failed cycles, serving a value {} minute(s) old",
                health.consecutive_failures, age
            ),
            None => format!(
                "Degraded: {} consecutive failed cycles and no value ever fetched",
                health.consecutive_failures
            ),
        },
    };

    HealthReport {
        status,
        consecutive_failures: health.consecutive_failures,
        failure_ceiling: health.failure_ceiling,
        last_good_age_minutes,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap()
    }

    fn health(failures: u32, last_good_at: Option<DateTime<Utc>>) -> FetcherHealth {
        FetcherHealth {
            consecutive_failures: failures,
            failure_ceiling: 5,
            last_known_good: last_good_at.map(|_| 1.0e8),
            last_good_at,
            manual_override: None,
            success_counts: BTreeMap::new(),
            failure_counts: BTreeMap::new(),
        }
    }

    #[test]
    fn test_no_failures_is_healthy() {
        let report = evaluate_at(&health(0, None), fixed_now());
        assert_eq!(report.status, HealthStatus::Healthy);
    }

    #[test]
    fn test_below_ceiling_is_recovering() {
        let report = evaluate_at(&health(4, None), fixed_now());
        assert_eq!(report.status, HealthStatus::Recovering);
    }

    #[test]
    fn test_ceiling_reached_is_degraded_with_age() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 35, 0).unwrap();
        let report = evaluate_at(&health(5, Some(at)), fixed_now());
        assert_eq!(report.status, HealthStatus::Degraded);
        assert_eq!(report.last_good_age_minutes, Some(25));
        assert!(report.message.contains("25 minute"));
    }

    #[test]
    fn test_override_masks_failures() {
        let mut h = health(7, None);
        h.manual_override = Some(2.0e8);
        let report = evaluate_at(&h, fixed_now());
        assert_eq!(report.status, HealthStatus::Healthy);
        assert!(report.message.contains("override"));
    }
}
