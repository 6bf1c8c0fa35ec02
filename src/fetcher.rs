//! Resilient TVL fetcher.
//!
//! Free blockchain-data APIs rate-limit, time out, and occasionally return
//! nonsense (a zero TVL, a figure off by orders of magnitude). The fetcher
//! hides that behind one call that always answers:
//!
//! 1. a manual override, if an operator set one;
//! 2. otherwise the first source, in priority order, whose value arrives
//!    within the retry budget and passes validation;
//! 3. otherwise the last validated value, or zero if there never was one.
//!
//! The returned `ReadingSource` tells the caller which of these happened.
//!
//! State is not synchronised. Hosts that share a fetcher between threads
//! must wrap it in a `Mutex`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::FetcherConfig;
use crate::ingest::ValueSource;
use crate::logging;
use crate::model::{FetchError, MetricReading, ReadingSource, ValidationFailure};
use crate::retry::{RetryPolicy, Sleeper, ThreadSleeper};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Everything the fetcher remembers between calls.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct FetcherState {
    /// Only ever replaced by a newer validated reading; never cleared.
    pub last_known_good: Option<f64>,
    pub last_good_at: Option<DateTime<Utc>>,
    /// Cycles in a row in which no source produced a valid value.
    pub consecutive_failures: u32,
    pub manual_override: Option<f64>,
    pub success_counts: BTreeMap<String, u64>,
    pub failure_counts: BTreeMap<String, u64>,
}

/// Snapshot of the fetcher for a health display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetcherHealth {
    pub consecutive_failures: u32,
    pub failure_ceiling: u32,
    pub last_known_good: Option<f64>,
    pub last_good_at: Option<DateTime<Utc>>,
    pub manual_override: Option<f64>,
    pub success_counts: BTreeMap<String, u64>,
    pub failure_counts: BTreeMap<String, u64>,
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

pub struct ResilientValueFetcher<Z: Sleeper = ThreadSleeper> {
    sources: Vec<Box<dyn ValueSource>>,
    policy: RetryPolicy,
    max_relative_deviation: f64,
    failure_ceiling: u32,
    sleeper: Z,
    state: FetcherState,
}

impl ResilientValueFetcher<ThreadSleeper> {
    pub fn new(sources: Vec<Box<dyn ValueSource>>, config: &FetcherConfig) -> Self {
        Self::with_sleeper(sources, config, ThreadSleeper)
    }
}

impl<Z: Sleeper> ResilientValueFetcher<Z> {
    pub fn with_sleeper(sources: Vec<Box<dyn ValueSource>>, config: &FetcherConfig, sleeper: Z) -> Self {
        Self {
            sources,
            policy: config.retry_policy(),
            max_relative_deviation: config.max_relative_deviation,
            failure_ceiling: config.failure_ceiling,
            sleeper,
            state: FetcherState::default(),
        }
    }

    /// Returns the current value. Never fails; inspect `source` for trust.
    pub fn get_value(&mut self) -> MetricReading {
        if let Some(value) = self.state.manual_override {
            return MetricReading::new(value, ReadingSource::ManualOverride);
        }

        for index in 0..self.sources.len() {
            match self.try_source(index) {
                Ok(value) => {
                    let name = self.sources[index].name().to_string();
                    self.record_success(&name, value);
                    return MetricReading::new(value, ReadingSource::Live(name));
                }
                Err(_) => {
                    let name = self.sources[index].name().to_string();
                    *self.state.failure_counts.entry(name).or_insert(0) += 1;
                }
            }
        }

        self.fall_back()
    }

    /// `true` if `candidate` is plausible given the last known good value.
    pub fn validate(&self, candidate: f64) -> bool {
        self.check_candidate(candidate).is_ok()
    }

    /// Same as `validate`, with the reason for rejection.
    pub fn check_candidate(&self, candidate: f64) -> Result<(), ValidationFailure> {
        check_plausible(candidate, self.state.last_known_good, self.max_relative_deviation)
    }

    /// Sets (`Some`) or clears (`None`) the operator override.
    pub fn set_manual_override(&mut self, value: Option<f64>) -> Result<(), FetchError> {
        match value {
            Some(v) if !v.is_finite() || v < 0.0 => Err(FetchError::InvalidOverride(v)),
            Some(v) => {
                logging::override_set(v);
                self.state.manual_override = Some(v);
                Ok(())
            }
            None => {
                if self.state.manual_override.take().is_some() {
                    logging::override_cleared();
                }
                Ok(())
            }
        }
    }

    pub fn manual_override(&self) -> Option<f64> {
        self.state.manual_override
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.state.consecutive_failures
    }

    pub fn success_counts(&self) -> &BTreeMap<String, u64> {
        &self.state.success_counts
    }

    pub fn failure_counts(&self) -> &BTreeMap<String, u64> {
        &self.state.failure_counts
    }

    pub fn last_known_good(&self) -> Option<f64> {
        self.state.last_known_good
    }

    pub fn is_degraded(&self) -> bool {
        self.state.consecutive_failures >= self.failure_ceiling
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn sleeper(&self) -> &Z {
        &self.sleeper
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    pub fn health(&self) -> FetcherHealth {
        FetcherHealth {
            consecutive_failures: self.state.consecutive_failures,
            failure_ceiling: self.failure_ceiling,
            last_known_good: self.state.last_known_good,
            last_good_at: self.state.last_good_at,
            manual_override: self.state.manual_override,
            success_counts: self.state.success_counts.clone(),
            failure_counts: self.state.failure_counts.clone(),
        }
    }

    // -- internals ----------------------------------------------------------

    /// Fetches from one source under the retry policy, then validates.
    fn try_source(&self, index: usize) -> Result<f64, FetchError> {
        let source = &self.sources[index];
        let name = source.name();

        let outcome = self.policy.run(
            &self.sleeper,
            || source.fetch(),
            |attempt, err| logging::log_attempt_failure(name, attempt, self.policy.max_attempts, err),
        );

        let candidate = match outcome.result {
            Ok(candidate) => candidate,
            Err(err) => {
                logging::log_source_exhausted(name, outcome.attempts, &err);
                return Err(err);
            }
        };

        if let Err(reason) = self.check_candidate(candidate) {
            logging::log_validation_rejection(name, candidate, &reason);
            return Err(FetchError::Validation(reason));
        }
        Ok(candidate)
    }

    fn record_success(&mut self, name: &str, value: f64) {
        *self.state.success_counts.entry(name.to_string()).or_insert(0) += 1;
        if self.state.consecutive_failures > 0 {
            logging::log_recovery(name, self.state.consecutive_failures);
        }
        self.state.consecutive_failures = 0;
        self.state.last_known_good = Some(value);
        self.state.last_good_at = Some(Utc::now());
    }

    fn fall_back(&mut self) -> MetricReading {
        self.state.consecutive_failures += 1;
        let failures = self.state.consecutive_failures;
        if failures >= self.failure_ceiling {
            logging::log_degraded(failures, self.failure_ceiling);
        }

        let reading = match self.state.last_known_good {
            Some(value) => MetricReading::new(value, ReadingSource::LastKnownGood),
            None => MetricReading::new(0.0, ReadingSource::DefaultZero),
        };
        logging::log_fallback(&reading, failures);
        reading
    }
}

/// Plausibility rule shared by the fetcher and the verification report.
///
/// Rejects negative and non-finite values. With a positive `last_known_good`,
/// also rejects a relative change above `max_relative_deviation`.
pub fn check_plausible(
    candidate: f64,
    last_known_good: Option<f64>,
    max_relative_deviation: f64,
) -> Result<(), ValidationFailure> {
    if !candidate.is_finite() {
        return Err(ValidationFailure::NotFinite);
    }
    if candidate < 0.0 {
        return Err(ValidationFailure::Negative(candidate));
    }
    if let Some(last) = last_known_good.filter(|last| *last > 0.0) {
        let deviation = (candidate - last).abs() / last;
        if deviation > max_relative_deviation {
            return Err(ValidationFailure::ImplausibleDeviation {
                candidate,
                last_known_good: last,
                deviation,
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dev_mode::{RecordingSleeper, ScriptedSource};
    use std::time::Duration;

    fn config() -> FetcherConfig {
        FetcherConfig {
            base_backoff_ms: 1_000,
            jitter_step_ms: 10,
            ..FetcherConfig::default()
        }
    }

    fn fetcher(sources: Vec<ScriptedSource>) -> ResilientValueFetcher<RecordingSleeper> {
        let boxed = sources
            .into_iter()
            .map(|s| Box::new(s) as Box<dyn ValueSource>)
            .collect();
        ResilientValueFetcher::with_sleeper(boxed, &config(), RecordingSleeper::default())
    }

    // --- validate -----------------------------------------------------------

    #[test]
    fn test_fresh_fetcher_accepts_any_non_negative_value() {
        let f = fetcher(vec![]);
        for candidate in [0.0, 1.0, 4.2e9, f64::MAX] {
            assert!(f.validate(candidate), "{} should be accepted", candidate);
        }
    }

    #[test]
    fn test_negative_and_nan_are_rejected() {
        let f = fetcher(vec![]);
        assert!(!f.validate(-0.01));
        assert!(!f.validate(f64::NAN));
        assert!(!f.validate(f64::INFINITY));
    }

    #[test]
    fn test_deviation_over_ninety_percent_is_rejected() {
        let mut f = fetcher(vec![ScriptedSource::always("a", 100.0)]);
        f.get_value();
        assert_eq!(f.last_known_good(), Some(100.0));

        assert!(f.validate(10.0), "exactly 90% down is allowed");
        assert!(f.validate(190.0), "exactly 90% up is allowed");
        assert!(!f.validate(9.99));
        assert!(!f.validate(190.01));
        assert!(!f.validate(0.0));
    }

    #[test]
    fn test_zero_last_known_good_does_not_block_recovery() {
        let mut f = fetcher(vec![ScriptedSource::always("a", 0.0)]);
        assert_eq!(f.get_value(), MetricReading::new(0.0, ReadingSource::live("a")));
        assert!(f.validate(5.0e8));
    }

    // --- override -----------------------------------------------------------

    #[test]
    fn test_override_wins_on_every_call_until_cleared() {
        let source = ScriptedSource::always("a", 100.0);
        let calls = source.calls_handle();
        let mut f = fetcher(vec![source]);

        f.set_manual_override(Some(42.0)).unwrap();
        for _ in 0..3 {
            assert_eq!(f.get_value(), MetricReading::new(42.0, ReadingSource::ManualOverride));
        }
        assert_eq!(calls.get(), 0, "override must bypass sources");

        f.set_manual_override(None).unwrap();
        assert_eq!(f.get_value(), MetricReading::new(100.0, ReadingSource::live("a")));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_override_leaves_counters_alone() {
        let mut f = fetcher(vec![ScriptedSource::failing("a", FetchError::Timeout)]);
        f.get_value();
        f.set_manual_override(Some(1.0)).unwrap();
        f.get_value();
        assert_eq!(f.consecutive_failures(), 1);
        assert_eq!(f.last_known_good(), None);
    }

    #[test]
    fn test_negative_override_is_refused() {
        let mut f = fetcher(vec![]);
        assert_eq!(f.set_manual_override(Some(-5.0)), Err(FetchError::InvalidOverride(-5.0)));
        assert!(f.set_manual_override(Some(f64::NAN)).is_err());
        assert_eq!(f.manual_override(), None);
    }

    // --- source ordering ----------------------------------------------------

    #[test]
    fn test_first_source_success_skips_the_rest() {
        let b = ScriptedSource::always("b", 7.0);
        let b_calls = b.calls_handle();
        let mut f = fetcher(vec![ScriptedSource::always("a", 5.0), b]);

        assert_eq!(f.get_value(), MetricReading::new(5.0, ReadingSource::live("a")));
        assert_eq!(b_calls.get(), 0);
        assert_eq!(f.success_counts().get("a"), Some(&1));
        assert_eq!(f.success_counts().get("b"), None);
        assert!(f.sleeper().waits().is_empty());
    }

    #[test]
    fn test_falls_through_to_second_source_after_retries() {
        let a = ScriptedSource::failing("a", FetchError::HttpStatus(503));
        let a_calls = a.calls_handle();
        let mut f = fetcher(vec![a, ScriptedSource::always("b", 7.0)]);

        assert_eq!(f.get_value(), MetricReading::new(7.0, ReadingSource::live("b")));
        assert_eq!(a_calls.get(), 3);
        assert_eq!(f.failure_counts().get("a"), Some(&1));
        assert_eq!(f.success_counts().get("b"), Some(&1));
        assert_eq!(f.consecutive_failures(), 0);
    }

    #[test]
    fn test_invalid_value_moves_to_next_source_without_retry() {
        let a = ScriptedSource::always("a", -1.0);
        let a_calls = a.calls_handle();
        let mut f = fetcher(vec![a, ScriptedSource::always("b", 3.0)]);

        assert_eq!(f.get_value(), MetricReading::new(3.0, ReadingSource::live("b")));
        assert_eq!(a_calls.get(), 1);
        assert_eq!(f.last_known_good(), Some(3.0));
    }

    #[test]
    fn test_implausible_jump_falls_back_to_last_known_good() {
        let mut f = fetcher(vec![ScriptedSource::sequence(
            "a",
            vec![Ok(1_000.0), Ok(5.0)],
        )]);
        f.get_value();
        let reading = f.get_value();
        assert_eq!(reading, MetricReading::new(1_000.0, ReadingSource::LastKnownGood));
        assert_eq!(f.last_known_good(), Some(1_000.0), "rejected value must not replace it");
        assert_eq!(f.consecutive_failures(), 1);
    }

    // --- fallback -----------------------------------------------------------

    #[test]
    fn test_all_failed_without_history_is_default_zero() {
        let mut f = fetcher(vec![
            ScriptedSource::failing("a", FetchError::Timeout),
            ScriptedSource::failing("b", FetchError::Parse("eof".into())),
        ]);
        assert_eq!(f.get_value(), MetricReading::new(0.0, ReadingSource::DefaultZero));
        assert_eq!(f.consecutive_failures(), 1);
        assert_eq!(f.last_known_good(), None);
    }

    #[test]
    fn test_all_failed_with_history_returns_last_known_good() {
        let mut f = fetcher(vec![ScriptedSource::sequence(
            "a",
            vec![
                Ok(250.0),
                Err(FetchError::Timeout),
                Err(FetchError::Timeout),
                Err(FetchError::Timeout),
            ],
        )]);
        f.get_value();
        let before = f.consecutive_failures();
        assert_eq!(f.get_value(), MetricReading::new(250.0, ReadingSource::LastKnownGood));
        assert_eq!(f.consecutive_failures(), before + 1);
    }

    #[test]
    fn test_failure_count_resets_on_success() {
        let mut script = vec![Err(FetchError::Timeout); 6];
        script.push(Ok(10.0));
        let mut f = fetcher(vec![ScriptedSource::sequence("a", script)]);
        f.get_value();
        f.get_value();
        assert_eq!(f.consecutive_failures(), 2);
        assert_eq!(f.get_value().source, ReadingSource::live("a"));
        assert_eq!(f.consecutive_failures(), 0);
    }

    #[test]
    fn test_degraded_after_ceiling_cycles() {
        let mut f = fetcher(vec![ScriptedSource::failing("a", FetchError::Timeout)]);
        for cycle in 1..=5 {
            f.get_value();
            assert_eq!(f.consecutive_failures(), cycle);
            assert_eq!(f.is_degraded(), cycle >= 5);
        }
        // Still answers; still counts.
        assert_eq!(f.get_value().source, ReadingSource::DefaultZero);
        assert_eq!(f.consecutive_failures(), 6);
        assert!(f.health().consecutive_failures >= f.health().failure_ceiling);
    }

    // --- retry timing -------------------------------------------------------

    #[test]
    fn test_permanently_failing_source_waits_one_then_two() {
        let a = ScriptedSource::failing("a", FetchError::Timeout);
        let calls = a.calls_handle();
        let mut f = fetcher(vec![a]);
        f.get_value();
        assert_eq!(calls.get(), 3);
        assert_eq!(
            f.sleeper().waits(),
            vec![Duration::from_millis(1_000), Duration::from_millis(2_010)]
        );
    }

    #[test]
    fn test_healthy_source_gives_same_tag_twice() {
        let mut f = fetcher(vec![
            ScriptedSource::sequence("a", vec![Ok(100.0), Ok(101.0)]),
            ScriptedSource::always("b", 1.0),
        ]);
        let first = f.get_value();
        let second = f.get_value();
        assert_eq!(first.source, second.source);
        assert_eq!(f.success_counts().get("a"), Some(&2));
    }

    #[test]
    fn test_no_sources_behaves_as_all_failed() {
        let mut f = fetcher(vec![]);
        assert_eq!(f.get_value(), MetricReading::new(0.0, ReadingSource::DefaultZero));
        assert_eq!(f.consecutive_failures(), 1);
    }

    #[test]
    fn test_health_snapshot_reflects_state() {
        let mut f = fetcher(vec![ScriptedSource::always("a", 9.0)]);
        f.get_value();
        let health = f.health();
        assert_eq!(health.last_known_good, Some(9.0));
        assert!(health.last_good_at.is_some());
        assert_eq!(health.success_counts.get("a"), Some(&1));
        assert_eq!(health.failure_ceiling, 5);
        assert_eq!(f.source_names(), vec!["a"]);
    }
}
