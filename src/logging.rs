//! Structured logging for the pool monitoring service
//!
//! Provides context-rich logging with data source identifiers, attempt
//! numbers, and failure classification on top of `tracing`. Supports
//! console output and an append-only log file for daemon operations.

use std::fmt;
use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::model::{FailureKind, FetchError, MetricReading, ReadingSource, ValidationFailure};

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - rate limiting, brief timeouts on free endpoints
    Expected,
    /// Unexpected failure - server errors or payload changes that need a look
    Unexpected,
    /// Provider answered, but with a value that cannot be right
    Rejected,
    /// Unknown - cannot determine if this is expected or not
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Rejected => write!(f, "REJECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Classify a source failure by what it says about the provider.
pub fn classify_fetch_failure(err: &FetchError) -> FailureType {
    match err {
        FetchError::Timeout | FetchError::HttpStatus(429) => FailureType::Expected,
        FetchError::HttpStatus(code) if *code >= 500 => FailureType::Unexpected,
        // A 2xx body we cannot read usually means the provider changed its schema.
        FetchError::Parse(_) | FetchError::MissingField(_) | FetchError::NonNumeric { .. } => {
            FailureType::Unexpected
        }
        FetchError::Validation(_) => FailureType::Rejected,
        _ => match err.kind() {
            FailureKind::Usage => FailureType::Unexpected,
            _ => FailureType::Unknown,
        },
    }
}

// ---------------------------------------------------------------------------
// Initialization
// ---------------------------------------------------------------------------

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over `min_level`. A second call is a no-op.
pub fn init_logger(
    min_level: LogLevel,
    log_file: Option<&str>,
    console_timestamps: bool,
) -> std::io::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "lpmon_service={level},lpmon={level}",
            level = min_level.directive()
        ))
    });

    let console_timed = console_timestamps.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
    });
    let console_plain = (!console_timestamps).then(|| {
        tracing_subscriber::fmt::layer()
            .without_time()
            .with_target(false)
            .with_writer(std::io::stderr)
    });

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    if tracing_subscriber::registry()
        .with(filter)
        .with(console_timed)
        .with(console_plain)
        .with(file_layer)
        .try_init()
        .is_err()
    {
        tracing::debug!("global subscriber already installed; keeping it");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Fetcher Events
// ---------------------------------------------------------------------------

/// Log one failed attempt against a source. `attempt` is 0-based.
pub fn log_attempt_failure(source: &str, attempt: u32, max_attempts: u32, err: &FetchError) {
    let failure_type = classify_fetch_failure(err);
    let attempt = attempt + 1;

    match failure_type {
        FailureType::Rejected => {}
        FailureType::Expected => tracing::debug!(
            source,
            attempt,
            max_attempts,
            failure = %failure_type,
            "fetch attempt failed: {}",
            err
        ),
        FailureType::Unexpected | FailureType::Unknown => tracing::warn!(
            source,
            attempt,
            max_attempts,
            failure = %failure_type,
            "fetch attempt failed: {}",
            err
        ),
    }
}

/// Log a source giving up for this cycle.
///
/// Capped at warn whatever the classification; the `failure` field still
/// marks schema breakage as UNEXPECTED. Only `log_degraded` goes to error.
pub fn log_source_exhausted(source: &str, attempts: u32, err: &FetchError) {
    tracing::warn!(
        source,
        attempts,
        failure = %classify_fetch_failure(err),
        "source failed for this cycle: {}",
        err
    );
}

/// Log a value that arrived but was judged implausible.
pub fn log_validation_rejection(source: &str, candidate: f64, reason: &ValidationFailure) {
    tracing::warn!(
        source,
        candidate,
        failure = %FailureType::Rejected,
        "rejected value from provider: {}",
        reason
    );
}

pub fn log_recovery(source: &str, failed_cycles: u32) {
    tracing::info!(source, failed_cycles, "live readings restored");
}

pub fn log_degraded(consecutive_failures: u32, ceiling: u32) {
    tracing::error!(
        consecutive_failures,
        ceiling,
        "DEGRADED: no source has produced a valid value for {} consecutive cycles",
        consecutive_failures
    );
}

pub fn log_fallback(reading: &MetricReading, consecutive_failures: u32) {
    match reading.source {
        ReadingSource::DefaultZero => tracing::warn!(
            consecutive_failures,
            "all sources failed and no prior value exists; reporting 0"
        ),
        _ => tracing::warn!(
            consecutive_failures,
            value = reading.value,
            "all sources failed; serving last known good value"
        ),
    }
}

pub fn override_set(value: f64) {
    tracing::info!(value, "manual override set; automatic fetching paused");
}

pub fn override_cleared() {
    tracing::info!("manual override cleared; automatic fetching resumes");
}

// ---------------------------------------------------------------------------
// Cycle Summary Logging
// ---------------------------------------------------------------------------

/// Log a summary of one monitoring cycle.
pub fn log_cycle_summary(reading: &MetricReading, alerts: usize, consecutive_failures: u32) {
    let message = format!(
        "Cycle complete: TVL {:.2} from {}, {} alert(s)",
        reading.value, reading.source, alerts
    );

    match reading.source {
        ReadingSource::Live(_) | ReadingSource::ManualOverride => {
            tracing::info!(consecutive_failures, "{}", message)
        }
        ReadingSource::LastKnownGood => tracing::warn!(consecutive_failures, "{}", message),
        ReadingSource::DefaultZero => tracing::error!(consecutive_failures, "{}", message),
    }
}
