//! MetricReading, ReadingSource, FetchError
//! core data structures and error handling for the pool monitor.
//!
//! This module defines the shared domain model imported by all other modules.
//! It contains no logic beyond small accessors, and no I/O.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Monitoring target
// ---------------------------------------------------------------------------

/// Uniswap V3 WETH-USDC pool on Ethereum mainnet.
pub const TARGET_CONTRACT: &str = "0x88e6a0c2ddd26feeb64f039a2c41296fcb3f5640";

/// Chain slug used by the public data APIs.
pub const CHAIN: &str = "ethereum";

/// The LP pool is the target contract itself.
pub const LP_POOL_ADDRESS: &str = TARGET_CONTRACT;

/// USDC token contract, the pool's core token.
pub const CORE_TOKEN: &str = "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48";

/// Etherscan's documented placeholder key. Works at the free rate limit.
pub const ETHERSCAN_PLACEHOLDER_KEY: &str = "YourApiKeyToken";

// ---------------------------------------------------------------------------
// Reading types
// ---------------------------------------------------------------------------

/// Where a returned value came from. Callers must inspect this to decide how
/// far to trust the value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "name")]
pub enum ReadingSource {
    /// A named data source answered and its value passed validation.
    Live(String),
    /// Operator-supplied value; no network call was made.
    ManualOverride,
    /// Every source failed this cycle; this is the newest validated value.
    LastKnownGood,
    /// Every source failed and nothing was ever validated.
    DefaultZero,
}

impl ReadingSource {
    /// Shorthand for a live source tag.
    pub fn live(name: &str) -> Self {
        ReadingSource::Live(name.to_string())
    }
}

impl fmt::Display for ReadingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadingSource::Live(name) => write!(f, "{}", name),
            ReadingSource::ManualOverride => write!(f, "manual-override"),
            ReadingSource::LastKnownGood => write!(f, "last-known-good"),
            ReadingSource::DefaultZero => write!(f, "default-zero"),
        }
    }
}

/// One value handed back by the resilient fetcher.
///
/// `value` is always finite and non-negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricReading {
    pub value: f64,
    pub source: ReadingSource,
}

impl MetricReading {
    pub fn new(value: f64, source: ReadingSource) -> Self {
        Self { value, source }
    }

    /// A zero or `DefaultZero` reading carries no usable signal. Ratio
    /// consumers suppress alerts for it instead of reporting a 100% drop.
    pub fn is_no_signal(&self) -> bool {
        self.source == ReadingSource::DefaultZero || self.value <= 0.0
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Why a candidate value was judged implausible.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationFailure {
    #[error("negative value {0}")]
    Negative(f64),
    #[error("value is not a finite number")]
    NotFinite,
    #[error(
        "value {candidate} deviates {pct:.1}% from last known good {last_known_good}",
        pct = .deviation * 100.0
    )]
    ImplausibleDeviation {
        candidate: f64,
        last_known_good: f64,
        deviation: f64,
    },
}

/// Errors that can arise when fetching or checking a value from a data source.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    /// Transport-level failure: DNS, connection refused, TLS, reset.
    #[error("Request failed: {0}")]
    Http(String),
    /// Non-2xx HTTP response.
    #[error("HTTP error: {0}")]
    HttpStatus(u16),
    /// The request did not complete within the configured timeout.
    #[error("Request timed out")]
    Timeout,
    /// The response body was not valid JSON.
    #[error("Parse error: {0}")]
    Parse(String),
    /// The JSON field the source reads was absent.
    #[error("Missing field: {0}")]
    MissingField(String),
    /// The JSON field was present but not a number.
    #[error("Non-numeric field {field}: {found}")]
    NonNumeric { field: String, found: String },
    /// The value arrived but failed plausibility checks.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationFailure),
    /// An operator tried to set an unusable override value.
    #[error("Invalid manual override {0}: must be a finite, non-negative number")]
    InvalidOverride(f64),
}

/// Coarse split used for retry decisions and log wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Provider unreachable or returned garbage; retry.
    Transient,
    /// Provider answered with nonsensical data; do not retry.
    Validation,
    /// Caller error, not a source failure.
    Usage,
}

impl FetchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::Validation(_) => FailureKind::Validation,
            FetchError::InvalidOverride(_) => FailureKind::Usage,
            _ => FailureKind::Transient,
        }
    }

    /// Whether the retry policy should try the same source again.
    pub fn is_retryable(&self) -> bool {
        self.kind() == FailureKind::Transient
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = err.status() {
            FetchError::HttpStatus(status.as_u16())
        } else {
            FetchError::Http(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_zero_and_zero_value_are_no_signal() {
        assert!(MetricReading::new(0.0, ReadingSource::DefaultZero).is_no_signal());
        assert!(MetricReading::new(0.0, ReadingSource::live("defillama")).is_no_signal());
        assert!(!MetricReading::new(5.0e8, ReadingSource::LastKnownGood).is_no_signal());
    }

    #[test]
    fn test_validation_errors_are_not_retryable() {
        let err = FetchError::from(ValidationFailure::Negative(-1.0));
        assert_eq!(err.kind(), FailureKind::Validation);
        assert!(!err.is_retryable());
        assert!(FetchError::Timeout.is_retryable());
        assert!(FetchError::HttpStatus(503).is_retryable());
    }

    #[test]
    fn test_error_messages_carry_context() {
        assert_eq!(FetchError::HttpStatus(500).to_string(), "HTTP error: 500");
        let deviation = ValidationFailure::ImplausibleDeviation {
            candidate: 5.0,
            last_known_good: 100.0,
            deviation: 0.95,
        };
        assert!(deviation.to_string().contains("95.0%"));
    }

    #[test]
    fn test_reading_source_serializes_with_kind_tag() {
        let json = serde_json::to_string(&ReadingSource::live("dexscreener")).unwrap();
        assert_eq!(json, r#"{"kind":"live","name":"dexscreener"}"#);
        let json = serde_json::to_string(&ReadingSource::DefaultZero).unwrap();
        assert_eq!(json, r#"{"kind":"default_zero"}"#);
    }
}
