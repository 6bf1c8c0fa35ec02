//! Data Source Verification Module
//!
//! Probes every configured endpoint exactly once (no retries, no fallback)
//! to show which providers are reachable and returning usable data right
//! now. Use this before changing the source list or its priority order.

use std::error::Error;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::MonitorConfig;
use crate::fetcher::check_plausible;
use crate::ingest::{build_client, ValueSource};
use crate::monitor::{LiveApi, PoolDataApi};
use crate::sources::{build_sources, SourceRole};

// ============================================================================
// Verification Results
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub timestamp: String,
    pub tvl_sources: Vec<SourceVerification>,
    pub auxiliary: Vec<SourceVerification>,
    pub summary: VerificationSummary,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerificationSummary {
    pub total: usize,
    pub working: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceVerification {
    pub name: String,
    /// Configured role of a TVL source; `None` for auxiliary endpoints.
    pub role: Option<SourceRole>,
    pub status: VerificationStatus,
    /// Value read, if the endpoint answered with one.
    pub value: Option<f64>,
    pub latency_ms: u64,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum VerificationStatus {
    Success,
    /// Reachable, but the data would be rejected or is empty.
    PartialSuccess,
    Failed,
}

impl SourceVerification {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            role: None,
            status: VerificationStatus::Failed,
            value: None,
            latency_ms: 0,
            error_message: None,
        }
    }
}

// ============================================================================
// Single Probes
// ============================================================================

/// One fetch from a TVL source, judged by the fetcher's plausibility rule
/// without history.
pub fn verify_value_source(source: &dyn ValueSource) -> SourceVerification {
    let mut result = SourceVerification::new(source.name());
    let started = Instant::now();
    let outcome = source.fetch();
    result.latency_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(value) => {
            result.value = Some(value);
            match check_plausible(value, None, f64::INFINITY) {
                Ok(()) if value > 0.0 => result.status = VerificationStatus::Success,
                Ok(()) => {
                    result.status = VerificationStatus::PartialSuccess;
                    result.error_message = Some("Source reports zero".to_string());
                }
                Err(reason) => {
                    result.status = VerificationStatus::PartialSuccess;
                    result.error_message = Some(format!("Would be rejected: {}", reason));
                }
            }
        }
        Err(e) => {
            result.error_message = Some(e.to_string());
        }
    }

    result
}

/// Probes the single-source endpoints used by the ratios.
pub fn verify_pool_api(api: &impl PoolDataApi) -> Vec<SourceVerification> {
    let mut results = Vec::new();

    let mut liquidity = SourceVerification::new("dexscreener-liquidity");
    let started = Instant::now();
    match api.liquidity_usd() {
        Ok(value) => {
            liquidity.value = Some(value);
            liquidity.status = if value > 0.0 {
                VerificationStatus::Success
            } else {
                VerificationStatus::PartialSuccess
            };
        }
        Err(e) => liquidity.error_message = Some(e.to_string()),
    }
    liquidity.latency_ms = started.elapsed().as_millis() as u64;
    results.push(liquidity);

    let mut transactions = SourceVerification::new("etherscan-txlist");
    let started = Instant::now();
    match api.internal_transactions() {
        Ok(txs) => {
            transactions.value = Some(txs.len() as f64);
            if txs.is_empty() {
                transactions.status = VerificationStatus::PartialSuccess;
                transactions.error_message =
                    Some("No transactions returned (rate limit or bad API key?)".to_string());
            } else {
                transactions.status = VerificationStatus::Success;
            }
        }
        Err(e) => transactions.error_message = Some(e.to_string()),
    }
    transactions.latency_ms = started.elapsed().as_millis() as u64;
    results.push(transactions);

    let mut price = SourceVerification::new("coingecko-price");
    let started = Instant::now();
    match api.token_price_usd() {
        Ok(value) => {
            price.value = Some(value);
            price.status = VerificationStatus::Success;
        }
        Err(e) => price.error_message = Some(e.to_string()),
    }
    price.latency_ms = started.elapsed().as_millis() as u64;
    results.push(price);

    results
}

pub fn summarize(results: &[&SourceVerification]) -> VerificationSummary {
    let working = results
        .iter()
        .filter(|r| r.status != VerificationStatus::Failed)
        .count();
    VerificationSummary {
        total: results.len(),
        working,
        failed: results.len() - working,
    }
}

// ============================================================================
// Full Verification Runner
// ============================================================================

/// `tvl_sources` pairs each built source with its configured role, in
/// priority order.
pub fn build_report(
    tvl_sources: &[(SourceRole, Box<dyn ValueSource>)],
    api: &impl PoolDataApi,
) -> VerificationReport {
    let tvl_results: Vec<_> = tvl_sources
        .iter()
        .map(|(role, source)| SourceVerification {
            role: Some(*role),
            ..verify_value_source(source.as_ref())
        })
        .collect();
    let auxiliary = verify_pool_api(api);
    let all: Vec<&SourceVerification> = tvl_results.iter().chain(auxiliary.iter()).collect();
    let summary = summarize(&all);

    VerificationReport {
        timestamp: Utc::now().to_rfc3339(),
        tvl_sources: tvl_results,
        auxiliary,
        summary,
    }
}

pub fn run_full_verification(config: &MonitorConfig) -> Result<VerificationReport, Box<dyn Error>> {
    let client = build_client(config.fetcher.request_timeout())?;
    let roles = config.sources.iter().map(|def| def.role);
    let sources: Vec<_> = roles.zip(build_sources(&config.sources, &client)).collect();
    let api = LiveApi::new(client, config);
    Ok(build_report(&sources, &api))
}

fn status_line(result: &SourceVerification) -> String {
    match result.status {
        VerificationStatus::Success => format!(
            "OK ({:.2}, {} ms)",
            result.value.unwrap_or_default(),
            result.latency_ms
        ),
        VerificationStatus::PartialSuccess => format!(
            "PARTIAL: {}",
            result.error_message.as_deref().unwrap_or("unusable data")
        ),
        VerificationStatus::Failed => format!(
            "FAILED: {}",
            result.error_message.as_deref().unwrap_or("Unknown")
        ),
    }
}

pub fn format_summary(report: &VerificationReport) -> String {
    let rule = "=".repeat(60);
    let mut out = String::new();
    out.push_str(&format!("{}\nSOURCE VERIFICATION ({})\n{}\n", rule, report.timestamp, rule));
    out.push_str("TVL sources (priority order):\n");
    for r in &report.tvl_sources {
        let role = match r.role {
            Some(SourceRole::Primary) => "primary",
            Some(SourceRole::Secondary) => "secondary",
            None => "-",
        };
        out.push_str(&format!("  {:<16} {:<10} {}\n", r.name, role, status_line(r)));
    }
    out.push_str("Auxiliary endpoints:\n");
    for r in &report.auxiliary {
        out.push_str(&format!("  {:<24} {}\n", r.name, status_line(r)));
    }
    let rate = if report.summary.total > 0 {
        report.summary.working as f64 / report.summary.total as f64 * 100.0
    } else {
        0.0
    };
    out.push_str(&format!(
        "\nOverall: {}/{} working ({} failed, {:.1}%)\n{}\n",
        report.summary.working, report.summary.total, report.summary.failed, rate, rule
    ));
    out
}
