//! One monitoring cycle: fetch, derive, alert.
//!
//! The `Monitor` owns the resilient fetcher and the session's liquidity
//! history. Only TVL goes through the fetcher; price, liquidity and the
//! transaction list are single-shot calls whose failures degrade to
//! "no data" for that cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alert::health::{self, HealthReport};
use crate::alert::thresholds::{
    check_failed_rate, check_fund_outflow, check_liquidity_drop, round2, RiskAlert, RiskKind,
    RiskThresholds,
};
use crate::analysis::history::LiquidityHistory;
use crate::analysis::ratios::{
    failure_rate, fund_outflow_at, liquidity_change, FailureRate, FundOutflow, LiquidityChange,
};
use crate::config::MonitorConfig;
use crate::fetcher::ResilientValueFetcher;
use crate::ingest::coingecko::{self, FALLBACK_PRICE_USD};
use crate::ingest::etherscan::{self, InternalTx};
use crate::ingest::http_json::{extract_number, get_text};
use crate::ingest::{build_client, ValueSource};
use crate::logging;
use crate::model::{FetchError, MetricReading, ReadingSource};
use crate::retry::{Sleeper, ThreadSleeper};
use crate::sources::{build_sources, dexscreener_pair_url, DEXSCREENER};

// ---------------------------------------------------------------------------
// Raw API seam
// ---------------------------------------------------------------------------

/// The single-source calls the ratios need besides TVL.
pub trait PoolDataApi {
    fn liquidity_usd(&self) -> Result<f64, FetchError>;
    fn internal_transactions(&self) -> Result<Vec<InternalTx>, FetchError>;
    fn token_price_usd(&self) -> Result<f64, FetchError>;
}

/// `PoolDataApi` backed by DexScreener, Etherscan and CoinGecko.
pub struct LiveApi {
    client: reqwest::blocking::Client,
    chain: String,
    pool_address: String,
    contract: String,
    core_token: String,
    etherscan_api_key: String,
}

impl LiveApi {
    pub fn new(client: reqwest::blocking::Client, config: &MonitorConfig) -> Self {
        let target = &config.target;
        Self {
            client,
            chain: target.chain.clone(),
            pool_address: target.pool_address.clone(),
            contract: target.contract.clone(),
            core_token: target.core_token.clone(),
            etherscan_api_key: target.etherscan_api_key.clone(),
        }
    }
}

impl PoolDataApi for LiveApi {
    fn liquidity_usd(&self) -> Result<f64, FetchError> {
        let body = get_text(&self.client, &dexscreener_pair_url(&self.chain, &self.pool_address))?;
        extract_number(&body, "/pair/liquidity/usd")
    }

    fn internal_transactions(&self) -> Result<Vec<InternalTx>, FetchError> {
        etherscan::fetch_internal_transactions(&self.client, &self.contract, &self.etherscan_api_key)
    }

    fn token_price_usd(&self) -> Result<f64, FetchError> {
        coingecko::fetch_token_price(&self.client, &self.chain, &self.core_token)
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Everything one dashboard refresh shows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub taken_at: DateTime<Utc>,
    pub contract: String,
    pub chain: String,
    pub tvl: MetricReading,
    pub token_price_usd: f64,
    pub liquidity_usd: f64,
    pub fund_outflow: FundOutflow,
    pub liquidity_change: LiquidityChange,
    pub failure_rate: FailureRate,
    pub alerts: Vec<RiskAlert>,
    pub health: HealthReport,
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

pub struct Monitor<A: PoolDataApi, Z: Sleeper = ThreadSleeper> {
    fetcher: ResilientValueFetcher<Z>,
    api: A,
    thresholds: RiskThresholds,
    contract: String,
    chain: String,
    history: LiquidityHistory,
}

impl Monitor<LiveApi, ThreadSleeper> {
    /// Wires the live HTTP sources described by `config`.
    pub fn from_config(config: &MonitorConfig) -> Result<Self, FetchError> {
        let client = build_client(config.fetcher.request_timeout())?;
        let sources = build_sources(&config.sources, &client);
        let fetcher = ResilientValueFetcher::new(sources, &config.fetcher);
        let api = LiveApi::new(client, config);
        Self::with_parts(fetcher, api, config)
    }
}

impl<A: PoolDataApi, Z: Sleeper> Monitor<A, Z> {
    pub fn with_parts(
        mut fetcher: ResilientValueFetcher<Z>,
        api: A,
        config: &MonitorConfig,
    ) -> Result<Self, FetchError> {
        fetcher.set_manual_override(config.monitor.manual_override)?;
        Ok(Self {
            fetcher,
            api,
            thresholds: config.thresholds.clone(),
            contract: config.target.contract.clone(),
            chain: config.target.chain.clone(),
            history: LiquidityHistory::default(),
        })
    }

    pub fn fetcher(&self) -> &ResilientValueFetcher<Z> {
        &self.fetcher
    }

    pub fn fetcher_mut(&mut self) -> &mut ResilientValueFetcher<Z> {
        &mut self.fetcher
    }

    pub fn history(&self) -> &LiquidityHistory {
        &self.history
    }

    pub fn run_cycle(&mut self) -> DashboardSnapshot {
        self.run_cycle_at(Utc::now())
    }

    pub fn run_cycle_at(&mut self, now: DateTime<Utc>) -> DashboardSnapshot {
        let tvl = self.fetcher.get_value();

        let transactions = self.api.internal_transactions().unwrap_or_else(|err| {
            tracing::warn!(source = "etherscan", "transaction list unavailable: {}", err);
            Vec::new()
        });
        let token_price_usd = self.api.token_price_usd().unwrap_or_else(|err| {
            tracing::warn!(
                source = "coingecko",
                "token price unavailable, assuming {}: {}",
                FALLBACK_PRICE_USD,
                err
            );
            FALLBACK_PRICE_USD
        });
        // The default primary TVL source is the same DexScreener pair
        // liquidity; reuse its live reading instead of a second GET.
        let liquidity_usd = match &tvl.source {
            ReadingSource::Live(name) if name == DEXSCREENER => tvl.value,
            _ => self.api.liquidity_usd().unwrap_or_else(|err| {
                tracing::warn!(source = DEXSCREENER, "pool liquidity unavailable: {}", err);
                0.0
            }),
        };

        let baseline = self.history.hour_ago(now);
        self.history.record(now, liquidity_usd);

        let fund_outflow = fund_outflow_at(&tvl, &transactions, token_price_usd, &self.contract, now);
        let liquidity_change = liquidity_change(liquidity_usd, baseline);
        let failure_rate = failure_rate(&transactions);

        let alerts: Vec<RiskAlert> = [
            check_fund_outflow(&fund_outflow, &self.thresholds),
            check_liquidity_drop(&liquidity_change, &self.thresholds),
            check_failed_rate(&failure_rate, &self.thresholds),
        ]
        .into_iter()
        .flatten()
        .collect();

        for alert in &alerts {
            tracing::warn!(kind = ?alert.kind, value_pct = alert.value_pct, "{}", alert.message);
        }

        let health = health::evaluate_at(&self.fetcher.health(), now);
        logging::log_cycle_summary(&tvl, alerts.len(), self.fetcher.consecutive_failures());

        DashboardSnapshot {
            taken_at: now,
            contract: self.contract.clone(),
            chain: self.chain.clone(),
            tvl,
            token_price_usd,
            liquidity_usd,
            fund_outflow,
            liquidity_change,
            failure_rate,
            alerts,
            health,
        }
    }
}

/// Wraps already-built sources for a monitor that replays recorded data.
pub fn boxed_sources<S: ValueSource + 'static>(sources: Vec<S>) -> Vec<Box<dyn ValueSource>> {
    sources
        .into_iter()
        .map(|s| Box::new(s) as Box<dyn ValueSource>)
        .collect()
}

// ---------------------------------------------------------------------------
// Text Rendering
// ---------------------------------------------------------------------------

fn status_word(alerted: bool, no_signal: bool) -> &'static str {
    match (no_signal, alerted) {
        (true, _) => "no signal",
        (false, true) => "ALERT",
        (false, false) => "normal",
    }
}

/// Renders a snapshot as the plain-text dashboard printed by the binary.
pub fn format_summary(snapshot: &DashboardSnapshot) -> String {
    let alerted = |kind: RiskKind| snapshot.alerts.iter().any(|a| a.kind == kind);

    let mut out = String::new();
    let rule = "=".repeat(60);
    out.push_str(&format!("{}\n", rule));
    out.push_str("LIQUIDITY POOL MONITOR\n");
    out.push_str(&format!("{}\n", rule));
    out.push_str(&format!("Contract:   {} ({})\n", snapshot.contract, snapshot.chain));
    out.push_str(&format!(
        "Refreshed:  {}\n\n",
        snapshot.taken_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    match snapshot.fund_outflow {
        FundOutflow::Measured { rate_pct, .. } => out.push_str(&format!(
            "1h net fund outflow:     {:>8.2}%  [{}]\n",
            round2(rate_pct),
            status_word(alerted(RiskKind::FundOutflow), false)
        )),
        FundOutflow::NoSignal => out.push_str(&format!(
            "1h net fund outflow:          n/a  [{}]\n",
            status_word(false, true)
        )),
    }
    match snapshot.liquidity_change {
        LiquidityChange::Measured { change_pct, baseline, .. } => out.push_str(&format!(
            "1h liquidity change:     {:>8.2}%  [{}] (baseline: {:?})\n",
            round2(change_pct),
            status_word(alerted(RiskKind::LiquidityDrop), false),
            baseline
        )),
        LiquidityChange::NoSignal => out.push_str(&format!(
            "1h liquidity change:          n/a  [{}]\n",
            status_word(false, true)
        )),
    }
    match snapshot.failure_rate {
        FailureRate::Measured { rate_pct, failed, total } => out.push_str(&format!(
            "Tx failure rate:         {:>8.2}%  [{}] ({} of {} failed)\n",
            round2(rate_pct),
            status_word(alerted(RiskKind::FailedRate), false),
            failed,
            total
        )),
        FailureRate::NoSignal => out.push_str(&format!(
            "Tx failure rate:              n/a  [{}]\n",
            status_word(false, true)
        )),
    }

    out.push('\n');
    out.push_str(&format!(
        "TVL:         ${:.2} (source: {})\n",
        snapshot.tvl.value, snapshot.tvl.source
    ));
    out.push_str(&format!("Liquidity:   ${:.2}\n", snapshot.liquidity_usd));
    out.push_str(&format!("Token price: ${:.2}\n", snapshot.token_price_usd));
    out.push_str(&format!("Health:      {:?} - {}\n", snapshot.health.status, snapshot.health.message));

    for alert in &snapshot.alerts {
        out.push_str(&format!("!! {}\n", alert.message));
    }
    out.push_str(&format!("{}\n", rule));
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
