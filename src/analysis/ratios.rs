//! The three dashboard ratios.
//!
//! Every ratio has a `NoSignal` case. A zero TVL, zero liquidity or an empty
//! transaction list means the inputs are missing, not that the pool emptied,
//! so no percentage is computed and no alert can fire.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::ingest::etherscan::InternalTx;
use crate::model::MetricReading;

/// Multiplier used to fake the one-hour-old liquidity when no recorded
/// sample is old enough. Always yields a change of about -16.67%.
pub const SYNTHETIC_BASELINE_FACTOR: f64 = 1.2;

// ---------------------------------------------------------------------------
// Fund outflow
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FundOutflow {
    Measured {
        /// Net outflow as a percentage of TVL. Negative means net inflow.
        rate_pct: f64,
        inflow_usd: f64,
        outflow_usd: f64,
    },
    NoSignal,
}

/// Net outflow over the hour before `now`.
///
/// Transfers out of `contract` are outflow, transfers into it inflow.
/// Entries with unparseable timestamps or values are skipped.
pub fn fund_outflow_at(
    tvl: &MetricReading,
    transactions: &[InternalTx],
    token_price_usd: f64,
    contract: &str,
    now: DateTime<Utc>,
) -> FundOutflow {
    if tvl.is_no_signal() {
        return FundOutflow::NoSignal;
    }

    let cutoff = (now - Duration::hours(1)).timestamp();
    let contract = contract.to_lowercase();
    let mut inflow_usd = 0.0;
    let mut outflow_usd = 0.0;

    for tx in transactions {
        let (Some(ts), Some(value_eth)) = (tx.timestamp_secs(), tx.value_eth()) else {
            continue;
        };
        if ts < cutoff {
            continue;
        }
        let value_usd = value_eth * token_price_usd;
        if tx.from.to_lowercase() == contract {
            outflow_usd += value_usd;
        } else if tx.to.to_lowercase() == contract {
            inflow_usd += value_usd;
        }
    }

    FundOutflow::Measured {
        rate_pct: (outflow_usd - inflow_usd) / tvl.value * 100.0,
        inflow_usd,
        outflow_usd,
    }
}

// ---------------------------------------------------------------------------
// Liquidity change
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineKind {
    /// A sample recorded at least an hour ago in this session.
    Recorded,
    /// `current * SYNTHETIC_BASELINE_FACTOR`; a placeholder, not data.
    Synthetic,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LiquidityChange {
    Measured {
        /// Percentage change from the baseline. Negative means a drop.
        change_pct: f64,
        current_usd: f64,
        baseline_usd: f64,
        baseline: BaselineKind,
    },
    NoSignal,
}

pub fn liquidity_change(current_usd: f64, recorded_baseline: Option<f64>) -> LiquidityChange {
    if !(current_usd > 0.0) {
        return LiquidityChange::NoSignal;
    }

    let (baseline_usd, baseline) = match recorded_baseline.filter(|b| *b > 0.0) {
        Some(b) => (b, BaselineKind::Recorded),
        None => (current_usd * SYNTHETIC_BASELINE_FACTOR, BaselineKind::Synthetic),
    };

    LiquidityChange::Measured {
        change_pct: (current_usd - baseline_usd) / baseline_usd * 100.0,
        current_usd,
        baseline_usd,
        baseline,
    }
}

// ---------------------------------------------------------------------------
// Failure rate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FailureRate {
    Measured {
        rate_pct: f64,
        failed: usize,
        total: usize,
    },
    NoSignal,
}

pub fn failure_rate(transactions: &[InternalTx]) -> FailureRate {
    let total = transactions.len();
    if total == 0 {
        return FailureRate::NoSignal;
    }
    let failed = transactions.iter().filter(|tx| tx.failed()).count();
    FailureRate::Measured {
        rate_pct: failed as f64 / total as f64 * 100.0,
        failed,
        total,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ReadingSource, TARGET_CONTRACT};
    use chrono::TimeZone;

    const ONE_ETH: &str = "1000000000000000000";

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap()
    }

    fn tx(minutes_ago: i64, from: &str, to: &str, wei: &str, is_error: &str) -> InternalTx {
        InternalTx {
            time_stamp: (fixed_now() - Duration::minutes(minutes_ago)).timestamp().to_string(),
            value: wei.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            is_error: is_error.to_string(),
        }
    }

    fn tvl(value: f64) -> MetricReading {
        MetricReading::new(value, ReadingSource::live("dexscreener"))
    }

    // --- fund outflow -------------------------------------------------------

    #[test]
    fn test_outflow_rate_nets_inflow_against_outflow() {
        let upper = TARGET_CONTRACT.to_uppercase().replacen("0X", "0x", 1);
        let txs = vec![
            tx(10, TARGET_CONTRACT, "0xaaa", "3000000000000000000", "0"),
            tx(20, "0xbbb", &upper, ONE_ETH, "0"),
        ];
        let ratio = fund_outflow_at(&tvl(10.0), &txs, 2.0, TARGET_CONTRACT, fixed_now());
        // out 6 USD, in 2 USD, over 10 USD TVL
        assert_eq!(
            ratio,
            FundOutflow::Measured { rate_pct: 40.0, inflow_usd: 2.0, outflow_usd: 6.0 }
        );
    }

    #[test]
    fn test_transactions_older_than_an_hour_are_ignored() {
        let txs = vec![
            tx(61, TARGET_CONTRACT, "0xaaa", ONE_ETH, "0"),
            tx(60, TARGET_CONTRACT, "0xaaa", ONE_ETH, "0"),
        ];
        let FundOutflow::Measured { outflow_usd, .. } =
            fund_outflow_at(&tvl(100.0), &txs, 1.0, TARGET_CONTRACT, fixed_now())
        else {
            panic!("expected a measurement");
        };
        assert_eq!(outflow_usd, 1.0, "only the exactly-one-hour-old transfer counts");
    }

    #[test]
    fn test_malformed_transactions_are_skipped() {
        let mut bad = tx(5, TARGET_CONTRACT, "0xaaa", ONE_ETH, "0");
        bad.time_stamp = "soon".to_string();
        let txs = vec![bad, tx(5, TARGET_CONTRACT, "0xaaa", "not-wei", "0")];
        let ratio = fund_outflow_at(&tvl(100.0), &txs, 1.0, TARGET_CONTRACT, fixed_now());
        assert_eq!(
            ratio,
            FundOutflow::Measured { rate_pct: 0.0, inflow_usd: 0.0, outflow_usd: 0.0 }
        );
    }

    #[test]
    fn test_default_zero_tvl_is_no_signal() {
        let zero = MetricReading::new(0.0, ReadingSource::DefaultZero);
        let txs = vec![tx(5, TARGET_CONTRACT, "0xaaa", ONE_ETH, "0")];
        assert_eq!(
            fund_outflow_at(&zero, &txs, 1.0, TARGET_CONTRACT, fixed_now()),
            FundOutflow::NoSignal
        );
    }

    // --- liquidity ----------------------------------------------------------

    #[test]
    fn test_synthetic_baseline_gives_fixed_decline() {
        let LiquidityChange::Measured { change_pct, baseline, .. } = liquidity_change(100.0, None)
        else {
            panic!("expected a measurement");
        };
        assert_eq!(baseline, BaselineKind::Synthetic);
        assert!((change_pct - (-16.666_666)).abs() < 1e-3);
    }

    #[test]
    fn test_recorded_baseline_is_preferred() {
        assert_eq!(
            liquidity_change(60.0, Some(100.0)),
            LiquidityChange::Measured {
                change_pct: -40.0,
                current_usd: 60.0,
                baseline_usd: 100.0,
                baseline: BaselineKind::Recorded,
            }
        );
    }

    #[test]
    fn test_zero_liquidity_is_no_signal() {
        assert_eq!(liquidity_change(0.0, Some(100.0)), LiquidityChange::NoSignal);
    }

    // --- failure rate -------------------------------------------------------

    #[test]
    fn test_failure_rate_counts_is_error_flag() {
        let txs = vec![
            tx(1, "a", "b", ONE_ETH, "1"),
            tx(1, "a", "b", ONE_ETH, "0"),
            tx(1, "a", "b", ONE_ETH, "0"),
            tx(1, "a", "b", ONE_ETH, "1"),
        ];
        assert_eq!(
            failure_rate(&txs),
            FailureRate::Measured { rate_pct: 50.0, failed: 2, total: 4 }
        );
    }

    #[test]
    fn test_no_transactions_is_no_signal() {
        assert_eq!(failure_rate(&[]), FailureRate::NoSignal);
    }
}
