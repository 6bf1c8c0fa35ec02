//! Risk threshold checking.
//!
//! Each ratio is compared against its configured fraction. Thresholds are
//! fractions (0.3 = 30%); the ratios themselves are percentages.

use serde::{Deserialize, Serialize};

use crate::analysis::ratios::{FailureRate, FundOutflow, LiquidityChange};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskThresholds {
    /// Net outflow over one hour, as a fraction of TVL.
    pub fund_outflow: f64,
    /// Liquidity decline over one hour, as a fraction of the baseline.
    pub liquidity_drop: f64,
    /// Share of failed transactions in the latest page.
    pub failed_rate: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            fund_outflow: 0.3,
            liquidity_drop: 0.3,
            failed_rate: 0.3,
        }
    }
}

impl RiskThresholds {
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("fund_outflow", self.fund_outflow),
            ("liquidity_drop", self.liquidity_drop),
            ("failed_rate", self.failed_rate),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(format!("thresholds.{} must be in (0, 1], got {}", name, value));
            }
        }
        Ok(())
    }
}

/// Which ratio tripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskKind {
    FundOutflow,
    LiquidityDrop,
    FailedRate,
}

/// An alert raised when a ratio crosses its threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAlert {
    pub kind: RiskKind,
    /// The ratio, in percent, rounded to 2 decimals.
    pub value_pct: f64,
    pub threshold_pct: f64,
    pub message: String,
}

/// Strictly greater than the threshold alerts; equal does not.
pub fn check_fund_outflow(ratio: &FundOutflow, thresholds: &RiskThresholds) -> Option<RiskAlert> {
    let FundOutflow::Measured { rate_pct, .. } = *ratio else {
        return None;
    };
    let threshold_pct = thresholds.fund_outflow * 100.0;
    (rate_pct > threshold_pct).then(|| RiskAlert {
        kind: RiskKind::FundOutflow,
        value_pct: round2(rate_pct),
        threshold_pct,
        message: format!(
            "Net outflow above {:.0}%: possible fund withdrawal or theft",
            threshold_pct
        ),
    })
}

/// Alerts when the change is a decline steeper than the threshold.
pub fn check_liquidity_drop(
    ratio: &LiquidityChange,
    thresholds: &RiskThresholds,
) -> Option<RiskAlert> {
    let LiquidityChange::Measured { change_pct, .. } = *ratio else {
        return None;
    };
    let threshold_pct = thresholds.liquidity_drop * 100.0;
    (change_pct < -threshold_pct).then(|| RiskAlert {
        kind: RiskKind::LiquidityDrop,
        value_pct: round2(change_pct),
        threshold_pct,
        message: format!(
            "Liquidity down more than {:.0}%: price manipulation or failing swaps likely",
            threshold_pct
        ),
    })
}

pub fn check_failed_rate(ratio: &FailureRate, thresholds: &RiskThresholds) -> Option<RiskAlert> {
    let FailureRate::Measured { rate_pct, .. } = *ratio else {
        return None;
    };
    let threshold_pct = thresholds.failed_rate * 100.0;
    (rate_pct > threshold_pct).then(|| RiskAlert {
        kind: RiskKind::FailedRate,
        value_pct: round2(rate_pct),
        threshold_pct,
        message: format!(
            "Failure rate above {:.0}%: contract fault or attack attempts",
            threshold_pct
        ),
    })
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ratios::BaselineKind;

    #[test]
    fn test_outflow_above_threshold_alerts() {
        let ratio = FundOutflow::Measured { rate_pct: 31.0, inflow_usd: 0.0, outflow_usd: 31.0 };
        let alert = check_fund_outflow(&ratio, &RiskThresholds::default()).expect("should alert");
        assert_eq!(alert.kind, RiskKind::FundOutflow);
        assert_eq!(alert.threshold_pct, 30.0);
    }

    #[test]
    fn test_outflow_exactly_at_threshold_does_not_alert() {
        let ratio = FundOutflow::Measured { rate_pct: 30.0, inflow_usd: 0.0, outflow_usd: 30.0 };
        assert!(check_fund_outflow(&ratio, &RiskThresholds::default()).is_none());
    }

    #[test]
    fn test_no_signal_never_alerts() {
        let t = RiskThresholds::default();
        assert!(check_fund_outflow(&FundOutflow::NoSignal, &t).is_none());
        assert!(check_liquidity_drop(&LiquidityChange::NoSignal, &t).is_none());
        assert!(check_failed_rate(&FailureRate::NoSignal, &t).is_none());
    }

    #[test]
    fn test_liquidity_rise_does_not_alert() {
        let ratio = LiquidityChange::Measured {
            change_pct: 45.0,
            current_usd: 145.0,
            baseline_usd: 100.0,
            baseline: BaselineKind::Recorded,
        };
        assert!(check_liquidity_drop(&ratio, &RiskThresholds::default()).is_none());
    }

    #[test]
    fn test_liquidity_drop_past_threshold_alerts() {
        let ratio = LiquidityChange::Measured {
            change_pct: -40.0,
            current_usd: 60.0,
            baseline_usd: 100.0,
            baseline: BaselineKind::Recorded,
        };
        let alert = check_liquidity_drop(&ratio, &RiskThresholds::default()).unwrap();
        assert_eq!(alert.value_pct, -40.0);
    }

    #[test]
    fn test_failed_rate_alert_respects_custom_threshold() {
        let ratio = FailureRate::Measured { rate_pct: 40.0, failed: 20, total: 50 };
        let loose = RiskThresholds { failed_rate: 0.5, ..RiskThresholds::default() };
        assert!(check_failed_rate(&ratio, &loose).is_none());
        assert!(check_failed_rate(&ratio, &RiskThresholds::default()).is_some());
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        assert!(RiskThresholds::default().validate().is_ok());
        let zero = RiskThresholds { fund_outflow: 0.0, ..RiskThresholds::default() };
        assert!(zero.validate().is_err());
        let nan = RiskThresholds { liquidity_drop: f64::NAN, ..RiskThresholds::default() };
        assert!(nan.validate().is_err());
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(16.666666), 16.67);
        assert_eq!(round2(-16.666666), -16.67);
    }
}
