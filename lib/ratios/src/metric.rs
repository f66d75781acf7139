//! Supported ratio metrics
//!
//! Each metric fixes its input fields, its formula and its unit. The unit is
//! part of the contract per metric: profitability ratios are reported in
//! percent, liquidity and leverage ratios as plain multiples.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::RatioError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatioMetric {
    CurrentRatio,
    QuickRatio,
    Roe,
    Roa,
    DebtToEquity,
    ProfitMargin,
    GrossMargin,
    OperatingMargin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatioUnit {
    /// Dimensionless multiple, e.g. 2.0 for a current ratio of 2:1
    Ratio,
    /// Hundredths, e.g. 20.0 for a 20% return on equity
    Percent,
}

impl RatioMetric {
    pub const ALL: [RatioMetric; 8] = [
        RatioMetric::CurrentRatio,
        RatioMetric::QuickRatio,
        RatioMetric::Roe,
        RatioMetric::Roa,
        RatioMetric::DebtToEquity,
        RatioMetric::ProfitMargin,
        RatioMetric::GrossMargin,
        RatioMetric::OperatingMargin,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RatioMetric::CurrentRatio => "current_ratio",
            RatioMetric::QuickRatio => "quick_ratio",
            RatioMetric::Roe => "roe",
            RatioMetric::Roa => "roa",
            RatioMetric::DebtToEquity => "debt_to_equity",
            RatioMetric::ProfitMargin => "profit_margin",
            RatioMetric::GrossMargin => "gross_margin",
            RatioMetric::OperatingMargin => "operating_margin",
        }
    }

    /// Input fields in lookup order. The last one is always the denominator.
    pub fn required_fields(self) -> &'static [&'static str] {
        match self {
            RatioMetric::CurrentRatio => &["current_assets", "current_liabilities"],
            RatioMetric::QuickRatio => &["current_assets", "inventory", "current_liabilities"],
            RatioMetric::Roe => &["net_income", "equity"],
            RatioMetric::Roa => &["net_income", "total_assets"],
            RatioMetric::DebtToEquity => &["total_debt", "equity"],
            RatioMetric::ProfitMargin => &["net_income", "revenue"],
            RatioMetric::GrossMargin => &["gross_profit", "revenue"],
            RatioMetric::OperatingMargin => &["operating_income", "revenue"],
        }
    }

    pub fn unit(self) -> RatioUnit {
        match self {
            RatioMetric::CurrentRatio | RatioMetric::QuickRatio | RatioMetric::DebtToEquity => {
                RatioUnit::Ratio
            }
            RatioMetric::Roe
            | RatioMetric::Roa
            | RatioMetric::ProfitMargin
            | RatioMetric::GrossMargin
            | RatioMetric::OperatingMargin => RatioUnit::Percent,
        }
    }

    /// Comma-separated list of every metric name.
    pub fn supported_list() -> String {
        Self::ALL.iter().map(|m| m.name()).collect::<Vec<_>>().join(", ")
    }
}

impl fmt::Display for RatioMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for RatioUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RatioUnit::Ratio => f.write_str("x"),
            RatioUnit::Percent => f.write_str("%"),
        }
    }
}

impl FromStr for RatioMetric {
    type Err = RatioError;

    /// Case-insensitive; surrounding whitespace is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.name() == wanted)
            .ok_or_else(|| RatioError::UnsupportedMetric {
                metric: s.to_string(),
                supported: Self::supported_list(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("ROE".parse::<RatioMetric>().unwrap(), RatioMetric::Roe);
        assert_eq!(
            " Current_Ratio ".parse::<RatioMetric>().unwrap(),
            RatioMetric::CurrentRatio
        );
    }

    #[test]
    fn test_names_roundtrip() {
        for metric in RatioMetric::ALL {
            assert_eq!(metric.name().parse::<RatioMetric>().unwrap(), metric);
            assert_eq!(metric.to_string(), metric.name());
        }
    }

    #[test]
    fn test_unknown_metric_lists_supported() {
        let err = "ebitda_margin".parse::<RatioMetric>().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("ebitda_margin"));
        for metric in RatioMetric::ALL {
            assert!(message.contains(metric.name()));
        }
    }

    #[test]
    fn test_units() {
        assert_eq!(RatioMetric::CurrentRatio.unit(), RatioUnit::Ratio);
        assert_eq!(RatioMetric::DebtToEquity.unit(), RatioUnit::Ratio);
        assert_eq!(RatioMetric::Roe.unit(), RatioUnit::Percent);
        assert_eq!(RatioMetric::OperatingMargin.unit(), RatioUnit::Percent);
    }

    #[test]
    fn test_serde_uses_snake_case() {
        assert_eq!(
            serde_json::to_string(&RatioMetric::DebtToEquity).unwrap(),
            "\"debt_to_equity\""
        );
    }
}
