//! # kpiscope Ratios
//!
//! Deterministic financial ratios and the KPI records they are computed from.
//!
//! | metric | formula | unit |
//! |---|---|---|
//! | `current_ratio` | current_assets / current_liabilities | x |
//! | `quick_ratio` | (current_assets - inventory) / current_liabilities | x |
//! | `roe` | net_income / equity | % |
//! | `roa` | net_income / total_assets | % |
//! | `debt_to_equity` | total_debt / equity | x |
//! | `profit_margin` | net_income / revenue | % |
//! | `gross_margin` | gross_profit / revenue | % |
//! | `operating_margin` | operating_income / revenue | % |
//!
//! Missing inputs are never treated as zero and zero denominators are
//! reported, so a returned figure is always computed from real inputs.
//!
//! [`AnalysisResult`] is the validated record handed back for an analysed
//! report: statement KPIs, chart readings, a capped excerpt of the source text
//! and its metadata.

pub mod calculator;
pub mod kpi;
pub mod metric;

pub use calculator::{CalculatorPort, RatioCalculator, RatioError, RatioInputs};
pub use kpi::{
    AnalysisResult, BalanceSheetKpi, ChartAnalysis, FinancialMetric, IncomeStatementKpi, KpiError,
    ReportType, RAW_TEXT_LIMIT,
};
pub use metric::{RatioMetric, RatioUnit};
