//! Structured KPI records extracted from a report.

use chrono::NaiveDate;
use kpiscope_core::Metadata;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::calculator::RatioInputs;

pub const DEFAULT_CURRENCY: &str = "RUB";

/// Characters of source text kept in an [`AnalysisResult`].
pub const RAW_TEXT_LIMIT: usize = 5_000;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum KpiError {
    #[error("Metric '{0}' cannot be negative")]
    NegativeValue(String),

    #[error("Metric '{0}' is not a finite number")]
    NonFinite(String),

    #[error("Confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f64),

    #[error("Unknown report type: {0}")]
    UnknownReportType(String),

    #[error("Chart value '{0}' is not a finite number")]
    NonFiniteChartValue(String),

    #[error("Raw text has {len} characters, limit is {limit}")]
    RawTextTooLong { len: usize, limit: usize },

    #[error("Processing time {0} is not a non-negative number of seconds")]
    InvalidProcessingTime(f64),
}

fn check_confidence(confidence: f64) -> Result<(), KpiError> {
    if (0.0..=1.0).contains(&confidence) {
        Ok(())
    } else {
        Err(KpiError::ConfidenceOutOfRange(confidence))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    BalanceSheet,
    IncomeStatement,
    CashFlow,
    AnnualReport,
}

impl ReportType {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportType::BalanceSheet => "balance_sheet",
            ReportType::IncomeStatement => "income_statement",
            ReportType::CashFlow => "cash_flow",
            ReportType::AnnualReport => "annual_report",
        }
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportType {
    type Err = KpiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "balance_sheet" => Ok(ReportType::BalanceSheet),
            "income_statement" => Ok(ReportType::IncomeStatement),
            "cash_flow" => Ok(ReportType::CashFlow),
            "annual_report" => Ok(ReportType::AnnualReport),
            _ => Err(KpiError::UnknownReportType(s.to_string())),
        }
    }
}

/// One reported figure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialMetric {
    pub name: String,
    pub value: f64,
    #[serde(default = "default_unit")]
    pub unit: String,
    pub period: NaiveDate,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_unit() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_confidence() -> f64 {
    1.0
}

impl FinancialMetric {
    /// A figure in the default currency with full confidence.
    pub fn new(name: impl Into<String>, value: f64, period: NaiveDate) -> Result<Self, KpiError> {
        let metric = Self {
            name: name.into(),
            value,
            unit: default_unit(),
            period,
            confidence: default_confidence(),
        };
        metric.validate()?;
        Ok(metric)
    }

    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Result<Self, KpiError> {
        self.confidence = confidence;
        self.validate()?;
        Ok(self)
    }

    /// Values must be finite and non-negative, confidence within [0, 1].
    /// Also used after deserializing untrusted input.
    pub fn validate(&self) -> Result<(), KpiError> {
        if !self.value.is_finite() {
            return Err(KpiError::NonFinite(self.name.clone()));
        }
        if self.value < 0.0 {
            return Err(KpiError::NegativeValue(self.name.clone()));
        }
        check_confidence(self.confidence)
    }
}

/// Balance sheet figures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceSheetKpi {
    pub total_assets: FinancialMetric,
    pub total_liabilities: FinancialMetric,
    pub equity: FinancialMetric,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_assets: Option<FinancialMetric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_liabilities: Option<FinancialMetric>,
}

impl BalanceSheetKpi {
    /// Current assets over current liabilities, when both are known and
    /// liabilities are positive.
    pub fn current_ratio(&self) -> Option<f64> {
        match (&self.current_assets, &self.current_liabilities) {
            (Some(assets), Some(liabilities)) if liabilities.value > 0.0 => {
                Some(assets.value / liabilities.value)
            }
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<(), KpiError> {
        [&self.total_assets, &self.total_liabilities, &self.equity]
            .into_iter()
            .chain(self.current_assets.as_ref())
            .chain(self.current_liabilities.as_ref())
            .try_for_each(FinancialMetric::validate)
    }

    /// Calculator inputs derived from this sheet.
    pub fn to_values(&self) -> RatioInputs {
        let mut values = RatioInputs::new();
        values.insert("total_assets".to_string(), self.total_assets.value);
        values.insert("total_liabilities".to_string(), self.total_liabilities.value);
        values.insert("equity".to_string(), self.equity.value);
        if let Some(m) = &self.current_assets {
            values.insert("current_assets".to_string(), m.value);
        }
        if let Some(m) = &self.current_liabilities {
            values.insert("current_liabilities".to_string(), m.value);
        }
        values
    }
}

/// Income statement figures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomeStatementKpi {
    pub revenue: FinancialMetric,
    pub gross_profit: FinancialMetric,
    pub operating_income: FinancialMetric,
    pub net_income: FinancialMetric,
}

impl IncomeStatementKpi {
    /// Net income over revenue as a fraction; 0.0 without positive revenue.
    ///
    /// Unlike the calculator's `profit_margin`, this is not scaled to percent.
    pub fn profit_margin(&self) -> f64 {
        if self.revenue.value > 0.0 {
            self.net_income.value / self.revenue.value
        } else {
            0.0
        }
    }

    pub fn validate(&self) -> Result<(), KpiError> {
        [
            &self.revenue,
            &self.gross_profit,
            &self.operating_income,
            &self.net_income,
        ]
        .into_iter()
        .try_for_each(FinancialMetric::validate)
    }

    pub fn to_values(&self) -> RatioInputs {
        [
            ("revenue", &self.revenue),
            ("gross_profit", &self.gross_profit),
            ("operating_income", &self.operating_income),
            ("net_income", &self.net_income),
        ]
        .into_iter()
        .map(|(k, m)| (k.to_string(), m.value))
        .collect()
    }
}

/// What was read off one chart image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartAnalysis {
    /// line, bar, pie, ...
    pub chart_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub extracted_values: BTreeMap<String, f64>,
    #[serde(default)]
    pub trends: Vec<String>,
    pub confidence: f64,
}

impl ChartAnalysis {
    pub fn new(chart_type: impl Into<String>, confidence: f64) -> Result<Self, KpiError> {
        check_confidence(confidence)?;
        Ok(Self {
            chart_type: chart_type.into(),
            title: None,
            extracted_values: BTreeMap::new(),
            trends: Vec::new(),
            confidence,
        })
    }

    pub fn validate(&self) -> Result<(), KpiError> {
        check_confidence(self.confidence)?;
        match self.extracted_values.iter().find(|(_, v)| !v.is_finite()) {
            Some((name, _)) => Err(KpiError::NonFiniteChartValue(name.clone())),
            None => Ok(()),
        }
    }
}

/// Final structured result for one analysed report.
///
/// At most one of `balance_sheet` and `income_statement` is normally set,
/// matching `report_type`, but both are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub report_id: String,
    pub report_type: ReportType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    pub report_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance_sheet: Option<BalanceSheetKpi>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub income_statement: Option<IncomeStatementKpi>,
    #[serde(default)]
    pub charts: Vec<ChartAnalysis>,
    /// Leading [`RAW_TEXT_LIMIT`] characters of the source text.
    pub raw_text: String,
    #[serde(default)]
    pub metadata: Metadata,
    /// Wall-clock seconds spent on the analysis.
    pub processing_time: f64,
}

impl AnalysisResult {
    /// `raw_text` is cut to [`RAW_TEXT_LIMIT`] characters.
    pub fn new(
        report_id: impl Into<String>,
        report_type: ReportType,
        report_date: NaiveDate,
        raw_text: &str,
    ) -> Self {
        Self {
            report_id: report_id.into(),
            report_type,
            company_name: None,
            report_date,
            balance_sheet: None,
            income_statement: None,
            charts: Vec::new(),
            raw_text: truncate_chars(raw_text, RAW_TEXT_LIMIT).to_string(),
            metadata: Metadata::new(),
            processing_time: 0.0,
        }
    }

    #[must_use]
    pub fn with_company(mut self, name: impl Into<String>) -> Self {
        self.company_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_balance_sheet(mut self, sheet: BalanceSheetKpi) -> Self {
        self.balance_sheet = Some(sheet);
        self
    }

    #[must_use]
    pub fn with_income_statement(mut self, income: IncomeStatementKpi) -> Self {
        self.income_statement = Some(income);
        self
    }

    #[must_use]
    pub fn with_chart(mut self, chart: ChartAnalysis) -> Self {
        self.charts.push(chart);
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    #[must_use]
    pub fn with_processing_time(mut self, seconds: f64) -> Self {
        self.processing_time = seconds;
        self
    }

    /// Check every nested figure and chart. Also used after deserializing.
    pub fn validate(&self) -> Result<(), KpiError> {
        if let Some(sheet) = &self.balance_sheet {
            sheet.validate()?;
        }
        if let Some(income) = &self.income_statement {
            income.validate()?;
        }
        self.charts.iter().try_for_each(ChartAnalysis::validate)?;

        let len = self.raw_text.chars().count();
        if len > RAW_TEXT_LIMIT {
            return Err(KpiError::RawTextTooLong {
                len,
                limit: RAW_TEXT_LIMIT,
            });
        }
        if !self.processing_time.is_finite() || self.processing_time < 0.0 {
            return Err(KpiError::InvalidProcessingTime(self.processing_time));
        }
        Ok(())
    }

    /// Calculator inputs from every statement present.
    pub fn kpi_values(&self) -> RatioInputs {
        let mut values = RatioInputs::new();
        if let Some(sheet) = &self.balance_sheet {
            values.extend(sheet.to_values());
        }
        if let Some(income) = &self.income_statement {
            values.extend(income.to_values());
        }
        values
    }
}

fn truncate_chars(s: &str, limit: usize) -> &str {
    match s.char_indices().nth(limit) {
        Some((end, _)) => &s[..end],
        None => s,
    }
}
