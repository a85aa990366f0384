use crate::error::{InvoiceIntelError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    /// Relative tolerance on the expected amount (0.001 = 0.1%).
    pub amount_tolerance: f64,
    pub max_invoice_age_days: i64,
    /// Minimum token overlap for two vendor names to count as the same.
    pub name_similarity_threshold: f64,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            amount_tolerance: 0.001,
            max_invoice_age_days: 365,
            name_similarity_threshold: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FraudConfig {
    pub n_trees: usize,
    pub sample_size: usize,
    pub seed: u64,
    /// Histories shorter than this get a low-confidence note on the score.
    pub min_reliable_history: usize,
    pub abnormal_amount_sigma: f64,
    pub high_risk_score: f64,
    pub medium_risk_score: f64,
    pub high_risk_confidence: f64,
    pub medium_risk_confidence: f64,
}

impl Default for FraudConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            sample_size: 256,
            seed: 42,
            min_reliable_history: 8,
            abnormal_amount_sigma: 3.0,
            high_risk_score: -0.5,
            medium_risk_score: -0.3,
            high_risk_confidence: 0.6,
            medium_risk_confidence: 0.4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub horizon_days: usize,
    pub moving_average_window: usize,
    /// Half-width of the band in standard deviations.
    pub interval_z: f64,
    pub low_cashflow_threshold: f64,
    pub vendor_concentration_share: f64,
    pub irregular_gap_days: f64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            horizon_days: 30,
            moving_average_window: 7,
            interval_z: 1.96,
            low_cashflow_threshold: 10_000.0,
            vendor_concentration_share: 0.5,
            irregular_gap_days: 30.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplianceConfig {
    /// Day of the following month on which a period's return is due.
    pub return_due_day: u32,
    /// Unpaid records older than this many days make their month overdue.
    pub overdue_threshold_days: i64,
    pub penalty_annual_rate: f64,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            return_due_day: 20,
            overdue_threshold_days: 30,
            penalty_annual_rate: 0.18,
        }
    }
}

/// Every tunable constant of the engines. The defaults are the production
/// policy values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub reconciliation: ReconciliationConfig,
    pub fraud: FraudConfig,
    pub forecast: ForecastConfig,
    pub compliance: ComplianceConfig,
}

fn invalid(section: &str, details: impl Into<String>) -> InvoiceIntelError {
    InvoiceIntelError::InvalidConfig {
        section: section.to_string(),
        details: details.into(),
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        let r = &self.reconciliation;
        if !(r.amount_tolerance >= 0.0 && r.amount_tolerance < 1.0) {
            return Err(invalid(
                "reconciliation",
                format!("amount_tolerance {} must be in [0, 1)", r.amount_tolerance),
            ));
        }
        if r.max_invoice_age_days < 0 {
            return Err(invalid("reconciliation", "max_invoice_age_days must not be negative"));
        }
        if !(0.0..=1.0).contains(&r.name_similarity_threshold) {
            return Err(invalid(
                "reconciliation",
                "name_similarity_threshold must be in [0, 1]",
            ));
        }

        let f = &self.fraud;
        if f.n_trees == 0 || f.sample_size < 2 {
            return Err(invalid(
                "fraud",
                format!(
                    "n_trees ({}) must be positive and sample_size ({}) at least 2",
                    f.n_trees, f.sample_size
                ),
            ));
        }
        if !(f.abnormal_amount_sigma > 0.0) {
            return Err(invalid("fraud", "abnormal_amount_sigma must be positive"));
        }

        let fc = &self.forecast;
        if fc.moving_average_window == 0 {
            return Err(invalid("forecast", "moving_average_window must be at least 1"));
        }
        if !(fc.interval_z >= 0.0) || !(fc.low_cashflow_threshold >= 0.0) {
            return Err(invalid(
                "forecast",
                "interval_z and low_cashflow_threshold must not be negative",
            ));
        }
        if !(fc.vendor_concentration_share > 0.0 && fc.vendor_concentration_share <= 1.0) {
            return Err(invalid("forecast", "vendor_concentration_share must be in (0, 1]"));
        }

        let c = &self.compliance;
        if !(1..=31).contains(&c.return_due_day) {
            return Err(invalid(
                "compliance",
                format!("return_due_day {} must be between 1 and 31", c.return_due_day),
            ));
        }
        if c.overdue_threshold_days < 0 || !(c.penalty_annual_rate >= 0.0) {
            return Err(invalid(
                "compliance",
                "overdue_threshold_days and penalty_annual_rate must not be negative",
            ));
        }

        Ok(())
    }
}
