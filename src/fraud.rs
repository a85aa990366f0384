use crate::anomaly::{IsolationForest, OutlierScorer};
use crate::config::FraudConfig;
use crate::error::{InvoiceIntelError, Result};
use crate::normalize::{normalize_history, normalize_invoice, NormalizedInvoice};
use crate::schema::{FraudReason, FraudResult, InvoiceRecord, RiskLevel};
use crate::utils::{clamp_unit, mean, population_std_dev};
use chrono::Datelike;
use log::{debug, info};
use std::collections::HashMap;

/// Fraud and anomaly scoring against a caller-supplied history.
///
/// Three independent rules each add a fixed confidence increment; the outlier
/// score comes from the injected [`OutlierScorer`].
pub struct FraudEngine {
    config: FraudConfig,
    scorer: Box<dyn OutlierScorer>,
}

/// `[amount, tax amount, weekday, day of month, prior records with this tax id]`
fn features(invoice: &NormalizedInvoice, prior_same_tax_id: usize) -> Vec<f64> {
    let (weekday, day) = invoice
        .date
        .map(|d| (d.weekday().num_days_from_monday() as f64, d.day() as f64))
        .unwrap_or((0.0, 0.0));

    vec![
        invoice.total_amount,
        invoice.tax_amount.unwrap_or(0.0),
        weekday,
        day,
        prior_same_tax_id as f64,
    ]
}

/// Feature rows for the history, counting prior occurrences in date order.
/// Undated records sort last.
fn history_matrix(history: &[NormalizedInvoice]) -> Vec<Vec<f64>> {
    let mut ordered: Vec<&NormalizedInvoice> = history.iter().collect();
    ordered.sort_by_key(|r| (r.date.is_none(), r.date));

    let mut seen: HashMap<&str, usize> = HashMap::new();
    ordered
        .into_iter()
        .map(|record| {
            let prior = match record.tax_id.as_deref() {
                Some(tax_id) => {
                    let count = seen.entry(tax_id).or_insert(0);
                    let prior = *count;
                    *count += 1;
                    prior
                }
                None => 0,
            };
            features(record, prior)
        })
        .collect()
}

fn has_same_day_duplicate(invoice: &NormalizedInvoice, history: &[NormalizedInvoice]) -> bool {
    let (Some(tax_id), Some(date)) = (invoice.tax_id.as_deref(), invoice.date) else {
        return false;
    };

    // Blank ids are unknown, never the same record
    let is_self = |r: &NormalizedInvoice| !invoice.id.is_empty() && r.id == invoice.id;

    history.iter().any(|r| {
        !is_self(r) && r.tax_id.as_deref() == Some(tax_id) && r.date == Some(date)
    })
}

/// Mean and population deviation of the historical amounts.
fn amount_baseline(history: &[NormalizedInvoice]) -> Result<(f64, f64)> {
    if history.len() < 2 {
        return Err(InvoiceIntelError::InsufficientHistory {
            check: "abnormal amount".to_string(),
            required: 2,
            available: history.len(),
        });
    }

    let amounts: Vec<f64> = history.iter().map(|r| r.total_amount).collect();
    match (mean(&amounts), population_std_dev(&amounts)) {
        (Some(mu), Some(sigma)) if mu.is_finite() && sigma.is_finite() => Ok((mu, sigma)),
        _ => Err(InvoiceIntelError::NonFiniteStatistic(
            "historical amount baseline".to_string(),
        )),
    }
}

/// At least three dated records for the tax id whose inter-arrival times are
/// tighter than half their mean.
fn has_regular_frequency(tax_id: &str, history: &[NormalizedInvoice]) -> bool {
    let mut dates: Vec<_> = history
        .iter()
        .filter(|r| r.tax_id.as_deref() == Some(tax_id))
        .filter_map(|r| r.date)
        .collect();

    if dates.len() < 3 {
        return false;
    }
    dates.sort();

    let gaps: Vec<f64> = dates
        .windows(2)
        .map(|w| (w[1] - w[0]).num_days() as f64)
        .collect();

    match (mean(&gaps), population_std_dev(&gaps)) {
        (Some(mu), Some(sigma)) => sigma < 0.5 * mu,
        _ => false,
    }
}

impl FraudEngine {
    pub fn new(config: FraudConfig) -> Self {
        let scorer = IsolationForest::new(config.n_trees, config.sample_size, config.seed);
        Self::with_scorer(config, Box::new(scorer))
    }

    pub fn with_scorer(config: FraudConfig, scorer: Box<dyn OutlierScorer>) -> Self {
        Self { config, scorer }
    }

    pub fn config(&self) -> &FraudConfig {
        &self.config
    }

    pub fn detect_fraud(&self, invoice: &InvoiceRecord, history: &[InvoiceRecord]) -> FraudResult {
        let invoice = normalize_invoice(invoice);
        let history = normalize_history(history);
        self.detect_fraud_normalized(&invoice, &history)
    }

    pub fn detect_fraud_normalized(
        &self,
        invoice: &NormalizedInvoice,
        history: &[NormalizedInvoice],
    ) -> FraudResult {
        let tax_id = invoice.tax_id.clone().unwrap_or_default();
        let mut notes = Vec::new();

        if history.is_empty() {
            notes.push("no historical records".to_string());
            return FraudResult {
                risk_level: RiskLevel::Low,
                invoice_id: invoice.id.clone(),
                tax_id,
                anomaly_score: 0.0,
                confidence: 0.0,
                reasons: Vec::new(),
                history_size: 0,
                notes,
            };
        }

        if history.len() < self.config.min_reliable_history {
            notes.push(format!(
                "anomaly score is low-confidence: only {} historical record(s)",
                history.len()
            ));
        }

        let prior = invoice
            .tax_id
            .as_deref()
            .map(|t| history.iter().filter(|r| r.tax_id.as_deref() == Some(t)).count())
            .unwrap_or(0);
        let anomaly_score = self
            .scorer
            .score(&history_matrix(history), &features(invoice, prior));

        let mut reasons = Vec::new();
        if has_same_day_duplicate(invoice, history) {
            reasons.push(FraudReason::DuplicateIdentifierSameDay);
        }
        match amount_baseline(history) {
            Ok((mu, sigma)) => {
                if (invoice.total_amount - mu).abs() > self.config.abnormal_amount_sigma * sigma {
                    reasons.push(FraudReason::AbnormalAmount);
                }
            }
            Err(e) => {
                debug!("Invoice '{}': {}", invoice.id, e);
                notes.push(format!("abnormal amount check skipped: {}", e));
            }
        }
        match invoice.tax_id.as_deref() {
            Some(t) if has_regular_frequency(t, history) => {
                reasons.push(FraudReason::SuspiciousFrequencyPattern)
            }
            Some(_) => {}
            None => notes.push("no tax id on invoice: identifier checks skipped".to_string()),
        }

        let confidence = clamp_unit(reasons.iter().map(FraudReason::increment).sum());

        let risk_level = if anomaly_score < self.config.high_risk_score
            && confidence > self.config.high_risk_confidence
        {
            RiskLevel::High
        } else if anomaly_score < self.config.medium_risk_score
            || confidence > self.config.medium_risk_confidence
        {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        };

        if risk_level == RiskLevel::High {
            info!(
                "Invoice '{}' scored HIGH risk (score {:.3}, reasons: {:?})",
                invoice.id, anomaly_score, reasons
            );
        } else {
            debug!(
                "Invoice '{}': risk {:?}, score {:.3}, confidence {:.2}",
                invoice.id, risk_level, anomaly_score, confidence
            );
        }

        FraudResult {
            risk_level,
            invoice_id: invoice.id.clone(),
            tax_id,
            anomaly_score,
            confidence,
            reasons,
            history_size: history.len(),
            notes,
        }
    }
}

impl Default for FraudEngine {
    fn default() -> Self {
        Self::new(FraudConfig::default())
    }
}
