use crate::config::ForecastConfig;
use crate::error::{InvoiceIntelError, Result};
use crate::normalize::{normalize_history, NormalizedInvoice};
use crate::schema::{
    CashFlowAnalysis, CashFlowForecastPoint, CashFlowRiskFactor, InvoiceRecord, MonthlyTotal,
    Trend,
};
use crate::utils::{mean, month_start, population_std_dev};
use chrono::{Datelike, Days, NaiveDate};
use log::{debug, error, info, warn};
use std::collections::{BTreeMap, HashMap};

const QUARTER_END_MONTHS: [u32; 2] = [3, 9];
const FREQUENT_GAP_DAYS: f64 = 20.0;
const MONTHLY_GAP_DAYS: f64 = 45.0;

/// Sums dated records into calendar-month buckets, oldest first. Months with
/// no records are absent.
pub fn monthly_totals<'a>(
    history: impl IntoIterator<Item = &'a NormalizedInvoice>,
) -> Vec<MonthlyTotal> {
    let mut buckets: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
    for (date, amount) in history
        .into_iter()
        .filter_map(|r| r.date.map(|d| (d, r.total_amount)))
    {
        let bucket = buckets.entry(month_start(date)).or_insert((0.0, 0));
        bucket.0 += amount;
        bucket.1 += 1;
    }

    buckets
        .into_iter()
        .map(|(period, (total, record_count))| MonthlyTotal {
            period,
            total,
            record_count,
        })
        .collect()
}

/// Latest populated month against the earliest.
pub fn trend(monthly: &[MonthlyTotal]) -> Trend {
    match (monthly.first(), monthly.last()) {
        (Some(first), Some(last)) if monthly.len() >= 2 => {
            if last.total > first.total * 1.1 {
                Trend::Increasing
            } else if last.total < first.total * 0.9 {
                Trend::Decreasing
            } else {
                Trend::Stable
            }
        }
        _ => Trend::Stable,
    }
}

fn average_gap_days(dates: &[NaiveDate]) -> Option<f64> {
    let gaps: Vec<f64> = dates
        .windows(2)
        .map(|w| (w[1] - w[0]).num_days() as f64)
        .collect();
    mean(&gaps)
}

fn cadence_label(average_gap: f64) -> &'static str {
    if average_gap < FREQUENT_GAP_DAYS {
        "Frequent payments"
    } else if average_gap <= MONTHLY_GAP_DAYS {
        "Regular monthly payments"
    } else {
        "Irregular payments"
    }
}

fn vendor_key(record: &NormalizedInvoice) -> String {
    record
        .vendor_name
        .clone()
        .or_else(|| record.tax_id.clone())
        .unwrap_or_else(|| "unknown vendor".to_string())
}

pub struct CashFlowForecaster {
    config: ForecastConfig,
}

impl CashFlowForecaster {
    pub fn new(config: ForecastConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Daily projection for `horizon` days after the latest dated record.
    pub fn forecast(&self, history: &[InvoiceRecord], horizon: usize) -> Vec<CashFlowForecastPoint> {
        self.analyze_with_horizon(history, horizon).forecast
    }

    pub fn analyze(&self, history: &[InvoiceRecord]) -> CashFlowAnalysis {
        self.analyze_with_horizon(history, self.config.horizon_days)
    }

    pub fn analyze_with_horizon(&self, history: &[InvoiceRecord], horizon: usize) -> CashFlowAnalysis {
        let history = normalize_history(history);
        self.analyze_normalized(&history, horizon)
    }

    /// Never fails; an unusable history degrades to [`CashFlowAnalysis::failed`].
    pub fn analyze_normalized(&self, history: &[NormalizedInvoice], horizon: usize) -> CashFlowAnalysis {
        let mut dated: Vec<&NormalizedInvoice> = history.iter().filter(|r| r.date.is_some()).collect();
        if dated.is_empty() {
            warn!(
                "Cash flow analysis skipped: none of {} records carries a usable date",
                history.len()
            );
            return CashFlowAnalysis::failed("no dated history");
        }
        dated.sort_by_key(|r| r.date);

        match self.try_analyze(&dated, horizon) {
            Ok(analysis) => {
                info!(
                    "Cash flow analysed: {} months, trend {}, {} risk factor(s)",
                    analysis.monthly_totals.len(),
                    analysis.trend,
                    analysis.risk_factors.len()
                );
                analysis
            }
            Err(e) => {
                error!("Cash flow analysis failed: {}", e);
                CashFlowAnalysis::failed(e.to_string())
            }
        }
    }

    fn try_analyze(&self, dated: &[&NormalizedInvoice], horizon: usize) -> Result<CashFlowAnalysis> {
        let monthly_totals = monthly_totals(dated.iter().copied());
        let trend = trend(&monthly_totals);

        let total_inflow: f64 = monthly_totals.iter().map(|m| m.total).sum();
        if !total_inflow.is_finite() {
            return Err(InvoiceIntelError::NonFiniteStatistic("total inflow".to_string()));
        }

        let dates: Vec<NaiveDate> = dated.iter().filter_map(|r| r.date).collect();
        let average_gap = average_gap_days(&dates);

        let amounts: Vec<f64> = dated.iter().map(|r| r.total_amount).collect();
        let forecast = self.project(&amounts, &dates, trend, average_gap, horizon)?;
        let risk_factors = self.risk_factors(dated, total_inflow, trend, average_gap);

        Ok(CashFlowAnalysis {
            monthly_totals,
            trend,
            total_inflow,
            forecast,
            risk_factors,
        })
    }

    fn project(
        &self,
        amounts: &[f64],
        dates: &[NaiveDate],
        trend: Trend,
        average_gap: Option<f64>,
        horizon: usize,
    ) -> Result<Vec<CashFlowForecastPoint>> {
        let window = self.config.moving_average_window.min(amounts.len());
        let predicted = mean(&amounts[amounts.len() - window..])
            .ok_or_else(|| InvoiceIntelError::NonFiniteStatistic("moving average".to_string()))?;
        let sigma = population_std_dev(amounts)
            .ok_or_else(|| InvoiceIntelError::NonFiniteStatistic("amount deviation".to_string()))?;

        if !predicted.is_finite() || !sigma.is_finite() {
            return Err(InvoiceIntelError::NonFiniteStatistic(
                "forecast band".to_string(),
            ));
        }

        let half_width = self.config.interval_z * sigma;
        let last_date = dates
            .last()
            .copied()
            .ok_or_else(|| InvoiceIntelError::DateError("no dated history".to_string()))?;

        let mut shared_factors = vec![format!("History trend: {}", trend)];
        if let Some(gap) = average_gap {
            shared_factors.push(format!("Vendor payment pattern: {}", cadence_label(gap)));
        }

        debug!(
            "Projecting {} days from {}: predicted {:.2} +/- {:.2}",
            horizon, last_date, predicted, half_width
        );

        (1..=horizon as u64)
            .map(|offset| {
                let date = last_date.checked_add_days(Days::new(offset)).ok_or_else(|| {
                    InvoiceIntelError::DateError(format!("{} + {} days overflows", last_date, offset))
                })?;

                let mut contributing_factors = Vec::with_capacity(shared_factors.len() + 1);
                if QUARTER_END_MONTHS.contains(&date.month()) {
                    contributing_factors.push("Quarter-end effect".to_string());
                }
                contributing_factors.extend(shared_factors.iter().cloned());

                Ok(CashFlowForecastPoint {
                    date,
                    predicted_amount: predicted,
                    confidence_interval: (predicted - half_width, predicted + half_width),
                    contributing_factors,
                })
            })
            .collect()
    }

    fn risk_factors(
        &self,
        dated: &[&NormalizedInvoice],
        total_inflow: f64,
        trend: Trend,
        average_gap: Option<f64>,
    ) -> Vec<CashFlowRiskFactor> {
        let mut factors = Vec::new();

        if total_inflow > 0.0 {
            let mut by_vendor: HashMap<String, f64> = HashMap::new();
            for record in dated {
                *by_vendor.entry(vendor_key(record)).or_insert(0.0) += record.total_amount;
            }
            // Ties broken by name so the result does not depend on hash order
            let top = by_vendor
                .into_iter()
                .max_by(|a, b| a.1.total_cmp(&b.1).then_with(|| b.0.cmp(&a.0)));
            if let Some((vendor, amount)) = top {
                let share = amount / total_inflow;
                if share > self.config.vendor_concentration_share {
                    factors.push(CashFlowRiskFactor::VendorConcentration { vendor, share });
                }
            }
        }

        if trend == Trend::Decreasing {
            factors.push(CashFlowRiskFactor::DecliningTrend);
        }

        if total_inflow < self.config.low_cashflow_threshold {
            factors.push(CashFlowRiskFactor::LowCashflow {
                total_inflow,
                threshold: self.config.low_cashflow_threshold,
            });
        }

        if let Some(gap) = average_gap {
            if gap > self.config.irregular_gap_days {
                factors.push(CashFlowRiskFactor::IrregularCadence {
                    average_gap_days: gap,
                });
            }
        }

        factors
    }
}

impl Default for CashFlowForecaster {
    fn default() -> Self {
        Self::new(ForecastConfig::default())
    }
}
