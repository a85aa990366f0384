use crate::config::ComplianceConfig;
use crate::error::Result;
use crate::normalize::{normalize_history, NormalizedInvoice};
use crate::schema::{
    ComplianceReport, ComplianceStatus, InvoiceRecord, InvoiceStatus, Penalty, ReturnDue,
};
use crate::utils::{month_start, period_label, return_due_date};
use chrono::NaiveDate;
use log::{debug, error, info};
use std::collections::BTreeMap;

const MISSING_TAX_ID_WEIGHT: f64 = 30.0;
const MISSING_TAX_CODE_WEIGHT: f64 = 20.0;
const MISSING_TAX_AMOUNT_WEIGHT: f64 = 25.0;
const DAYS_PER_YEAR: f64 = 365.0;

/// Completeness counts over one record set.
#[derive(Debug, Default, Clone, Copy)]
struct Gaps {
    missing_tax_id: usize,
    missing_tax_code: usize,
    missing_tax_amount: usize,
    undated: usize,
}

impl Gaps {
    fn count(records: &[NormalizedInvoice]) -> Self {
        records.iter().fold(Self::default(), |mut gaps, r| {
            // A tax id that fails the structural check is as good as absent
            if r.trusted_tax_id().is_none() {
                gaps.missing_tax_id += 1;
            }
            if r.tax_code.is_none() {
                gaps.missing_tax_code += 1;
            }
            if r.tax_amount.is_none() {
                gaps.missing_tax_amount += 1;
            }
            if r.date.is_none() {
                gaps.undated += 1;
            }
            gaps
        })
    }

    fn score(&self, total: usize) -> f64 {
        let n = total as f64;
        let deduction = MISSING_TAX_ID_WEIGHT * self.missing_tax_id as f64 / n
            + MISSING_TAX_CODE_WEIGHT * self.missing_tax_code as f64 / n
            + MISSING_TAX_AMOUNT_WEIGHT * self.missing_tax_amount as f64 / n;
        (100.0 - deduction).clamp(0.0, 100.0)
    }
}

#[derive(Debug, Default)]
struct MonthBucket {
    tax: f64,
    unpaid_tax: f64,
    has_stale_unpaid: bool,
}

pub struct ComplianceScorer {
    config: ComplianceConfig,
}

impl ComplianceScorer {
    pub fn new(config: ComplianceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ComplianceConfig {
        &self.config
    }

    pub fn score(&self, records: &[InvoiceRecord], as_of: NaiveDate) -> ComplianceReport {
        let records = normalize_history(records);
        self.score_normalized(&records, as_of)
    }

    pub fn score_normalized(&self, records: &[NormalizedInvoice], as_of: NaiveDate) -> ComplianceReport {
        if records.is_empty() {
            return ComplianceReport {
                total_tax_collected: 0.0,
                total_tax_paid: 0.0,
                net_tax_liability: 0.0,
                compliance_score: 0.0,
                status: ComplianceStatus::Pending,
                returns_due: Vec::new(),
                penalties: Vec::new(),
                recommendations: vec!["No invoice records to assess".to_string()],
                record_count: 0,
            };
        }

        let total_tax_collected: f64 = records.iter().filter_map(|r| r.tax_amount).sum();
        let total_tax_paid: f64 = records
            .iter()
            .filter(|r| r.status == InvoiceStatus::Paid)
            .filter_map(|r| r.tax_amount)
            .sum();
        let net_tax_liability = total_tax_collected - total_tax_paid;

        let gaps = Gaps::count(records);
        let compliance_score = gaps.score(records.len());
        let status = ComplianceStatus::from_score(compliance_score);

        let mut recommendations = Vec::new();
        let (returns_due, penalties) = match self.return_schedule(records, as_of) {
            Ok(schedule) => schedule,
            Err(e) => {
                error!("Return schedule could not be derived: {}", e);
                recommendations.push(format!("Return schedule unavailable: {}", e));
                (Vec::new(), Vec::new())
            }
        };

        recommendations.extend(self.recommendations(&gaps, &returns_due, net_tax_liability));

        info!(
            "Compliance scored {} records: {:.1} ({:?}), {} overdue return(s)",
            records.len(),
            compliance_score,
            status,
            penalties.len()
        );

        ComplianceReport {
            total_tax_collected,
            total_tax_paid,
            net_tax_liability,
            compliance_score,
            status,
            returns_due,
            penalties,
            recommendations,
            record_count: records.len(),
        }
    }

    /// One return per calendar month with dated records; overdue months
    /// accrue simple interest from their due date.
    fn return_schedule(
        &self,
        records: &[NormalizedInvoice],
        as_of: NaiveDate,
    ) -> Result<(Vec<ReturnDue>, Vec<Penalty>)> {
        let mut months: BTreeMap<NaiveDate, MonthBucket> = BTreeMap::new();
        for record in records {
            let Some(date) = record.date else {
                continue;
            };
            let bucket = months.entry(month_start(date)).or_default();
            let tax = record.tax_amount.unwrap_or(0.0);
            bucket.tax += tax;
            if record.status != InvoiceStatus::Paid {
                bucket.unpaid_tax += tax;
                if (as_of - date).num_days() > self.config.overdue_threshold_days {
                    bucket.has_stale_unpaid = true;
                }
            }
        }

        let mut returns_due = Vec::with_capacity(months.len());
        let mut penalties = Vec::new();
        for (month, bucket) in months {
            let due_date = return_due_date(month, self.config.return_due_day)?;
            let period = period_label(month);

            if bucket.has_stale_unpaid {
                let days_overdue = (as_of - due_date).num_days().max(0);
                let amount = bucket.unpaid_tax
                    * self.config.penalty_annual_rate
                    * days_overdue as f64
                    / DAYS_PER_YEAR;
                debug!(
                    "Return {} overdue by {} days, penalty {:.2}",
                    period, days_overdue, amount
                );
                penalties.push(Penalty {
                    period: period.clone(),
                    tax_amount: bucket.unpaid_tax,
                    days_overdue,
                    amount,
                });
            }

            returns_due.push(ReturnDue {
                period,
                due_date,
                tax_amount: bucket.tax,
                overdue: bucket.has_stale_unpaid,
            });
        }

        Ok((returns_due, penalties))
    }

    fn recommendations(
        &self,
        gaps: &Gaps,
        returns_due: &[ReturnDue],
        net_tax_liability: f64,
    ) -> Vec<String> {
        let mut out = Vec::new();

        if gaps.missing_tax_id > 0 {
            out.push(format!(
                "Add a valid GSTIN to {} invoice(s) with a missing or malformed tax id",
                gaps.missing_tax_id
            ));
        }
        if gaps.missing_tax_code > 0 {
            out.push(format!(
                "Add HSN/SAC codes to {} invoice(s) so they can be categorized",
                gaps.missing_tax_code
            ));
        }
        if gaps.missing_tax_amount > 0 {
            out.push(format!(
                "Record the tax amount on {} invoice(s)",
                gaps.missing_tax_amount
            ));
        }
        if gaps.undated > 0 {
            out.push(format!(
                "Add invoice dates to {} record(s) so they fall into a return period",
                gaps.undated
            ));
        }

        let overdue = returns_due.iter().filter(|r| r.overdue).count();
        if overdue > 0 {
            out.push(format!(
                "File {} overdue return(s) to stop further interest accruing",
                overdue
            ));
        }
        if net_tax_liability > 0.0 {
            out.push(format!(
                "Settle the outstanding net tax liability of {:.2}",
                net_tax_liability
            ));
        }

        if out.is_empty() {
            out.push(format!(
                "Records are complete; keep filing each return by day {} of the following month",
                self.config.return_due_day
            ));
        }
        out
    }
}

impl Default for ComplianceScorer {
    fn default() -> Self {
        Self::new(ComplianceConfig::default())
    }
}
