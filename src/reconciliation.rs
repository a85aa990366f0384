//! Invoice vs vendor-master reconciliation.
//!
//! Two load-bearing checks decide the status:
//!
//! - identifier: both tax ids structurally valid and equal
//! - amount: `|invoice - expected| <= expected * tolerance`
//!
//! Date plausibility and vendor-name similarity only add confidence.

use crate::config::ReconciliationConfig;
use crate::normalize::{
    normalize_invoice, normalize_tax_id, normalize_vendor, NormalizedInvoice, NormalizedVendor,
};
use crate::schema::{
    InvoiceRecord, InvoiceStatus, ReconciliationResult, ReconciliationStatus, VendorMasterRecord,
};
use crate::utils::clamp_unit;
use chrono::NaiveDate;
use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet};

const ID_WEIGHT: f64 = 0.6;
const AMOUNT_WEIGHT: f64 = 0.4;
const SECONDARY_CHECK_BONUS: f64 = 0.1;

const LEGAL_SUFFIXES: [&str; 14] = [
    "pvt", "private", "ltd", "limited", "llp", "inc", "co", "corp", "corporation", "company",
    "the", "and", "ms", "llc",
];

fn display_or_missing(value: Option<&str>) -> &str {
    value.unwrap_or("<missing>")
}

/// Both ids must be present and pass the structural check before equality
/// is even considered.
pub fn tax_ids_match(invoice: &NormalizedInvoice, vendor: &NormalizedVendor) -> bool {
    match (invoice.trusted_tax_id(), vendor.tax_id.as_deref()) {
        (Some(a), Some(b)) if vendor.tax_id_valid => a == b,
        _ => false,
    }
}

/// Relative tolerance on the expected amount; zero against zero matches.
pub fn amounts_match(invoice_amount: f64, expected_amount: f64, tolerance: f64) -> bool {
    (invoice_amount - expected_amount).abs() <= expected_amount * tolerance
}

fn name_tokens(name: &str) -> BTreeSet<String> {
    name.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty() && !LEGAL_SUFFIXES.contains(t))
        .map(str::to_string)
        .collect()
}

/// Jaccard overlap of vendor-name tokens with legal suffixes removed.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let left = name_tokens(a);
    let right = name_tokens(b);
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }

    let shared = left.intersection(&right).count() as f64;
    let union = left.union(&right).count() as f64;
    shared / union
}

fn names_match(a: &str, b: &str, threshold: f64) -> bool {
    if name_similarity(a, b) >= threshold {
        return true;
    }

    let joined_a: String = name_tokens(a).into_iter().collect::<Vec<_>>().join(" ");
    let joined_b: String = name_tokens(b).into_iter().collect::<Vec<_>>().join(" ");
    !joined_a.is_empty()
        && !joined_b.is_empty()
        && (joined_a.contains(&joined_b) || joined_b.contains(&joined_a))
}

/// Vendor master records keyed by normalized tax id.
#[derive(Debug, Clone, Default)]
pub struct VendorDirectory {
    vendors: BTreeMap<String, VendorMasterRecord>,
}

impl VendorDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = VendorMasterRecord>) -> Self {
        let mut directory = Self::new();
        for record in records {
            directory.insert(record);
        }
        directory
    }

    /// Records without a tax id cannot be looked up and are dropped.
    pub fn insert(&mut self, record: VendorMasterRecord) {
        match normalize_tax_id(record.tax_id.as_deref()) {
            Some(key) => {
                self.vendors.insert(key, record);
            }
            None => warn!(
                "Vendor master record '{}' has no tax id; not added to directory",
                display_or_missing(record.name.as_deref())
            ),
        }
    }

    pub fn get(&self, tax_id: &str) -> Option<&VendorMasterRecord> {
        let key = normalize_tax_id(Some(tax_id))?;
        self.vendors.get(&key)
    }

    pub fn len(&self) -> usize {
        self.vendors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vendors.is_empty()
    }
}

pub struct ReconciliationEngine {
    config: ReconciliationConfig,
}

impl ReconciliationEngine {
    pub fn new(config: ReconciliationConfig) -> Self {
        Self { config }
    }

    /// Reconciles one invoice against one vendor master record, with `as_of`
    /// as the evaluation date for the date plausibility check.
    pub fn reconcile(
        &self,
        invoice: &InvoiceRecord,
        vendor: &VendorMasterRecord,
        as_of: NaiveDate,
    ) -> ReconciliationResult {
        let invoice = normalize_invoice(invoice);
        let vendor = normalize_vendor(vendor);
        self.reconcile_normalized(&invoice, &vendor, as_of)
    }

    /// Looks the vendor up by the invoice's tax id. A miss yields `Pending`.
    pub fn reconcile_against_directory(
        &self,
        invoice: &InvoiceRecord,
        directory: &VendorDirectory,
        as_of: NaiveDate,
    ) -> ReconciliationResult {
        let normalized = normalize_invoice(invoice);
        let master = normalized
            .tax_id
            .as_deref()
            .and_then(|tax_id| directory.get(tax_id));

        match master {
            Some(vendor) => self.reconcile_normalized(&normalized, &normalize_vendor(vendor), as_of),
            None => {
                debug!(
                    "Invoice '{}': no vendor master record for tax id {}",
                    normalized.id,
                    display_or_missing(normalized.tax_id.as_deref())
                );
                ReconciliationResult {
                    status: ReconciliationStatus::Pending,
                    invoice_id: normalized.id.clone(),
                    invoice_tax_id: normalized.tax_id.clone().unwrap_or_default(),
                    vendor_tax_id: String::new(),
                    id_matched: false,
                    amount_matched: false,
                    confidence: 0.0,
                    notes: vec![format!(
                        "no vendor master record for tax id {}",
                        display_or_missing(normalized.tax_id.as_deref())
                    )],
                }
            }
        }
    }

    pub fn reconcile_normalized(
        &self,
        invoice: &NormalizedInvoice,
        vendor: &NormalizedVendor,
        as_of: NaiveDate,
    ) -> ReconciliationResult {
        let mut notes = Vec::new();

        let id_matched = tax_ids_match(invoice, vendor);
        if !id_matched {
            let reason = match (invoice.tax_id.as_deref(), vendor.tax_id.as_deref()) {
                (Some(a), Some(b)) if a == b => "tax id failed structural check",
                _ => "tax id mismatch",
            };
            notes.push(format!(
                "{}: invoice {} vs vendor {}",
                reason,
                display_or_missing(invoice.tax_id.as_deref()),
                display_or_missing(vendor.tax_id.as_deref())
            ));
        }

        let amount_matched = amounts_match(
            invoice.total_amount,
            vendor.expected_amount,
            self.config.amount_tolerance,
        );
        if !amount_matched {
            notes.push(format!(
                "amount mismatch: invoice {:.2} vs expected {:.2} (tolerance {}%)",
                invoice.total_amount,
                vendor.expected_amount,
                self.config.amount_tolerance * 100.0
            ));
        }

        let status = match (id_matched, amount_matched) {
            (true, true) => ReconciliationStatus::Matched,
            (true, false) | (false, true) => ReconciliationStatus::PartialMatch,
            (false, false) => ReconciliationStatus::Mismatch,
        };

        let mut confidence = 0.0;
        if id_matched {
            confidence += ID_WEIGHT;
        }
        if amount_matched {
            confidence += AMOUNT_WEIGHT;
        }

        if self.date_plausible(invoice.date, as_of) {
            confidence += SECONDARY_CHECK_BONUS;
        } else {
            notes.push(format!(
                "invoice date {} outside plausible range ({} days up to {})",
                invoice
                    .date
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "<missing>".to_string()),
                self.config.max_invoice_age_days,
                as_of
            ));
        }

        match (invoice.vendor_name.as_deref(), vendor.name.as_deref()) {
            (Some(a), Some(b)) if names_match(a, b, self.config.name_similarity_threshold) => {
                confidence += SECONDARY_CHECK_BONUS;
            }
            (a, b) => notes.push(format!(
                "vendor name mismatch: invoice '{}' vs master '{}'",
                display_or_missing(a),
                display_or_missing(b)
            )),
        }

        if let (Some(terms), Some(date)) = (vendor.payment_terms_days, invoice.date) {
            let age = (as_of - date).num_days();
            if invoice.status != InvoiceStatus::Paid && age > i64::from(terms) {
                notes.push(format!(
                    "unpaid past Net {} terms: invoice dated {}, {} days before {}",
                    terms, date, age, as_of
                ));
            }
        }

        debug!(
            "Invoice '{}' reconciled: {:?} (id={}, amount={})",
            invoice.id, status, id_matched, amount_matched
        );

        ReconciliationResult {
            status,
            invoice_id: invoice.id.clone(),
            invoice_tax_id: invoice.tax_id.clone().unwrap_or_default(),
            vendor_tax_id: vendor.tax_id.clone().unwrap_or_default(),
            id_matched,
            amount_matched,
            confidence: clamp_unit(confidence),
            notes,
        }
    }

    fn date_plausible(&self, date: Option<NaiveDate>, as_of: NaiveDate) -> bool {
        match date {
            Some(d) => {
                let age = (as_of - d).num_days();
                age >= 0 && age <= self.config.max_invoice_age_days
            }
            None => false,
        }
    }
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self::new(ReconciliationConfig::default())
    }
}
