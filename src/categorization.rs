use crate::category_table::{CategoryEntry, CategoryTable};
use crate::normalize::{normalize_invoice, NormalizedInvoice};
use crate::schema::{CategorizationResult, InvoiceRecord, TaxCategory};
use crate::utils::clamp_unit;
use log::debug;
use std::sync::Arc;

const DESCRIPTION_MATCH_BONUS: f64 = 0.2;
const AMOUNT_RANGE_BONUS: f64 = 0.3;
const HEADING_FALLBACK_PENALTY: f64 = 0.1;

const EXEMPT_MARKERS: [&str; 5] = ["exempt", "nil rated", "nil-rated", "non-gst", "non gst"];
const ZERO_RATED_MARKERS: [&str; 5] = ["export", "sez", "lut", "zero rated", "zero-rated"];

/// A category override. Rules are evaluated in declaration order and the
/// first one that applies wins.
struct OverrideRule {
    name: &'static str,
    category: TaxCategory,
    applies: fn(&NormalizedInvoice, &CategoryEntry) -> bool,
}

const OVERRIDE_RULES: [OverrideRule; 2] = [
    OverrideRule {
        name: "exemption",
        category: TaxCategory::Exempt,
        applies: is_exempt_supply,
    },
    OverrideRule {
        name: "zero-rating",
        category: TaxCategory::Zero,
        applies: is_zero_rated_supply,
    },
];

fn tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty())
}

/// Multi-word markers match as substrings; single words match whole tokens,
/// or token prefixes for words of five letters or more ("exported").
fn mentions(texts: &[String], marker: &str) -> bool {
    let is_phrase = marker.contains(' ') || marker.contains('-');
    texts.iter().any(|text| {
        if is_phrase {
            text.contains(marker)
        } else {
            tokens(text).any(|t| t == marker || (marker.len() >= 5 && t.starts_with(marker)))
        }
    })
}

fn is_exempt_supply(invoice: &NormalizedInvoice, _entry: &CategoryEntry) -> bool {
    let texts = invoice.searchable_text();
    EXEMPT_MARKERS.iter().any(|m| mentions(&texts, m))
}

fn is_zero_rated_supply(invoice: &NormalizedInvoice, entry: &CategoryEntry) -> bool {
    let texts = invoice.searchable_text();
    if ZERO_RATED_MARKERS.iter().any(|m| mentions(&texts, m)) {
        return true;
    }

    invoice.tax_amount == Some(0.0)
        && invoice.total_amount > 0.0
        && entry.default_category.is_positive_rate()
}

fn has_matching_description(invoice: &NormalizedInvoice, entry: &CategoryEntry) -> bool {
    let terms = entry.match_terms();
    if terms.is_empty() {
        return false;
    }

    invoice
        .line_items
        .iter()
        .filter_map(|item| item.description.as_deref())
        .any(|description| {
            let lower = description.to_lowercase();
            let hit = tokens(&lower).any(|t| terms.iter().any(|term| term == t));
            hit
        })
}

/// Maps invoices to a tax category using the injected code table.
pub struct CategorizationEngine {
    table: Arc<CategoryTable>,
}

impl CategorizationEngine {
    pub fn new(table: Arc<CategoryTable>) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &CategoryTable {
        &self.table
    }

    pub fn categorize(&self, record: &InvoiceRecord) -> CategorizationResult {
        let invoice = normalize_invoice(record);
        self.categorize_normalized(&invoice)
    }

    pub fn categorize_normalized(&self, invoice: &NormalizedInvoice) -> CategorizationResult {
        let mut notes = Vec::new();

        let Some(code) = invoice.tax_code.as_deref() else {
            notes.push("no code present on invoice".to_string());
            return CategorizationResult {
                category: TaxCategory::Nil,
                tax_code: String::new(),
                confidence: 0.0,
                notes,
            };
        };

        let Some((entry, via_heading)) = self.table.lookup(code) else {
            debug!("Invoice '{}': tax code {} not in table", invoice.id, code);
            notes.push(format!("code not found in category table: {}", code));
            return CategorizationResult {
                category: TaxCategory::Nil,
                tax_code: code.to_string(),
                confidence: 0.0,
                notes,
            };
        };

        let mut category = entry.default_category;
        for rule in &OVERRIDE_RULES {
            if (rule.applies)(invoice, entry) {
                notes.push(format!(
                    "{} rule applied: {} -> {}",
                    rule.name, entry.default_category, rule.category
                ));
                category = rule.category;
                break;
            }
        }

        let mut confidence = entry.reliability_score;
        if via_heading {
            confidence -= HEADING_FALLBACK_PENALTY;
            notes.push(format!(
                "code {} matched on its 4-digit heading",
                code
            ));
        }
        if has_matching_description(invoice, entry) {
            confidence += DESCRIPTION_MATCH_BONUS;
        } else {
            notes.push("line-item descriptions do not match the code description".to_string());
        }
        if entry.amount_in_range(invoice.total_amount) {
            confidence += AMOUNT_RANGE_BONUS;
        } else if let Some((min, max)) = entry.amount_range {
            notes.push(format!(
                "amount {:.2} outside expected range {:.2}-{:.2}",
                invoice.total_amount, min, max
            ));
        }

        debug!(
            "Invoice '{}': code {} categorized as {}",
            invoice.id, code, category
        );

        CategorizationResult {
            category,
            tax_code: code.to_string(),
            confidence: clamp_unit(confidence),
            notes,
        }
    }
}
