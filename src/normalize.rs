//! Tolerant conversion of extracted invoice fields into typed values.
//!
//! Nothing in here fails. Numeric fields fall back to `0.0`, dates fall back
//! to `None` (the record then drops out of date-keyed aggregation), and every
//! coercion reports whether a default was substituted so callers can score
//! completeness.

use crate::schema::{InvoiceRecord, InvoiceStatus, LineItem, VendorMasterRecord};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

/// A coerced value together with whether it had to be defaulted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coerced<T> {
    pub value: T,
    pub defaulted: bool,
}

impl<T> Coerced<T> {
    pub fn parsed(value: T) -> Self {
        Self {
            value,
            defaulted: false,
        }
    }

    pub fn defaulted(value: T) -> Self {
        Self {
            value,
            defaulted: true,
        }
    }
}

const CURRENCY_PREFIXES: [&str; 6] = ["₹", "rs.", "rs", "inr", "usd", "$"];
const AMOUNT_SUFFIXES: [&str; 6] = ["/-", "only", "inr", "rupees", "usd", "$"];
/// Words tolerated around an amount written out in words.
const AMOUNT_FILLER_WORDS: [&str; 9] = [
    "and", "only", "rupees", "rupee", "rs", "inr", "usd", "dollars", "dollar",
];
const MISSING_MARKERS: [&str; 4] = ["n/a", "na", "null", "none"];

/// Coerces an amount field. Absent, unparsable, negative and non-finite
/// values all become `0.0` with `defaulted = true`.
pub fn coerce_amount(value: &Value) -> Coerced<f64> {
    match parse_amount_value(value) {
        Some(v) if v.is_finite() && v >= 0.0 => Coerced::parsed(v),
        _ => Coerced::defaulted(0.0),
    }
}

/// Like [`coerce_amount`] but keeps absence visible, for fields such as the
/// tax amount where "not stated" and "zero" mean different things.
pub fn coerce_optional_amount(value: &Value) -> Option<f64> {
    let coerced = coerce_amount(value);
    if coerced.defaulted {
        None
    } else {
        Some(coerced.value)
    }
}

fn parse_amount_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_amount_str(s),
        _ => None,
    }
}

/// Parses amounts as they come out of OCR: `"1,234.50"`, `"₹ 500"`,
/// `"Rs. 1200/-"`, or words (`"one thousand two hundred"`).
pub fn parse_amount_str(raw: &str) -> Option<f64> {
    let mut s = raw.trim().to_lowercase();
    if s.is_empty() || MISSING_MARKERS.contains(&s.as_str()) {
        return None;
    }

    for prefix in CURRENCY_PREFIXES {
        if let Some(rest) = s.strip_prefix(prefix) {
            s = rest.trim_start().to_string();
            break;
        }
    }
    for suffix in AMOUNT_SUFFIXES {
        if let Some(rest) = s.strip_suffix(suffix) {
            s = rest.trim_end().to_string();
        }
    }

    let negative = s.starts_with('(') && s.ends_with(')');
    let compact: String = s
        .chars()
        .filter(|c| !matches!(c, ',' | ' ' | '_' | '(' | ')'))
        .collect();

    if let Ok(v) = compact.parse::<f64>() {
        return Some(if negative { -v } else { v });
    }

    words_to_number(&s)
}

/// Converts an amount written in English words into a number. Returns
/// `None` when no number word is present or when any word is neither a
/// number word nor currency filler.
pub fn words_to_number(words: &str) -> Option<f64> {
    let normalized = words.to_lowercase().replace([',', '-'], " ");

    let mut total = 0.0;
    let mut current = 0.0;
    let mut recognized = false;

    for token in normalized.split_whitespace() {
        let unit = match token {
            "zero" => 0.0,
            "one" => 1.0,
            "two" => 2.0,
            "three" => 3.0,
            "four" => 4.0,
            "five" => 5.0,
            "six" => 6.0,
            "seven" => 7.0,
            "eight" => 8.0,
            "nine" => 9.0,
            "ten" => 10.0,
            "eleven" => 11.0,
            "twelve" => 12.0,
            "thirteen" => 13.0,
            "fourteen" => 14.0,
            "fifteen" => 15.0,
            "sixteen" => 16.0,
            "seventeen" => 17.0,
            "eighteen" => 18.0,
            "nineteen" => 19.0,
            "twenty" => 20.0,
            "thirty" => 30.0,
            "forty" => 40.0,
            "fifty" => 50.0,
            "sixty" => 60.0,
            "seventy" => 70.0,
            "eighty" => 80.0,
            "ninety" => 90.0,
            "hundred" => {
                recognized = true;
                current = if current == 0.0 { 100.0 } else { current * 100.0 };
                continue;
            }
            "thousand" | "lakh" | "lakhs" | "million" | "crore" | "crores" => {
                let scale = match token {
                    "thousand" => 1_000.0,
                    "lakh" | "lakhs" => 100_000.0,
                    "million" => 1_000_000.0,
                    _ => 10_000_000.0,
                };
                recognized = true;
                let base = if current == 0.0 { 1.0 } else { current };
                total += base * scale;
                current = 0.0;
                continue;
            }
            _ if AMOUNT_FILLER_WORDS.contains(&token) => continue,
            _ => return None,
        };
        recognized = true;
        current += unit;
    }

    if recognized {
        Some(total + current)
    } else {
        None
    }
}

/// Parses the date formats seen on extracted invoices. ISO-8601 dates and
/// date-times (with or without `Z` or an offset) are the primary forms;
/// day-first `dd/mm/yyyy` variants are also accepted.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }

    let without_zulu = s.strip_suffix(['Z', 'z']).unwrap_or(s);
    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(without_zulu, format) {
            return Some(dt.date());
        }
    }

    for format in ["%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return Some(date);
        }
    }

    None
}

pub fn coerce_date(raw: Option<&str>) -> Option<NaiveDate> {
    raw.and_then(parse_date)
}

/// Trims text and drops blanks and OCR placeholders such as `"N/A"`.
pub fn clean_text(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() || MISSING_MARKERS.contains(&trimmed.to_lowercase().as_str()) {
        return None;
    }
    Some(trimmed.to_string())
}

pub fn normalize_tax_id(raw: Option<&str>) -> Option<String> {
    let cleaned = clean_text(raw)?;
    let compact: String = cleaned
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase();
    if compact.is_empty() {
        None
    } else {
        Some(compact)
    }
}

static TAX_ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9]{2}[A-Z]{5}[0-9]{4}[A-Z][1-9A-Z]Z[0-9A-Z]$").expect("tax id pattern compiles")
});
static TERMS_DAYS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]+").expect("terms pattern compiles"));

/// Structural check for a 15-character tax id:
/// 2 digits, 5 letters, 4 digits, 1 letter, 1 of `[1-9A-Z]`, literal `Z`,
/// 1 alphanumeric.
pub fn is_valid_tax_id(tax_id: &str) -> bool {
    TAX_ID_PATTERN.is_match(tax_id)
}

/// Extracts the day count from terms like `"Net 30"` or `"45 days"`.
/// `"immediate"` and `"due on receipt"` mean 0.
pub fn parse_payment_terms(raw: &str) -> Option<u32> {
    let lower = raw.trim().to_lowercase();
    if lower.contains("immediate") || lower.contains("receipt") {
        return Some(0);
    }

    TERMS_DAYS.find(&lower)?.as_str().parse().ok()
}

// ----------------------------------------------------------------------------
// Typed views
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedLineItem {
    pub description: Option<String>,
    pub quantity: f64,
    pub unit_price: f64,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedInvoice {
    pub id: String,
    pub date: Option<NaiveDate>,
    pub tax_id: Option<String>,
    pub tax_id_valid: bool,
    pub vendor_name: Option<String>,
    pub tax_code: Option<String>,
    pub total_amount: f64,
    pub tax_amount: Option<f64>,
    pub line_items: Vec<NormalizedLineItem>,
    pub status: InvoiceStatus,
    pub defaulted_fields: Vec<&'static str>,
}

impl NormalizedInvoice {
    /// Tax id only when it passes [`is_valid_tax_id`].
    pub fn trusted_tax_id(&self) -> Option<&str> {
        if self.tax_id_valid {
            self.tax_id.as_deref()
        } else {
            None
        }
    }

    /// Lower-cased line-item descriptions followed by the vendor name.
    pub fn searchable_text(&self) -> Vec<String> {
        self.line_items
            .iter()
            .filter_map(|item| item.description.as_deref())
            .chain(self.vendor_name.as_deref())
            .map(|s| s.to_lowercase())
            .collect()
    }
}

pub fn normalize_invoice(record: &InvoiceRecord) -> NormalizedInvoice {
    let mut defaulted_fields = Vec::new();

    let date = coerce_date(record.date.as_deref());
    if date.is_none() {
        defaulted_fields.push("date");
    }

    let total = coerce_amount(&record.total_amount);
    if total.defaulted {
        defaulted_fields.push("total_amount");
    }

    let tax_amount = coerce_optional_amount(&record.tax_amount);
    if tax_amount.is_none() {
        defaulted_fields.push("tax_amount");
    }

    let tax_id = normalize_tax_id(record.tax_id.as_deref());
    let tax_id_valid = tax_id.as_deref().map(is_valid_tax_id).unwrap_or(false);

    let line_items = record
        .line_items
        .iter()
        .map(|item| NormalizedLineItem {
            description: clean_text(item.description.as_deref()),
            quantity: coerce_amount(&item.quantity).value,
            unit_price: coerce_amount(&item.unit_price).value,
            amount: coerce_amount(&item.amount).value,
        })
        .collect();

    NormalizedInvoice {
        id: clean_text(record.id.as_deref()).unwrap_or_default(),
        date,
        tax_id,
        tax_id_valid,
        vendor_name: clean_text(record.vendor_name.as_deref()),
        tax_code: clean_text(record.tax_code.as_deref()),
        total_amount: total.value,
        tax_amount,
        line_items,
        status: record
            .status
            .as_deref()
            .map(InvoiceStatus::parse_lenient)
            .unwrap_or(InvoiceStatus::Pending),
        defaulted_fields,
    }
}

pub fn normalize_history(records: &[InvoiceRecord]) -> Vec<NormalizedInvoice> {
    records.iter().map(normalize_invoice).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedVendor {
    pub tax_id: Option<String>,
    pub tax_id_valid: bool,
    pub name: Option<String>,
    pub expected_amount: f64,
    pub payment_terms_days: Option<u32>,
}

pub fn normalize_vendor(record: &VendorMasterRecord) -> NormalizedVendor {
    let tax_id = normalize_tax_id(record.tax_id.as_deref());
    let tax_id_valid = tax_id.as_deref().map(is_valid_tax_id).unwrap_or(false);

    NormalizedVendor {
        tax_id,
        tax_id_valid,
        name: clean_text(record.name.as_deref()),
        expected_amount: coerce_amount(&record.expected_amount).value,
        payment_terms_days: record.payment_terms.as_deref().and_then(parse_payment_terms),
    }
}

// ----------------------------------------------------------------------------
// Raw maps
// ----------------------------------------------------------------------------

fn first_present<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| map.get(*k))
        .find(|v| !v.is_null())
}

fn text_field(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    match first_present(map, keys)? {
        Value::String(s) => clean_text(Some(s)),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_field(map: &Map<String, Value>, keys: &[&str]) -> Value {
    first_present(map, keys).cloned().unwrap_or(Value::Null)
}

fn line_item_from_value(value: &Value) -> LineItem {
    match value {
        Value::Object(map) => LineItem {
            description: text_field(map, &["description", "name", "item"]),
            quantity: value_field(map, &["quantity", "qty"]),
            unit_price: value_field(map, &["unit_price", "rate", "price"]),
            amount: value_field(map, &["amount", "total"]),
        },
        Value::String(s) => LineItem {
            description: clean_text(Some(s)),
            ..Default::default()
        },
        _ => LineItem::default(),
    }
}

/// Builds an [`InvoiceRecord`] from an arbitrary JSON object, accepting the
/// field aliases used by extraction pipelines (`gstin`, `hsn_code`,
/// `invoice_number`, `amount`, `items`, ...). Non-objects yield an empty record.
pub fn invoice_from_value(value: &Value) -> InvoiceRecord {
    let Value::Object(map) = value else {
        return InvoiceRecord::default();
    };

    let line_items = match first_present(map, &["line_items", "items"]) {
        Some(Value::Array(items)) => items.iter().map(line_item_from_value).collect(),
        _ => Vec::new(),
    };

    InvoiceRecord {
        id: text_field(map, &["id", "invoice_id", "invoice_number", "identifier"]),
        date: text_field(map, &["date", "invoice_date"]),
        tax_id: text_field(map, &["tax_id", "gstin", "vendor_gstin", "vendor_tax_id"]),
        vendor_name: text_field(map, &["vendor_name", "vendor"]),
        total_amount: value_field(map, &["total_amount", "amount", "total"]),
        tax_amount: value_field(map, &["tax_amount", "tax", "gst_amount"]),
        tax_code: text_field(map, &["tax_code", "hsn_code", "sac_code", "hsn"]),
        line_items,
        status: text_field(map, &["status"]),
    }
}

pub fn vendor_from_value(value: &Value) -> VendorMasterRecord {
    let Value::Object(map) = value else {
        return VendorMasterRecord::default();
    };

    VendorMasterRecord {
        tax_id: text_field(map, &["tax_id", "gstin"]),
        name: text_field(map, &["name", "vendor_name"]),
        expected_amount: value_field(map, &["expected_amount", "amount"]),
        payment_terms: text_field(map, &["payment_terms", "terms"]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_coerce_amount_variants() {
        assert_eq!(coerce_amount(&json!(1500.5)), Coerced::parsed(1500.5));
        assert_eq!(coerce_amount(&json!("1,23,456.78")), Coerced::parsed(123456.78));
        assert_eq!(coerce_amount(&json!("₹ 2,500")), Coerced::parsed(2500.0));
        assert_eq!(coerce_amount(&json!("Rs. 1200/-")), Coerced::parsed(1200.0));
        assert_eq!(coerce_amount(&json!("$99.99")), Coerced::parsed(99.99));
        assert_eq!(coerce_amount(&json!("12 USD")), Coerced::parsed(12.0));
        assert_eq!(coerce_amount(&json!("450$")), Coerced::parsed(450.0));
    }

    #[test]
    fn test_coerce_amount_never_fails() {
        for bad in [
            json!(null),
            json!("abc"),
            json!(""),
            json!("N/A"),
            json!(true),
            json!([1, 2]),
            json!({"amount": 5}),
            json!(-40.0),
            json!("(250.00)"),
            json!("NaN"),
            json!("inf"),
        ] {
            let coerced = coerce_amount(&bad);
            assert_eq!(coerced.value, 0.0, "input {:?}", bad);
            assert!(coerced.defaulted, "input {:?}", bad);
        }
    }

    #[test]
    fn test_optional_amount_keeps_absence() {
        assert_eq!(coerce_optional_amount(&json!(null)), None);
        assert_eq!(coerce_optional_amount(&json!("junk")), None);
        assert_eq!(coerce_optional_amount(&json!(0)), Some(0.0));
    }

    #[test]
    fn test_words_to_number() {
        assert_eq!(words_to_number("one thousand five hundred"), Some(1500.0));
        assert_eq!(words_to_number("Twenty-Five"), Some(25.0));
        assert_eq!(
            words_to_number("two lakh thirty four thousand and five"),
            Some(234_005.0)
        );
        assert_eq!(words_to_number("hundred"), Some(100.0));
        assert_eq!(words_to_number("no numbers here"), None);
        assert_eq!(words_to_number("see page one"), None);
        assert_eq!(words_to_number("rupees five hundred only"), Some(500.0));
        assert_eq!(coerce_amount(&json!("see page one")), Coerced::defaulted(0.0));

        assert_eq!(
            coerce_amount(&json!("Rupees Three Thousand Only")),
            Coerced::parsed(3000.0)
        );
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        for raw in [
            "2024-03-15",
            "2024-03-15T10:30:00",
            "2024-03-15T10:30:00Z",
            "2024-03-15T10:30:00.123Z",
            "2024-03-15T10:30:00+05:30",
            "2024-03-15 10:30:00",
            "15/03/2024",
            "15-03-2024",
            "15.03.2024",
            "  2024-03-15  ",
        ] {
            assert_eq!(parse_date(raw), Some(expected), "input {}", raw);
        }
    }

    #[test]
    fn test_parse_date_rejects_garbage() {
        for raw in ["", "yesterday", "2024-13-01", "2024-02-30", "03/15/2024"] {
            assert_eq!(parse_date(raw), None, "input {}", raw);
        }
        assert_eq!(coerce_date(None), None);
    }

    #[test]
    fn test_tax_id_validation() {
        assert!(is_valid_tax_id("22AAAAA0000A1Z5"));
        assert!(is_valid_tax_id("27AAPFU0939F1ZV"));
        assert!(!is_valid_tax_id("22AAAAA0000A1Z"));
        assert!(!is_valid_tax_id("22aaaaa0000a1z5"));
        assert!(!is_valid_tax_id("22AAAAA0000A0Z5"));
        assert!(!is_valid_tax_id("22AAAAA0000A1X5"));
        assert!(!is_valid_tax_id("AAAAAAA0000A1Z5"));
        assert!(!is_valid_tax_id(""));
        assert!(!is_valid_tax_id("22AAAAA0000A1Z55"));
        assert!(!is_valid_tax_id("GSTIN 22AAAAA0000A1Z5"));

        assert_eq!(
            normalize_tax_id(Some(" 22aaaaa0000a1z5 ")),
            Some("22AAAAA0000A1Z5".to_string())
        );
        assert_eq!(normalize_tax_id(Some("N/A")), None);
    }

    #[test]
    fn test_payment_terms() {
        assert_eq!(parse_payment_terms("Net 30"), Some(30));
        assert_eq!(parse_payment_terms("45 days"), Some(45));
        assert_eq!(parse_payment_terms("Net 30, 2% if paid in 10"), Some(30));
        assert_eq!(parse_payment_terms("Due on receipt"), Some(0));
        assert_eq!(parse_payment_terms("whenever"), None);
    }

    #[test]
    fn test_normalize_invoice_tracks_defaults() {
        let record = InvoiceRecord::new("INV-9")
            .with_date("not a date")
            .with_total_amount("garbage")
            .with_tax_id("22AAAAA0000A1Z5")
            .with_status("PAID");

        let normalized = normalize_invoice(&record);
        assert_eq!(normalized.total_amount, 0.0);
        assert_eq!(normalized.tax_amount, None);
        assert_eq!(normalized.date, None);
        assert!(normalized.tax_id_valid);
        assert_eq!(normalized.status, InvoiceStatus::Paid);
        assert_eq!(
            normalized.defaulted_fields,
            vec!["date", "total_amount", "tax_amount"]
        );
    }

    #[test]
    fn test_invoice_from_value_aliases() {
        let raw = json!({
            "invoice_id": "INV-001",
            "date": "2024-01-10",
            "gstin": "22AAAAA0000A1Z5",
            "hsn_code": 8471,
            "amount": "11,800.00",
            "tax_amount": 1800,
            "vendor": "Acme Traders",
            "items": [
                {"description": "Laptop", "qty": 1, "rate": 10000, "amount": 10000},
                "Installation"
            ]
        });

        let record = invoice_from_value(&raw);
        assert_eq!(record.id.as_deref(), Some("INV-001"));
        assert_eq!(record.tax_id.as_deref(), Some("22AAAAA0000A1Z5"));
        assert_eq!(record.tax_code.as_deref(), Some("8471"));
        assert_eq!(record.vendor_name.as_deref(), Some("Acme Traders"));
        assert_eq!(record.line_items.len(), 2);

        let normalized = normalize_invoice(&record);
        assert_eq!(normalized.total_amount, 11800.0);
        assert_eq!(normalized.tax_amount, Some(1800.0));
        assert_eq!(normalized.line_items[0].unit_price, 10000.0);
        assert_eq!(normalized.line_items[1].description.as_deref(), Some("Installation"));
    }

    #[test]
    fn test_invoice_from_non_object() {
        assert_eq!(invoice_from_value(&json!([1, 2, 3])), InvoiceRecord::default());
        assert_eq!(invoice_from_value(&json!("text")), InvoiceRecord::default());
    }

    #[test]
    fn test_normalize_vendor() {
        let vendor = vendor_from_value(&json!({
            "gstin": "22AAAAA0000A1Z5",
            "name": "Acme Traders Pvt Ltd",
            "expected_amount": "5000",
            "payment_terms": "Net 15"
        }));
        let normalized = normalize_vendor(&vendor);
        assert!(normalized.tax_id_valid);
        assert_eq!(normalized.expected_amount, 5000.0);
        assert_eq!(normalized.payment_terms_days, Some(15));
    }
}
