use anyhow::Result;
use chrono::NaiveDate;
use invoice_intel::*;
use serde_json::json;
use std::sync::Arc;

const GSTIN: &str = "27AAPFU0939F1ZV";

const DAILY_HISTORY_CSV: &str = "\
id,date,gstin,vendor,total,tax,hsn,status
H-1,2024-03-01,27AAPFU0939F1ZV,Acme Traders,1000,180,8471,paid
H-2,2024-03-02,27AAPFU0939F1ZV,Acme Traders,1000,180,8471,paid
H-3,2024-03-03,27AAPFU0939F1ZV,Acme Traders,1000,180,8471,pending
H-4,2024-03-04,27AAPFU0939F1ZV,Acme Traders,1000,180,8471,pending
H-5,2024-03-05,27AAPFU0939F1ZV,Acme Traders,1000,180,8471,pending
";

const MIXED_HISTORY_CSV: &str = "\
id,date,gstin,vendor,total,tax,hsn,status
M-1,2024-01-15,27AAPFU0939F1ZV,Acme Traders,\"12,000\",2160,8471,paid
M-2,15/02/2024,29AAGCB7383J1Z4,Bharat Supplies,Rs. 8500,1530,9983,paid
M-3,2024-03-20,,Unknown Stall,2000,,,pending
M-4,not a date,27AAPFU0939F1ZV,Acme Traders,garbage,N/A,8471,
M-5,2024-04-02,27AAPFU0939F1ZV,Acme Traders,-50,0,0401,processed
";

fn analyzer() -> Result<InvoiceAnalyzer> {
    let table = CategoryTable::from_json_str(include_str!("../data/hsn_mapping.json"))?;
    Ok(InvoiceAnalyzer::new(EngineConfig::default(), Arc::new(table))?)
}

fn history_from_csv(data: &str) -> Result<Vec<InvoiceRecord>> {
    let mut reader = csv::Reader::from_reader(data.as_bytes());
    let mut records = Vec::new();

    for row in reader.records() {
        let row = row?;
        let cell = |i: usize| row.get(i).map(str::trim).filter(|s| !s.is_empty());

        let mut record = InvoiceRecord::new(cell(0).unwrap_or_default());
        if let Some(date) = cell(1) {
            record = record.with_date(date);
        }
        if let Some(gstin) = cell(2) {
            record = record.with_tax_id(gstin);
        }
        if let Some(vendor) = cell(3) {
            record = record.with_vendor_name(vendor);
        }
        if let Some(total) = cell(4) {
            record = record.with_total_amount(total);
        }
        if let Some(tax) = cell(5) {
            record = record.with_tax_amount(tax);
        }
        if let Some(code) = cell(6) {
            record = record.with_tax_code(code);
        }
        if let Some(status) = cell(7) {
            record = record.with_status(status);
        }
        records.push(record);
    }

    Ok(records)
}

fn monthly_history(totals: &[f64]) -> Vec<InvoiceRecord> {
    totals
        .iter()
        .enumerate()
        .map(|(i, total)| {
            InvoiceRecord::new(format!("MH-{}", i))
                .with_date(format!("2024-{:02}-10", i + 1))
                .with_vendor_name(format!("Customer {}", i))
                .with_total_amount(*total)
        })
        .collect()
}

#[test]
fn test_shipped_table_categorization() -> Result<()> {
    let analyzer = analyzer()?;
    assert!(analyzer.category_table().len() >= 5);

    let laptop = InvoiceRecord::new("INV-100")
        .with_tax_code("8471")
        .with_total_amount(55_000)
        .with_tax_amount(9_900)
        .with_line_item(LineItem::new("Lenovo laptop", 55_000));
    let result = analyzer.categorize(&laptop);
    assert_eq!(result.category, TaxCategory::Eighteen);
    assert!((result.confidence - 1.0).abs() < 1e-12);

    let milk = InvoiceRecord::new("INV-101").with_tax_code("0401").with_total_amount(400);
    assert_eq!(analyzer.categorize(&milk).category, TaxCategory::Exempt);

    for record in [
        InvoiceRecord::new("INV-102"),
        InvoiceRecord::new("INV-103").with_tax_code("0000"),
    ] {
        let result = analyzer.categorize(&record);
        assert_eq!(result.category, TaxCategory::Nil);
        assert_eq!(result.confidence, 0.0);
    }

    println!("✓ Categorization against shipped table passed");
    Ok(())
}

#[test]
fn test_raw_extraction_output() -> Result<()> {
    let analyzer = analyzer()?;
    let raw = json!({
        "invoice_number": "OCR-77",
        "invoice_date": "05/06/2024",
        "gstin": " 27aapfu0939f1zv ",
        "hsn_code": "1006",
        "total_amount": "₹ 2,500.00",
        "tax_amount": "one hundred twenty five",
        "items": [{"description": "Basmati rice 25kg", "amount": 2500}]
    });

    let record = invoice_from_value(&raw);
    let normalized = normalize_invoice(&record);
    assert_eq!(normalized.id, "OCR-77");
    assert_eq!(normalized.date, NaiveDate::from_ymd_opt(2024, 6, 5));
    assert_eq!(normalized.trusted_tax_id(), Some(GSTIN));
    assert_eq!(normalized.total_amount, 2500.0);
    assert_eq!(normalized.tax_amount, Some(125.0));

    let result = analyzer.categorize(&record);
    assert_eq!(result.category, TaxCategory::Five);
    assert!(result.confidence > 0.8 && result.confidence <= 1.0);

    // Nothing usable at all still normalizes
    let junk = normalize_invoice(&invoice_from_value(&json!({"total_amount": {"nested": true}})));
    assert_eq!(junk.total_amount, 0.0);
    assert!(junk.defaulted_fields.contains(&"total_amount"));

    println!("✓ Raw extraction output normalization passed");
    Ok(())
}

#[test]
fn test_reconciliation_outcomes() -> Result<()> {
    let analyzer = analyzer()?;
    let as_of = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
    let vendor = VendorMasterRecord::new(GSTIN, "Acme Traders Pvt Ltd", 1000).with_payment_terms("Net 30");

    let invoice = InvoiceRecord::new("INV-200")
        .with_tax_id(GSTIN)
        .with_vendor_name("ACME TRADERS")
        .with_date("2024-06-10")
        .with_total_amount(1000.5);
    let result = analyzer.reconcile_as_of(&invoice, &vendor, as_of);
    assert_eq!(result.status, ReconciliationStatus::Matched);
    assert!(result.id_matched && result.amount_matched);

    let half = VendorMasterRecord::new(GSTIN, "Acme Traders", 2000);
    let invoice = invoice.with_total_amount(1000);
    let result = analyzer.reconcile_as_of(&invoice, &half, as_of);
    assert_eq!(result.status, ReconciliationStatus::PartialMatch);
    assert!(result.id_matched);
    assert!(!result.amount_matched);

    let directory = VendorDirectory::from_records(vec![vendor]);
    let stranger = InvoiceRecord::new("INV-201").with_tax_id("29AAGCB7383J1Z4");
    let result = analyzer.reconcile_against_directory(&stranger, &directory, as_of);
    assert_eq!(result.status, ReconciliationStatus::Pending);
    assert_eq!(result.confidence, 0.0);

    println!("✓ Reconciliation outcomes passed");
    Ok(())
}

#[test]
fn test_fraud_on_daily_csv_history() -> Result<()> {
    let analyzer = analyzer()?;
    let history = history_from_csv(DAILY_HISTORY_CSV)?;
    assert_eq!(history.len(), 5);

    let invoice = InvoiceRecord::new("NEW-1")
        .with_tax_id(GSTIN)
        .with_date("2024-03-12")
        .with_total_amount(1000)
        .with_tax_amount(180);
    let result = analyzer.detect_fraud(&invoice, &history);

    assert!(result.reasons.contains(&FraudReason::SuspiciousFrequencyPattern));
    assert!(!result.reasons.contains(&FraudReason::AbnormalAmount));
    assert!(result.confidence >= 0.4);
    assert!(result.anomaly_score > -1.0 && result.anomaly_score < 1.0);
    assert!(result.notes.iter().any(|n| n.contains("low-confidence")));

    assert_eq!(analyzer.detect_fraud(&invoice, &history), result);

    let json = serde_json::to_value(&result)?;
    assert_eq!(json["reasons"][0], "suspicious frequency pattern");

    println!("✓ Fraud scoring on CSV history passed");
    Ok(())
}

#[test]
fn test_fraud_zero_sigma_history() -> Result<()> {
    let analyzer = analyzer()?;
    let history = vec![
        InvoiceRecord::new("A").with_total_amount(500),
        InvoiceRecord::new("B").with_total_amount(500),
        InvoiceRecord::new("C").with_total_amount(500),
    ];
    let at_mean = InvoiceRecord::new("D").with_total_amount(500);
    let result = analyzer.detect_fraud(&at_mean, &history);
    assert!(!result.reasons.contains(&FraudReason::AbnormalAmount));

    println!("✓ Zero-sigma history passed");
    Ok(())
}

#[test]
fn test_cashflow_trend_and_bands() -> Result<()> {
    let analyzer = analyzer()?;

    let stable = analyzer.analyze_cashflow(&monthly_history(&[100.0, 100.0, 100.0]));
    assert_eq!(stable.trend, Trend::Stable);
    assert_eq!(stable.monthly_totals.len(), 3);

    let rising = analyzer.analyze_cashflow(&monthly_history(&[100.0, 200.0]));
    assert_eq!(rising.trend, Trend::Increasing);

    let history = history_from_csv(MIXED_HISTORY_CSV)?;
    let points = analyzer.forecast_cashflow(&history, 45);
    assert_eq!(points.len(), 45);
    assert_eq!(points[0].date, NaiveDate::from_ymd_opt(2024, 4, 3).unwrap());
    for point in &points {
        let (low, high) = point.confidence_interval;
        assert!(low <= point.predicted_amount && point.predicted_amount <= high);
        assert!(point.predicted_amount >= 0.0);
    }

    let analysis = analyzer.analyze_cashflow(&history);
    assert_eq!(analysis.forecast.len(), 30);
    assert!(analysis
        .risk_factors
        .iter()
        .any(|f| matches!(f, CashFlowRiskFactor::VendorConcentration { vendor, .. } if vendor == "Acme Traders")));

    println!("✓ Cash flow trend and band checks passed");
    Ok(())
}

#[test]
fn test_compliance_reports() -> Result<()> {
    let analyzer = analyzer()?;
    let as_of = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();

    let complete: Vec<InvoiceRecord> = history_from_csv(DAILY_HISTORY_CSV)?;
    let report = analyzer.score_compliance_as_of(&complete, as_of);
    assert_eq!(report.compliance_score, 100.0);
    assert_eq!(report.status, ComplianceStatus::Compliant);
    assert_eq!(report.total_tax_collected, 900.0);
    assert_eq!(report.total_tax_paid, 360.0);
    assert!((report.net_tax_liability - 540.0).abs() < 1e-9);
    assert_eq!(report.returns_due.len(), 1);
    assert_eq!(report.returns_due[0].due_date, NaiveDate::from_ymd_opt(2024, 4, 20).unwrap());
    assert_eq!(report.penalties.len(), 1);
    assert_eq!(report.penalties[0].days_overdue, 71);

    let half_missing: Vec<InvoiceRecord> = complete
        .iter()
        .take(4)
        .enumerate()
        .map(|(i, r)| {
            let mut r = r.clone();
            if i % 2 == 0 {
                r.tax_id = None;
            }
            r
        })
        .collect();
    let report = analyzer.score_compliance_as_of(&half_missing, as_of);
    assert!(report.compliance_score <= 85.0);

    let mixed = history_from_csv(MIXED_HISTORY_CSV)?;
    let first = analyzer.score_compliance_as_of(&mixed, as_of);
    let second = analyzer.score_compliance_as_of(&mixed, as_of);
    assert_eq!(first, second);
    assert!((0.0..=100.0).contains(&first.compliance_score));
    assert!(!first.recommendations.is_empty());

    println!("✓ Compliance reports passed");
    Ok(())
}

#[test]
fn test_repeated_runs_are_identical() -> Result<()> {
    let analyzer = analyzer()?;
    let as_of = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
    let history = history_from_csv(MIXED_HISTORY_CSV)?;
    let vendor = VendorMasterRecord::new(GSTIN, "Acme Traders", "12000");

    for record in &history {
        assert_eq!(analyzer.categorize(record), analyzer.categorize(record));
        assert_eq!(
            analyzer.reconcile_as_of(record, &vendor, as_of),
            analyzer.reconcile_as_of(record, &vendor, as_of)
        );
        let result = analyzer.categorize(record);
        assert!((0.0..=1.0).contains(&result.confidence));
    }

    println!("✓ Idempotence checks passed");
    Ok(())
}

#[test]
fn test_config_and_schema() -> Result<()> {
    let config = EngineConfig::from_json_str(
        r#"{"forecast": {"horizon_days": 7}, "compliance": {"return_due_day": 11}}"#,
    )?;
    let table = Arc::new(CategoryTable::new());
    let analyzer = InvoiceAnalyzer::new(config, table)?;

    let history = monthly_history(&[100.0, 120.0]);
    assert_eq!(analyzer.analyze_cashflow(&history).forecast.len(), 7);

    let report = analyzer.score_compliance_as_of(
        &history,
        NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
    );
    assert_eq!(
        report.returns_due[0].due_date,
        NaiveDate::from_ymd_opt(2024, 2, 11).unwrap()
    );

    let schema = InvoiceRecord::schema_as_json()?;
    assert!(schema.contains("tax_code"));
    assert!(schema.contains("vendor_name"));

    println!("✓ Config and schema checks passed");
    Ok(())
}
