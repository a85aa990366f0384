use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

// ----------------------------------------------------------------------------
// Inputs
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    #[schemars(description = "Captured but not yet reviewed. Also used for unrecognized status strings.")]
    Pending,

    #[schemars(description = "Fields extracted and validated.")]
    Processed,

    #[schemars(description = "Invoice settled, including the tax on it.")]
    Paid,

    #[schemars(description = "Rejected during review.")]
    Rejected,
}

impl InvoiceStatus {
    /// Maps free-form status text onto the closed set. Anything unrecognized
    /// is `Pending`.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "processed" | "validated" | "approved" => InvoiceStatus::Processed,
            "paid" | "settled" => InvoiceStatus::Paid,
            "rejected" | "void" | "cancelled" | "canceled" => InvoiceStatus::Rejected,
            _ => InvoiceStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct LineItem {
    #[serde(default)]
    #[schemars(description = "Free-text description of the goods or service as printed on the invoice")]
    pub description: Option<String>,

    #[serde(default)]
    #[schemars(description = "Quantity. Number or numeric string; unparsable values are treated as 0")]
    pub quantity: Value,

    #[serde(default)]
    #[schemars(description = "Unit price. Number or numeric string; unparsable values are treated as 0")]
    pub unit_price: Value,

    #[serde(default)]
    #[schemars(description = "Line total. Number or numeric string; unparsable values are treated as 0")]
    pub amount: Value,
}

impl LineItem {
    pub fn new(description: impl Into<String>, amount: impl Into<Value>) -> Self {
        Self {
            description: Some(description.into()),
            quantity: Value::Null,
            unit_price: Value::Null,
            amount: amount.into(),
        }
    }
}

/// An invoice as delivered by the extraction pipeline. Every field is
/// optional or loosely typed; the normalizer decides what is usable.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct InvoiceRecord {
    #[serde(default)]
    #[schemars(description = "Invoice identifier (invoice number)")]
    pub id: Option<String>,

    #[serde(default)]
    #[schemars(
        description = "Invoice date. ISO-8601 date or date-time (optional trailing 'Z'), or YYYY-MM-DD. Records with unparsable dates are left out of date-keyed analysis."
    )]
    pub date: Option<String>,

    #[serde(default)]
    #[schemars(
        description = "15-character vendor tax id: 2 digits, 5 letters, 4 digits, 1 letter, 1 alphanumeric, 'Z', 1 alphanumeric"
    )]
    pub tax_id: Option<String>,

    #[serde(default)]
    #[schemars(description = "Vendor name as printed on the invoice")]
    pub vendor_name: Option<String>,

    #[serde(default)]
    #[schemars(description = "Invoice total. Number, numeric string, currency string or amount in words")]
    pub total_amount: Value,

    #[serde(default)]
    #[schemars(description = "Total tax charged on the invoice. Absent when the invoice does not state it")]
    pub tax_amount: Value,

    #[serde(default)]
    #[schemars(description = "Goods/service classification code (HSN/SAC style)")]
    pub tax_code: Option<String>,

    #[serde(default)]
    pub line_items: Vec<LineItem>,

    #[serde(default)]
    #[schemars(description = "Workflow status: pending, processed, paid or rejected")]
    pub status: Option<String>,
}

impl InvoiceRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    pub fn with_tax_id(mut self, tax_id: impl Into<String>) -> Self {
        self.tax_id = Some(tax_id.into());
        self
    }

    pub fn with_vendor_name(mut self, name: impl Into<String>) -> Self {
        self.vendor_name = Some(name.into());
        self
    }

    pub fn with_total_amount(mut self, amount: impl Into<Value>) -> Self {
        self.total_amount = amount.into();
        self
    }

    pub fn with_tax_amount(mut self, amount: impl Into<Value>) -> Self {
        self.tax_amount = amount.into();
        self
    }

    pub fn with_tax_code(mut self, code: impl Into<String>) -> Self {
        self.tax_code = Some(code.into());
        self
    }

    pub fn with_line_item(mut self, item: LineItem) -> Self {
        self.line_items.push(item);
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(InvoiceRecord)
    }

    pub fn schema_as_json() -> Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct VendorMasterRecord {
    #[serde(default)]
    #[schemars(description = "The vendor's registered 15-character tax id")]
    pub tax_id: Option<String>,

    #[serde(default)]
    #[schemars(description = "Registered vendor name")]
    pub name: Option<String>,

    #[serde(default)]
    #[schemars(description = "Amount the vendor is expected to bill")]
    pub expected_amount: Value,

    #[serde(default)]
    #[schemars(description = "Payment terms, e.g. 'Net 30'")]
    pub payment_terms: Option<String>,
}

impl VendorMasterRecord {
    pub fn new(tax_id: impl Into<String>, name: impl Into<String>, expected_amount: impl Into<Value>) -> Self {
        Self {
            tax_id: Some(tax_id.into()),
            name: Some(name.into()),
            expected_amount: expected_amount.into(),
            payment_terms: None,
        }
    }

    pub fn with_payment_terms(mut self, terms: impl Into<String>) -> Self {
        self.payment_terms = Some(terms.into());
        self
    }
}

// ----------------------------------------------------------------------------
// Categorization
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
pub enum TaxCategory {
    #[serde(rename = "NIL")]
    Nil,
    #[serde(rename = "EXEMPT")]
    Exempt,
    #[serde(rename = "0%")]
    Zero,
    #[serde(rename = "5%")]
    Five,
    #[serde(rename = "12%")]
    Twelve,
    #[serde(rename = "18%")]
    Eighteen,
    #[serde(rename = "28%")]
    TwentyEight,
}

impl TaxCategory {
    pub const ALL: [TaxCategory; 7] = [
        TaxCategory::Nil,
        TaxCategory::Exempt,
        TaxCategory::Zero,
        TaxCategory::Five,
        TaxCategory::Twelve,
        TaxCategory::Eighteen,
        TaxCategory::TwentyEight,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaxCategory::Nil => "NIL",
            TaxCategory::Exempt => "EXEMPT",
            TaxCategory::Zero => "0%",
            TaxCategory::Five => "5%",
            TaxCategory::Twelve => "12%",
            TaxCategory::Eighteen => "18%",
            TaxCategory::TwentyEight => "28%",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let wanted = raw.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(wanted))
    }

    /// Tax rate as a fraction. `None` for categories outside the rate ladder.
    pub fn rate(&self) -> Option<f64> {
        match self {
            TaxCategory::Nil | TaxCategory::Exempt => None,
            TaxCategory::Zero => Some(0.0),
            TaxCategory::Five => Some(0.05),
            TaxCategory::Twelve => Some(0.12),
            TaxCategory::Eighteen => Some(0.18),
            TaxCategory::TwentyEight => Some(0.28),
        }
    }

    pub fn is_positive_rate(&self) -> bool {
        self.rate().map(|r| r > 0.0).unwrap_or(false)
    }
}

impl fmt::Display for TaxCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct CategorizationResult {
    pub category: TaxCategory,
    pub tax_code: String,
    /// Always within `[0, 1]`.
    pub confidence: f64,
    pub notes: Vec<String>,
}

// ----------------------------------------------------------------------------
// Reconciliation
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconciliationStatus {
    Matched,
    PartialMatch,
    Mismatch,
    /// No vendor master record was available to compare against.
    Pending,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ReconciliationResult {
    pub status: ReconciliationStatus,
    pub invoice_id: String,
    pub invoice_tax_id: String,
    pub vendor_tax_id: String,
    pub id_matched: bool,
    pub amount_matched: bool,
    pub confidence: f64,
    pub notes: Vec<String>,
}

// ----------------------------------------------------------------------------
// Fraud
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
pub enum FraudReason {
    #[serde(rename = "duplicate identifier same day")]
    DuplicateIdentifierSameDay,
    #[serde(rename = "abnormal amount")]
    AbnormalAmount,
    #[serde(rename = "suspicious frequency pattern")]
    SuspiciousFrequencyPattern,
}

impl FraudReason {
    /// Confidence added when this rule fires.
    pub fn increment(&self) -> f64 {
        match self {
            FraudReason::DuplicateIdentifierSameDay => 0.3,
            FraudReason::AbnormalAmount => 0.3,
            FraudReason::SuspiciousFrequencyPattern => 0.4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FraudReason::DuplicateIdentifierSameDay => "duplicate identifier same day",
            FraudReason::AbnormalAmount => "abnormal amount",
            FraudReason::SuspiciousFrequencyPattern => "suspicious frequency pattern",
        }
    }
}

impl fmt::Display for FraudReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct FraudResult {
    pub risk_level: RiskLevel,
    pub invoice_id: String,
    pub tax_id: String,
    /// Isolation-style outlier score in `(-1, 1)`; negative means more anomalous.
    pub anomaly_score: f64,
    /// Sum of the fired rule increments, clamped to `[0, 1]`.
    pub confidence: f64,
    pub reasons: Vec<FraudReason>,
    pub history_size: usize,
    pub notes: Vec<String>,
}

// ----------------------------------------------------------------------------
// Cash flow
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trend::Increasing => f.write_str("increasing"),
            Trend::Decreasing => f.write_str("decreasing"),
            Trend::Stable => f.write_str("stable"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct MonthlyTotal {
    /// First day of the calendar month.
    pub period: NaiveDate,
    pub total: f64,
    pub record_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct CashFlowForecastPoint {
    pub date: NaiveDate,
    pub predicted_amount: f64,
    /// `(low, high)`; a normal-approximation band, not a fitted interval.
    pub confidence_interval: (f64, f64),
    pub contributing_factors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CashFlowRiskFactor {
    VendorConcentration { vendor: String, share: f64 },
    DecliningTrend,
    LowCashflow { total_inflow: f64, threshold: f64 },
    IrregularCadence { average_gap_days: f64 },
    AnalysisFailed { reason: String },
}

impl fmt::Display for CashFlowRiskFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CashFlowRiskFactor::VendorConcentration { vendor, share } => write!(
                f,
                "High vendor concentration: {} accounts for {:.1}% of inflow",
                vendor,
                share * 100.0
            ),
            CashFlowRiskFactor::DecliningTrend => f.write_str("Declining cash flow trend"),
            CashFlowRiskFactor::LowCashflow {
                total_inflow,
                threshold,
            } => write!(
                f,
                "Low cash flow: total inflow {:.2} below {:.2}",
                total_inflow, threshold
            ),
            CashFlowRiskFactor::IrregularCadence { average_gap_days } => write!(
                f,
                "Irregular payment cadence: average gap {:.1} days",
                average_gap_days
            ),
            CashFlowRiskFactor::AnalysisFailed { reason } => {
                write!(f, "Analysis failed: {}", reason)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct CashFlowAnalysis {
    pub monthly_totals: Vec<MonthlyTotal>,
    pub trend: Trend,
    pub total_inflow: f64,
    pub forecast: Vec<CashFlowForecastPoint>,
    pub risk_factors: Vec<CashFlowRiskFactor>,
}

impl CashFlowAnalysis {
    /// The zeroed result returned when the history cannot be analysed.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            monthly_totals: Vec::new(),
            trend: Trend::Stable,
            total_inflow: 0.0,
            forecast: Vec::new(),
            risk_factors: vec![CashFlowRiskFactor::AnalysisFailed {
                reason: reason.into(),
            }],
        }
    }
}

// ----------------------------------------------------------------------------
// Compliance
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceStatus {
    Compliant,
    Warning,
    NonCompliant,
    Pending,
}

impl ComplianceStatus {
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            ComplianceStatus::Compliant
        } else if score >= 70.0 {
            ComplianceStatus::Warning
        } else if score >= 50.0 {
            ComplianceStatus::NonCompliant
        } else {
            ComplianceStatus::Pending
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ReturnDue {
    /// `YYYY-MM` of the tax period.
    pub period: String,
    pub due_date: NaiveDate,
    pub tax_amount: f64,
    pub overdue: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct Penalty {
    pub period: String,
    pub tax_amount: f64,
    pub days_overdue: i64,
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ComplianceReport {
    pub total_tax_collected: f64,
    pub total_tax_paid: f64,
    pub net_tax_liability: f64,
    /// Always within `[0, 100]`.
    pub compliance_score: f64,
    pub status: ComplianceStatus,
    pub returns_due: Vec<ReturnDue>,
    pub penalties: Vec<Penalty>,
    pub recommendations: Vec<String>,
    pub record_count: usize,
}
