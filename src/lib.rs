//! # Invoice Intel
//!
//! A library for turning noisy, OCR-extracted invoice records into scored
//! financial signals. Every analysis tolerates missing and malformed fields
//! and always returns a well-formed, confidence-scored result.
//!
//! ## Core Concepts
//!
//! - **Normalization**: loosely-typed records (amounts as numbers, strings, currency
//!   text or words) are coerced into typed values before any analysis runs
//! - **Categorization**: tax code lookup in an injected category table, with
//!   exemption and zero-rating overrides
//! - **Reconciliation**: tax id and amount matching against vendor master data
//! - **Fraud**: rule checks blended with an isolation-forest outlier score
//! - **Cash flow**: monthly aggregation, trend and a moving-average projection
//! - **Compliance**: completeness scoring, return schedule and penalties
//!
//! ## Example
//!
//! ```rust,ignore
//! use invoice_intel::*;
//! use std::sync::Arc;
//!
//! let table = Arc::new(CategoryTable::load_or_empty("data/hsn_mapping.json"));
//! let analyzer = InvoiceAnalyzer::new(EngineConfig::default(), table)?;
//!
//! let invoice = InvoiceRecord::new("INV-001")
//!     .with_date("2024-06-01")
//!     .with_tax_id("27AAPFU0939F1ZV")
//!     .with_tax_code("8471")
//!     .with_total_amount("Rs. 59,000/-")
//!     .with_tax_amount(9000);
//!
//! let category = analyzer.categorize(&invoice);
//! let report = analyzer.score_compliance(&[invoice]);
//! ```

pub mod anomaly;
pub mod categorization;
pub mod category_table;
pub mod compliance;
pub mod config;
pub mod error;
pub mod forecast;
pub mod fraud;
pub mod normalize;
pub mod reconciliation;
pub mod schema;
pub mod utils;

pub use anomaly::{IsolationForest, OutlierScorer};
pub use categorization::CategorizationEngine;
pub use category_table::{CategoryEntry, CategoryTable};
pub use compliance::ComplianceScorer;
pub use config::*;
pub use error::{InvoiceIntelError, Result};
pub use forecast::{monthly_totals, trend, CashFlowForecaster};
pub use fraud::FraudEngine;
pub use normalize::*;
pub use reconciliation::{ReconciliationEngine, VendorDirectory};
pub use schema::*;

use chrono::{NaiveDate, Utc};
use log::{debug, info};
use std::sync::Arc;

/// One entry point over every engine, sharing a single validated
/// configuration and category table.
pub struct InvoiceAnalyzer {
    config: EngineConfig,
    categorizer: CategorizationEngine,
    reconciler: ReconciliationEngine,
    fraud: FraudEngine,
    forecaster: CashFlowForecaster,
    compliance: ComplianceScorer,
}

impl InvoiceAnalyzer {
    pub fn new(config: EngineConfig, table: Arc<CategoryTable>) -> Result<Self> {
        config.validate()?;

        info!(
            "Invoice analyzer ready with {} category codes",
            table.len()
        );
        debug!("Engine configuration: {:?}", config);

        Ok(Self {
            categorizer: CategorizationEngine::new(table),
            reconciler: ReconciliationEngine::new(config.reconciliation.clone()),
            fraud: FraudEngine::new(config.fraud.clone()),
            forecaster: CashFlowForecaster::new(config.forecast.clone()),
            compliance: ComplianceScorer::new(config.compliance.clone()),
            config,
        })
    }

    /// Swaps the outlier model used by fraud scoring.
    pub fn with_outlier_scorer(mut self, scorer: Box<dyn OutlierScorer>) -> Self {
        self.fraud = FraudEngine::with_scorer(self.config.fraud.clone(), scorer);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn category_table(&self) -> &CategoryTable {
        self.categorizer.table()
    }

    pub fn categorize(&self, invoice: &InvoiceRecord) -> CategorizationResult {
        self.categorizer.categorize(invoice)
    }

    /// Reconciles against today's UTC date.
    pub fn reconcile(
        &self,
        invoice: &InvoiceRecord,
        vendor: &VendorMasterRecord,
    ) -> ReconciliationResult {
        self.reconcile_as_of(invoice, vendor, today())
    }

    pub fn reconcile_as_of(
        &self,
        invoice: &InvoiceRecord,
        vendor: &VendorMasterRecord,
        as_of: NaiveDate,
    ) -> ReconciliationResult {
        self.reconciler.reconcile(invoice, vendor, as_of)
    }

    pub fn reconcile_against_directory(
        &self,
        invoice: &InvoiceRecord,
        directory: &VendorDirectory,
        as_of: NaiveDate,
    ) -> ReconciliationResult {
        self.reconciler
            .reconcile_against_directory(invoice, directory, as_of)
    }

    pub fn detect_fraud(&self, invoice: &InvoiceRecord, history: &[InvoiceRecord]) -> FraudResult {
        self.fraud.detect_fraud(invoice, history)
    }

    pub fn forecast_cashflow(
        &self,
        history: &[InvoiceRecord],
        horizon: usize,
    ) -> Vec<CashFlowForecastPoint> {
        self.forecaster.forecast(history, horizon)
    }

    /// Monthly totals, trend, the default-horizon forecast and risk factors.
    pub fn analyze_cashflow(&self, history: &[InvoiceRecord]) -> CashFlowAnalysis {
        self.forecaster.analyze(history)
    }

    /// Scores against today's UTC date.
    pub fn score_compliance(&self, records: &[InvoiceRecord]) -> ComplianceReport {
        self.score_compliance_as_of(records, today())
    }

    pub fn score_compliance_as_of(
        &self,
        records: &[InvoiceRecord],
        as_of: NaiveDate,
    ) -> ComplianceReport {
        self.compliance.score(records, as_of)
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}
