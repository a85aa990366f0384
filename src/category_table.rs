use crate::error::{InvoiceIntelError, Result};
use crate::schema::TaxCategory;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryEntry {
    pub default_category: TaxCategory,
    pub reliability_score: f64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Inclusive `[min, max]` invoice total typically seen for this code.
    #[serde(default)]
    pub amount_range: Option<(f64, f64)>,
}

impl CategoryEntry {
    pub fn new(default_category: TaxCategory, reliability_score: f64) -> Self {
        Self {
            default_category,
            reliability_score,
            description: None,
            keywords: Vec::new(),
            amount_range: None,
        }
    }

    pub fn amount_in_range(&self, amount: f64) -> bool {
        match self.amount_range {
            Some((min, max)) => amount >= min && amount <= max,
            None => false,
        }
    }

    /// Keywords plus every description word of four or more letters.
    pub fn match_terms(&self) -> Vec<String> {
        let mut terms: Vec<String> = self.keywords.iter().map(|k| k.to_lowercase()).collect();
        if let Some(description) = &self.description {
            terms.extend(
                description
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|w| w.chars().count() >= 4)
                    .map(|w| w.to_lowercase()),
            );
        }
        terms.sort();
        terms.dedup();
        terms
    }
}

/// Static tax code → category table. Loaded once and shared read-only.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CategoryTable {
    entries: BTreeMap<String, CategoryEntry>,
}

/// Chapter prefix length used when a full code is not in the table.
const HEADING_LEN: usize = 4;

impl CategoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, code: impl Into<String>, entry: CategoryEntry) {
        self.entries.insert(code.into().trim().to_string(), entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, code: &str) -> Option<&CategoryEntry> {
        self.entries.get(code.trim())
    }

    /// Exact lookup, then the 4-character heading. The flag is `true` when the
    /// heading fallback was used.
    pub fn lookup(&self, code: &str) -> Option<(&CategoryEntry, bool)> {
        let code = code.trim();
        if let Some(entry) = self.entries.get(code) {
            return Some((entry, false));
        }
        if code.len() > HEADING_LEN && code.is_char_boundary(HEADING_LEN) {
            return self.entries.get(&code[..HEADING_LEN]).map(|e| (e, true));
        }
        None
    }

    /// Parses the JSON asset. Entries with an unknown category or a
    /// malformed shape are skipped with a warning; only a document that is
    /// not a JSON object fails.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let root: Value = serde_json::from_str(json)?;
        let Value::Object(map) = root else {
            return Err(InvoiceIntelError::CategoryTable(
                "expected a JSON object keyed by tax code".to_string(),
            ));
        };

        let mut table = Self::new();
        for (code, raw) in map {
            match serde_json::from_value::<CategoryEntry>(raw) {
                Ok(mut entry) => {
                    entry.reliability_score = entry.reliability_score.clamp(0.0, 1.0);
                    table.insert(code, entry);
                }
                Err(e) => warn!("Skipping category table entry '{}': {}", code, e),
            }
        }

        debug!("Category table parsed with {} entries", table.len());
        Ok(table)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&contents)
    }

    /// Loads the table, degrading to an empty table when the asset is
    /// missing or unreadable. Every categorization then yields NIL.
    pub fn load_or_empty(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::from_path(path) {
            Ok(table) => {
                info!(
                    "Loaded category table from {} ({} codes)",
                    path.display(),
                    table.len()
                );
                table
            }
            Err(e) => {
                warn!(
                    "Category table unavailable at {}: {}. All categorizations will be NIL",
                    path.display(),
                    e
                );
                Self::new()
            }
        }
    }
}
