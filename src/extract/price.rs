// 🏠 Apartment price extractor
// Observatoire de l'Habitat sheet, positional columns after the title block:
//
//   0: (empty)
//   1: Commune name
//   2: Number of existing apartment sales
//   3: Average €/m² (existing)          - number or "*" when < 10 sales
//   4: Price range (existing)
//   5: Number of new-build (VEFA) sales
//   6: Average €/m² (new build)         - number or "*" when < 10 sales
//   7: Price range (new build)

use super::{Extraction, Extractor, SkipReason};
use crate::metrics::PRICE_M2;
use crate::tables::{cell, parse_number, Table};
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Insufficient-sample marker used by the observatory
pub const SENTINEL: &str = "*";

/// Row labels that are part of the sheet layout, not communes
const LAYOUT_LABELS: &[&str] = &[
    "Commune",
    "Moyenne nationale",
    "Total des transactions",
    "Source :",
];

/// Which price column supplied the value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceCategory {
    Existing,
    NewConstruction,
}

impl PriceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceCategory::Existing => "existing",
            PriceCategory::NewConstruction => "new_construction",
        }
    }
}

/// One commune's price figures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub name: String,
    /// Headline €/m², rounded to whole euros
    pub price_m2: i64,
    pub price_type: PriceCategory,
    pub price_existing: Option<i64>,
    pub price_new: Option<i64>,
    /// Sales count of the category that supplied `price_m2`
    pub n_transactions: Option<u32>,
}

pub struct PriceExtractor {
    pub name_col: usize,
    pub n_existing_col: usize,
    pub price_existing_col: usize,
    pub n_new_col: usize,
    pub price_new_col: usize,
}

impl PriceExtractor {
    pub fn new() -> Self {
        PriceExtractor {
            name_col: 1,
            n_existing_col: 2,
            price_existing_col: 3,
            n_new_col: 5,
            price_new_col: 6,
        }
    }
}

impl Default for PriceExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Sentinel, blank, non-numeric and non-positive cells are all "absent"
pub fn parse_price(raw: Option<&str>) -> Option<f64> {
    let raw = raw?;
    if raw == SENTINEL {
        return None;
    }
    parse_number(raw).filter(|price| *price > 0.0)
}

fn parse_count(raw: Option<&str>) -> Option<u32> {
    parse_number(raw?)
        .filter(|n| *n >= 0.0)
        .map(|n| n.round() as u32)
}

fn is_layout_row(name: &str) -> bool {
    LAYOUT_LABELS.contains(&name)
        || name.contains("Précisions")
        || name.to_lowercase().contains("statistiques")
}

impl Extractor for PriceExtractor {
    type Output = PriceRecord;

    fn layer(&self) -> &'static str {
        PRICE_M2
    }

    fn extract(&self, table: &Table) -> Result<Extraction<PriceRecord>> {
        let mut extraction = Extraction::new(&table.name);

        for row in &table.rows {
            let name = match cell(row, self.name_col) {
                Some(name) if !is_layout_row(name) => name,
                _ => {
                    extraction.ignored += 1;
                    continue;
                }
            };

            let price_existing = parse_price(cell(row, self.price_existing_col));
            let price_new = parse_price(cell(row, self.price_new_col));

            let (price, price_type, n_transactions) = match (price_existing, price_new) {
                (Some(p), _) => (
                    p,
                    PriceCategory::Existing,
                    parse_count(cell(row, self.n_existing_col)),
                ),
                (None, Some(p)) => (
                    p,
                    PriceCategory::NewConstruction,
                    parse_count(cell(row, self.n_new_col)),
                ),
                (None, None) => {
                    extraction.skip(name, SkipReason::InsufficientSample);
                    continue;
                }
            };

            extraction.values.insert(
                name.to_string(),
                PriceRecord {
                    name: name.to_string(),
                    price_m2: price.round() as i64,
                    price_type,
                    price_existing: price_existing.map(|p| p.round() as i64),
                    price_new: price_new.map(|p| p.round() as i64),
                    n_transactions,
                },
            );
        }

        Ok(extraction)
    }
}
