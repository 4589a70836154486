// 🧮 Metric Extractors
// One extractor per official table. Each turns rows into {raw name → value}
// and keeps a record of every row it refused.
//
// Extractors never resolve names: raw source spellings go out as-is and the
// merger decides what they map to.

pub mod area;
pub mod nationality;
pub mod population;
pub mod price;

pub use area::AreaExtractor;
pub use nationality::NationalityExtractor;
pub use population::PopulationExtractor;
pub use price::{PriceCategory, PriceExtractor, PriceRecord};

use crate::tables::Table;
use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Extractor - core trait, one implementation per source table
pub trait Extractor {
    type Output;

    /// Metric layer this extractor feeds
    fn layer(&self) -> &'static str;

    /// Pure transformation; errors only for schema problems (missing columns)
    fn extract(&self, table: &Table) -> Result<Extraction<Self::Output>>;
}

/// Why a row produced no value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Population columns sum to zero: no data, not a value of zero
    ZeroPopulation,
    /// Required numeric cell blank or unparseable
    MissingValue,
    /// Sentinel / missing in every price column
    InsufficientSample,
    /// Nationality counts sum to zero
    ZeroTotal,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::ZeroPopulation => "zero population",
            SkipReason::MissingValue => "missing value",
            SkipReason::InsufficientSample => "insufficient data",
            SkipReason::ZeroTotal => "zero total",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedRow {
    pub name: String,
    pub reason: SkipReason,
}

/// Output of one extractor run
#[derive(Debug, Clone)]
pub struct Extraction<T> {
    /// Table the values came from
    pub table: String,
    pub values: BTreeMap<String, T>,
    pub skipped: Vec<SkippedRow>,
    /// Header, footer and blank rows that are not commune data
    pub ignored: usize,
}

impl<T> Extraction<T> {
    pub fn new(table: &str) -> Self {
        Extraction {
            table: table.to_string(),
            values: BTreeMap::new(),
            skipped: Vec::new(),
            ignored: 0,
        }
    }

    pub fn skip(&mut self, name: &str, reason: SkipReason) {
        tracing::debug!(table = %self.table, name, %reason, "row skipped");
        self.skipped.push(SkippedRow {
            name: name.to_string(),
            reason,
        });
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Skip counts grouped by reason, for run summaries
    pub fn skip_counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for row in &self.skipped {
            *counts.entry(row.reason.as_str()).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_counts() {
        let mut extraction: Extraction<i64> = Extraction::new("t");
        extraction.skip("A", SkipReason::MissingValue);
        extraction.skip("B", SkipReason::MissingValue);
        extraction.skip("C", SkipReason::ZeroPopulation);

        let counts = extraction.skip_counts();
        assert_eq!(counts.get("missing value"), Some(&2));
        assert_eq!(counts.get("zero population"), Some(&1));
        assert!(extraction.is_empty());
    }
}
