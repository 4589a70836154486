// 🌍 Nationality extractor
// One row per (commune, nationality). Foreign share = non-domestic / total × 100.

use super::{Extraction, Extractor, SkipReason};
use crate::metrics::{round_to, FOREIGN_PCT};
use crate::tables::{cell, parse_number, Table};
use anyhow::Result;
use std::collections::BTreeMap;

#[derive(Default)]
struct Tally {
    total: f64,
    domestic: f64,
}

pub struct NationalityExtractor {
    pub name_column: String,
    pub count_column: String,
    pub nationality_column: String,
    /// ISO3 code counted as domestic
    pub domestic_code: String,
}

impl NationalityExtractor {
    pub fn new() -> Self {
        NationalityExtractor {
            name_column: "COMMUNE_NOM".to_string(),
            count_column: "NOMBRE_TOTAL".to_string(),
            nationality_column: "NATIONALITE_ISO3".to_string(),
            domestic_code: "LUX".to_string(),
        }
    }
}

impl Default for NationalityExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor for NationalityExtractor {
    type Output = f64;

    fn layer(&self) -> &'static str {
        FOREIGN_PCT
    }

    fn extract(&self, table: &Table) -> Result<Extraction<f64>> {
        let name_idx = table.column(&self.name_column)?;
        let count_idx = table.column(&self.count_column)?;
        let nationality_idx = table.column(&self.nationality_column)?;

        let mut extraction = Extraction::new(&table.name);
        let mut tallies: BTreeMap<String, Tally> = BTreeMap::new();

        for row in &table.rows {
            let Some(name) = cell(row, name_idx) else {
                extraction.ignored += 1;
                continue;
            };

            let Some(count) = cell(row, count_idx).and_then(parse_number) else {
                extraction.skip(name, SkipReason::MissingValue);
                continue;
            };

            let tally = tallies.entry(name.to_string()).or_default();
            tally.total += count;
            if cell(row, nationality_idx) == Some(self.domestic_code.as_str()) {
                tally.domestic += count;
            }
        }

        for (name, tally) in tallies {
            if tally.total > 0.0 {
                let foreign_pct = (tally.total - tally.domestic) / tally.total * 100.0;
                extraction.values.insert(name, round_to(foreign_pct, 1));
            } else {
                extraction.skip(&name, SkipReason::ZeroTotal);
            }
        }

        Ok(extraction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADERS: &[&str] = &["COMMUNE_NOM", "NATIONALITE_ISO3", "NOMBRE_TOTAL"];

    #[test]
    fn test_foreign_share() {
        let table = Table::from_rows(
            "nat",
            HEADERS,
            vec![
                vec!["Mamer", "LUX", "60"],
                vec!["Mamer", "PRT", "25"],
                vec!["Mamer", "FRA", "15"],
            ],
        );

        let extraction = NationalityExtractor::new().extract(&table).unwrap();

        assert_eq!(extraction.values.get("Mamer"), Some(&40.0));
    }

    #[test]
    fn test_foreign_share_rounds_to_one_decimal() {
        let table = Table::from_rows(
            "nat",
            HEADERS,
            vec![vec!["Kayl", "LUX", "2"], vec!["Kayl", "BEL", "1"]],
        );

        let extraction = NationalityExtractor::new().extract(&table).unwrap();

        assert_eq!(extraction.values.get("Kayl"), Some(&33.3));
    }

    #[test]
    fn test_zero_total_is_excluded() {
        let table = Table::from_rows(
            "nat",
            HEADERS,
            vec![vec!["Empty", "LUX", "0"], vec!["Empty", "DEU", "0"]],
        );

        let extraction = NationalityExtractor::new().extract(&table).unwrap();

        assert!(extraction.is_empty());
        assert_eq!(extraction.skipped.len(), 1);
        assert_eq!(extraction.skipped[0].reason, SkipReason::ZeroTotal);
    }

    #[test]
    fn test_all_domestic_is_zero_percent() {
        let table = Table::from_rows("nat", HEADERS, vec![vec!["Ell", "LUX", "1400"]]);

        let extraction = NationalityExtractor::new().extract(&table).unwrap();

        assert_eq!(extraction.values.get("Ell"), Some(&0.0));
    }

    #[test]
    fn test_unparseable_count_is_not_counted() {
        let table = Table::from_rows(
            "nat",
            HEADERS,
            vec![vec!["Ell", "LUX", "60"], vec!["Ell", "FRA", "n/a"], vec!["Ell", "FRA", "40"]],
        );

        let extraction = NationalityExtractor::new().extract(&table).unwrap();

        assert_eq!(extraction.values.get("Ell"), Some(&40.0));
        assert_eq!(extraction.skipped[0].reason, SkipReason::MissingValue);
    }
}
