// 👥 Population extractor
// RNPP population per commune: total = four sub-population columns.

use super::{Extraction, Extractor, SkipReason};
use crate::metrics::POPULATION;
use crate::tables::{cell, parse_number, Table};
use anyhow::Result;

pub struct PopulationExtractor {
    pub name_column: String,
    /// Minors / adults by sex
    pub count_columns: [String; 4],
}

impl PopulationExtractor {
    pub fn new() -> Self {
        PopulationExtractor {
            name_column: "COMMUNE_NOM".to_string(),
            count_columns: [
                "FEMMES_MINEURES".to_string(),
                "HOMMES_MINEURS".to_string(),
                "FEMMES_MAJEURES".to_string(),
                "HOMMES_MAJEURS".to_string(),
            ],
        }
    }
}

impl Default for PopulationExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor for PopulationExtractor {
    type Output = i64;

    fn layer(&self) -> &'static str {
        POPULATION
    }

    fn extract(&self, table: &Table) -> Result<Extraction<i64>> {
        let name_idx = table.column(&self.name_column)?;
        let mut count_idx = [0usize; 4];
        for (slot, column) in count_idx.iter_mut().zip(&self.count_columns) {
            *slot = table.column(column)?;
        }

        let mut extraction = Extraction::new(&table.name);

        for row in &table.rows {
            let Some(name) = cell(row, name_idx) else {
                extraction.ignored += 1;
                continue;
            };

            let counts: Option<Vec<f64>> = count_idx
                .iter()
                .map(|&i| cell(row, i).and_then(parse_number))
                .collect();

            let Some(counts) = counts else {
                extraction.skip(name, SkipReason::MissingValue);
                continue;
            };

            let total = counts.iter().sum::<f64>().round() as i64;
            if total <= 0 {
                extraction.skip(name, SkipReason::ZeroPopulation);
                continue;
            }

            extraction.values.insert(name.to_string(), total);
        }

        Ok(extraction)
    }
}
