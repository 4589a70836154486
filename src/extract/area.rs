// 📐 Area extractor
// Cadastre surface in m², published as km² with 2 decimals.

use super::{Extraction, Extractor, SkipReason};
use crate::metrics::{round_to, AREA_KM2};
use crate::tables::{cell, parse_number, Table};
use anyhow::Result;

const M2_PER_KM2: f64 = 1_000_000.0;

pub struct AreaExtractor {
    pub name_column: String,
    pub area_column: String,
}

impl AreaExtractor {
    pub fn new() -> Self {
        AreaExtractor {
            name_column: "COMMUNE".to_string(),
            area_column: "SURFACE_GEOMETRIQUE_COMMUNE_[m2]".to_string(),
        }
    }
}

impl Default for AreaExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor for AreaExtractor {
    type Output = f64;

    fn layer(&self) -> &'static str {
        AREA_KM2
    }

    fn extract(&self, table: &Table) -> Result<Extraction<f64>> {
        let name_idx = table.column(&self.name_column)?;
        let area_idx = table.column(&self.area_column)?;

        let mut extraction = Extraction::new(&table.name);

        for row in &table.rows {
            let Some(name) = cell(row, name_idx) else {
                extraction.ignored += 1;
                continue;
            };

            match cell(row, area_idx).and_then(parse_number) {
                Some(m2) => {
                    extraction
                        .values
                        .insert(name.to_string(), round_to(m2 / M2_PER_KM2, 2));
                }
                None => extraction.skip(name, SkipReason::MissingValue),
            }
        }

        Ok(extraction)
    }
}
