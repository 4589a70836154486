// 📏 Metric values + provenance
// Every number attached to a commune carries where it came from.

use crate::error::PipelineError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

// ============================================================================
// LAYER NAMES
// ============================================================================

pub const POPULATION: &str = "population";
pub const AREA_KM2: &str = "area_km2";
pub const DENSITY: &str = "density";
pub const FOREIGN_PCT: &str = "foreign_pct";
pub const PRICE_M2: &str = "price_m2";
pub const PRICE_M2_NEW: &str = "price_m2_new";

// ============================================================================
// QUANTITY
// ============================================================================

/// Numeric payload of a metric
///
/// Counts serialize as JSON integers, measures as JSON floats, so
/// `population: 50` never turns into `50.0` on a rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Quantity {
    Count(i64),
    Measure(f64),
}

impl Quantity {
    pub fn as_f64(&self) -> f64 {
        match self {
            Quantity::Count(n) => *n as f64,
            Quantity::Measure(x) => *x,
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quantity::Count(n) => write!(f, "{}", n),
            Quantity::Measure(x) => write!(f, "{}", x),
        }
    }
}

/// Round half away from zero to `decimals` places
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

// ============================================================================
// PROVENANCE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub year: i32,
    pub source: String,
    pub source_url: String,
}

impl Provenance {
    pub fn new(year: i32, source: impl Into<String>, source_url: impl Into<String>) -> Self {
        Provenance {
            year,
            source: source.into(),
            source_url: source_url.into(),
        }
    }

    /// Provenance is usable only when every field is filled in
    pub fn is_complete(&self) -> bool {
        self.year > 0 && !self.source.trim().is_empty() && !self.source_url.trim().is_empty()
    }
}

/// A value plus provenance, as stored under `data.<layer>` in a commune record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    pub value: Quantity,
    pub year: i32,
    pub source: String,
    pub source_url: String,
}

impl MetricValue {
    pub fn new(value: Quantity, provenance: &Provenance) -> Self {
        MetricValue {
            value,
            year: provenance.year,
            source: provenance.source.clone(),
            source_url: provenance.source_url.clone(),
        }
    }

    pub fn provenance(&self) -> Provenance {
        Provenance::new(self.year, self.source.clone(), self.source_url.clone())
    }
}

// ============================================================================
// SOURCE CATALOG
// ============================================================================

/// Provenance per metric layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceCatalog {
    sources: BTreeMap<String, Provenance>,
}

impl SourceCatalog {
    pub fn new() -> Self {
        SourceCatalog {
            sources: BTreeMap::new(),
        }
    }

    /// Official Luxembourg sources used by the extractors
    pub fn with_defaults() -> Self {
        let rnpp_population = Provenance::new(
            2025,
            "RNPP / CTIE",
            "https://data.public.lu/en/datasets/population-par-commune-population-per-municipality",
        );
        let cadastre = Provenance::new(
            2024,
            "Administration du cadastre et de la topographie",
            "https://data.public.lu/en/datasets/limites-administratives-du-grand-duche-de-luxembourg/",
        );
        let density = Provenance::new(
            2025,
            "Calculated from RNPP population and cadastre area",
            "https://data.public.lu/",
        );
        let rnpp_nationality = Provenance::new(
            2025,
            "RNPP / CTIE",
            "https://data.public.lu/en/datasets/registre-national-des-personnes-physiques-rnpp-nombre-de-ressortissants-par-nationalite-et-par-commune-number-of-citizens-per-nationality-and-municipality/",
        );
        let housing = Provenance::new(
            2025,
            "Observatoire de l'Habitat / STATEC",
            "https://data.public.lu/en/datasets/prix-de-vente-des-appartements-par-commune/",
        );

        SourceCatalog::new()
            .with_source(POPULATION, rnpp_population)
            .with_source(AREA_KM2, cadastre)
            .with_source(DENSITY, density)
            .with_source(FOREIGN_PCT, rnpp_nationality)
            .with_source(PRICE_M2, housing.clone())
            .with_source(PRICE_M2_NEW, housing)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read source catalog: {:?}", path.as_ref()))?;

        let sources: BTreeMap<String, Provenance> =
            serde_json::from_str(&content).context("Failed to parse source catalog JSON")?;

        Ok(SourceCatalog { sources })
    }

    /// Builder: set provenance for one layer
    pub fn with_source(mut self, layer: &str, provenance: Provenance) -> Self {
        self.sources.insert(layer.to_string(), provenance);
        self
    }

    /// Provenance for a layer; missing or incomplete provenance is fatal
    pub fn provenance(&self, layer: &str) -> Result<&Provenance, PipelineError> {
        self.sources
            .get(layer)
            .filter(|p| p.is_complete())
            .ok_or_else(|| PipelineError::UnknownLayer(layer.to_string()))
    }
}

impl Default for SourceCatalog {
    fn default() -> Self {
        Self::with_defaults()
    }
}
