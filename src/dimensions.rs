// 🏷️ Dimension Registry
// dimensions.json: metric layer → {label, format} for the display template.
// Additive only: registering layers never removes existing entries.

use crate::metrics::{AREA_KM2, DENSITY, FOREIGN_PCT, POPULATION, PRICE_M2, PRICE_M2_NEW};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DimensionFormat {
    Number,
    Decimal,
    Percent,
    Currency,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub label: String,
    pub format: DimensionFormat,
}

impl Dimension {
    pub fn new(label: impl Into<String>, format: DimensionFormat) -> Self {
        Dimension {
            label: label.into(),
            format,
        }
    }
}

/// Display metadata for every metric layer the site knows about
///
/// Unknown entries in an existing file are carried through untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DimensionRegistry {
    dimensions: BTreeMap<String, serde_json::Value>,
}

impl DimensionRegistry {
    pub fn new() -> Self {
        DimensionRegistry::default()
    }

    /// Load the registry document; a missing file is an empty registry
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(DimensionRegistry::new());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read dimensions file: {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse dimensions file: {}", path.display()))
    }

    /// Write the registry as pretty JSON (2-space indent, UTF-8 kept as-is)
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize dimensions")?;
        crate::store::write_atomically(path, json.as_bytes())
    }

    /// Insert or refresh one layer's metadata
    pub fn register(&mut self, layer: &str, dimension: Dimension) -> Result<()> {
        let value = serde_json::to_value(dimension).context("Failed to serialize dimension")?;
        self.dimensions.insert(layer.to_string(), value);
        Ok(())
    }

    pub fn get(&self, layer: &str) -> Option<Dimension> {
        self.dimensions
            .get(layer)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn contains(&self, layer: &str) -> bool {
        self.dimensions.contains_key(layer)
    }

    pub fn layers(&self) -> Vec<String> {
        self.dimensions.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.dimensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }
}

/// Built-in metadata for the layers this crate produces
pub fn builtin_dimension(layer: &str) -> Option<Dimension> {
    let dimension = match layer {
        POPULATION => Dimension::new("Population", DimensionFormat::Number),
        AREA_KM2 => Dimension::new("Area (km²)", DimensionFormat::Decimal),
        DENSITY => Dimension::new("Density (pop/km²)", DimensionFormat::Decimal),
        FOREIGN_PCT => Dimension::new("Foreign Population %", DimensionFormat::Percent),
        PRICE_M2 => Dimension::new("Apartment Price (€/m²)", DimensionFormat::Currency),
        PRICE_M2_NEW => Dimension::new("New-Build Price (€/m²)", DimensionFormat::Currency),
        _ => return None,
    };
    Some(dimension)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_is_additive() {
        let mut registry: DimensionRegistry = serde_json::from_str(
            r#"{"schools": {"label": "Schools", "format": "number", "icon": "school"}}"#,
        )
        .unwrap();

        registry
            .register(POPULATION, builtin_dimension(POPULATION).unwrap())
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("schools"));
        assert_eq!(
            registry.get(POPULATION),
            Some(Dimension::new("Population", DimensionFormat::Number))
        );

        // Extra keys of untouched entries survive
        let json = serde_json::to_value(&registry).unwrap();
        assert_eq!(json["schools"]["icon"], "school");
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let registry = DimensionRegistry::load(&dir.path().join("dimensions.json")).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dimensions.json");

        let mut registry = DimensionRegistry::new();
        registry
            .register(AREA_KM2, builtin_dimension(AREA_KM2).unwrap())
            .unwrap();
        registry.save(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"Area (km²)\""));
        assert!(text.contains("\n  \"area_km2\""));

        let reloaded = DimensionRegistry::load(&path).unwrap();
        assert_eq!(reloaded.get(AREA_KM2).unwrap().format, DimensionFormat::Decimal);
    }

    #[test]
    fn test_builtin_dimensions() {
        assert_eq!(builtin_dimension(FOREIGN_PCT).unwrap().format, DimensionFormat::Percent);
        assert_eq!(builtin_dimension(PRICE_M2).unwrap().format, DimensionFormat::Currency);
        assert!(builtin_dimension("unknown").is_none());
    }
}
