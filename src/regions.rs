// 🧭 Region Classifier
// Static lookup: commune identifier → coarse region for display grouping.
// Total function: unknown identifiers get the default label.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Label used for identifiers missing from the table
pub const DEFAULT_REGION: &str = "Luxembourg";

/// File format: `{"default": "Luxembourg", "regions": {"wiltz": "North", ...}}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionTable {
    #[serde(default = "default_region")]
    default: String,

    #[serde(default)]
    regions: HashMap<String, String>,
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

impl RegionTable {
    /// Empty table; every identifier gets `default`
    pub fn new(default: impl Into<String>) -> Self {
        RegionTable {
            default: default.into(),
            regions: HashMap::new(),
        }
    }

    /// Built-in Luxembourg geography
    pub fn with_defaults() -> Self {
        let mut table = RegionTable::new(DEFAULT_REGION);
        for (region, ids) in DEFAULT_REGIONS {
            for id in *ids {
                table.regions.insert(id.to_string(), region.to_string());
            }
        }
        table
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read region file: {:?}", path.as_ref()))?;

        serde_json::from_str(&content).context("Failed to parse region JSON")
    }

    /// Builder: assign one identifier
    pub fn with_region(mut self, id: impl Into<String>, region: impl Into<String>) -> Self {
        self.regions.insert(id.into(), region.into());
        self
    }

    pub fn region_of(&self, id: &str) -> &str {
        self.regions
            .get(id)
            .map(String::as_str)
            .unwrap_or(&self.default)
    }

    pub fn default_label(&self) -> &str {
        &self.default
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

impl Default for RegionTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}

const DEFAULT_REGIONS: &[(&str, &[&str])] = &[
    (
        "Center",
        &[
            "luxembourg", "bertrange", "strassen", "hesperange", "sandweiler",
            "niederanven", "schuttrange", "contern", "weiler_la_tour", "roeser",
            "leudelange", "kopstal", "steinsel", "walferdange", "lorentzweiler",
            "lintgen", "mersch", "frisange", "mamer", "kehlen", "steinfort",
            "hobscheid", "koerich", "garnich", "dippach", "reckange_sur_mess",
            "mondorf_les_bains", "dalheim", "junglinster", "bissen", "colmar_berg",
            "helperknapp",
        ],
    ),
    (
        "South",
        &[
            "esch_sur_alzette", "differdange", "dudelange", "petange", "sanem",
            "bettembourg", "schifflange", "kaerjeng", "kayl", "rumelange",
            "mondercange",
        ],
    ),
    (
        "North",
        &[
            "ettelbruck", "diekirch", "wiltz", "clervaux", "weiswampach",
            "parc_hosingen", "erpeldange_sur_sure", "schieren", "larochette",
        ],
    ),
    (
        "East",
        &[
            "grevenmacher", "echternach", "remich", "schengen", "wormeldange",
            "mertert",
        ],
    ),
    ("West", &["redange", "ell", "grosbous"]),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_regions() {
        let table = RegionTable::with_defaults();

        assert_eq!(table.region_of("luxembourg"), "Center");
        assert_eq!(table.region_of("esch_sur_alzette"), "South");
        assert_eq!(table.region_of("erpeldange_sur_sure"), "North");
        assert_eq!(table.region_of("remich"), "East");
        assert_eq!(table.region_of("grosbous"), "West");
    }

    #[test]
    fn test_unknown_identifier_gets_default() {
        let table = RegionTable::with_defaults();

        assert_eq!(table.region_of("beaufort"), DEFAULT_REGION);
        assert_eq!(table.region_of(""), "Luxembourg");
    }

    #[test]
    fn test_region_file_format() {
        let json = r#"{"default": "Elsewhere", "regions": {"wiltz": "Oesling"}}"#;
        let table: RegionTable = serde_json::from_str(json).unwrap();

        assert_eq!(table.region_of("wiltz"), "Oesling");
        assert_eq!(table.region_of("mamer"), "Elsewhere");
    }

    #[test]
    fn test_region_file_default_is_optional() {
        let table: RegionTable = serde_json::from_str(r#"{"regions": {}}"#).unwrap();
        assert_eq!(table.default_label(), DEFAULT_REGION);
    }

    #[test]
    fn test_builder() {
        let table = RegionTable::new("Other").with_region("bous", "East");
        assert_eq!(table.region_of("bous"), "East");
        assert_eq!(table.len(), 1);
    }
}
