// ⚙️ Pipeline configuration
// Where the official tables live, where results go, and which lookup tables to use.
// Defaults follow the data/ layout of the repository; a JSON file can override any field.

use crate::aliases::AliasTable;
use crate::metrics::SourceCatalog;
use crate::regions::RegionTable;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    // Inputs
    pub population_table: PathBuf,
    pub area_table: PathBuf,
    pub nationality_table: PathBuf,
    pub price_table: PathBuf,
    /// Title rows above the first data row of the price sheet
    pub price_skip_rows: usize,
    pub price_period: String,

    // Outputs
    pub communes_dir: PathBuf,
    pub dimensions_file: PathBuf,
    pub price_snapshot: PathBuf,
    pub display_output: PathBuf,
    pub ledger: Option<PathBuf>,

    // Lookup tables (built-in when absent)
    pub alias_file: Option<PathBuf>,
    pub region_file: Option<PathBuf>,
    pub sources_file: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            population_table: PathBuf::from("data/raw/population-commune-2025.csv"),
            area_table: PathBuf::from("data/raw/commune-area.csv"),
            nationality_table: PathBuf::from("data/raw/nationality-commune-2025.csv"),
            price_table: PathBuf::from("data/raw/prix-m2-commune-2025t3.csv"),
            price_skip_rows: 10,
            price_period: "Oct 2024 - Sep 2025".to_string(),
            communes_dir: PathBuf::from("data/communes"),
            dimensions_file: PathBuf::from("data/dimensions.json"),
            price_snapshot: PathBuf::from("data/extracted/price_m2.json"),
            display_output: PathBuf::from("data/extracted/blogger_commune_data.js"),
            ledger: None,
            alias_file: None,
            region_file: None,
            sources_file: None,
        }
    }
}

impl PipelineConfig {
    /// Default layout under `base`
    pub fn with_base(base: &Path) -> Self {
        PipelineConfig::default().rebase(base)
    }

    /// Read a JSON config; relative paths resolve against `base`
    pub fn from_file(path: &Path, base: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: PipelineConfig =
            serde_json::from_str(&content).context("Failed to parse config JSON")?;

        Ok(config.rebase(base))
    }

    /// Builder: keep an audit trail of runs in SQLite
    pub fn with_ledger(mut self, path: impl Into<PathBuf>) -> Self {
        self.ledger = Some(path.into());
        self
    }

    fn rebase(mut self, base: &Path) -> Self {
        let join = |p: &Path| -> PathBuf {
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                base.join(p)
            }
        };

        self.population_table = join(&self.population_table);
        self.area_table = join(&self.area_table);
        self.nationality_table = join(&self.nationality_table);
        self.price_table = join(&self.price_table);
        self.communes_dir = join(&self.communes_dir);
        self.dimensions_file = join(&self.dimensions_file);
        self.price_snapshot = join(&self.price_snapshot);
        self.display_output = join(&self.display_output);
        self.ledger = self.ledger.as_deref().map(join);
        self.alias_file = self.alias_file.as_deref().map(join);
        self.region_file = self.region_file.as_deref().map(join);
        self.sources_file = self.sources_file.as_deref().map(join);
        self
    }

    pub fn alias_table(&self) -> Result<AliasTable> {
        match &self.alias_file {
            Some(path) => AliasTable::from_file(path),
            None => Ok(AliasTable::with_defaults()?),
        }
    }

    pub fn region_table(&self) -> Result<RegionTable> {
        match &self.region_file {
            Some(path) => RegionTable::from_file(path),
            None => Ok(RegionTable::with_defaults()),
        }
    }

    pub fn source_catalog(&self) -> Result<SourceCatalog> {
        match &self.sources_file {
            Some(path) => SourceCatalog::from_file(path),
            None => Ok(SourceCatalog::with_defaults()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_base() {
        let config = PipelineConfig::with_base(Path::new("/srv/site"));

        assert_eq!(config.communes_dir, PathBuf::from("/srv/site/data/communes"));
        assert_eq!(
            config.population_table,
            PathBuf::from("/srv/site/data/raw/population-commune-2025.csv")
        );
        assert_eq!(config.price_skip_rows, 10);
        assert!(config.ledger.is_none());
    }

    #[test]
    fn test_from_file_partial_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        fs::write(
            &path,
            r#"{"price_skip_rows": 3, "ledger": "runs.db", "communes_dir": "/abs/communes"}"#,
        )
        .unwrap();

        let config = PipelineConfig::from_file(&path, dir.path()).unwrap();

        assert_eq!(config.price_skip_rows, 3);
        assert_eq!(config.ledger, Some(dir.path().join("runs.db")));
        assert_eq!(config.communes_dir, PathBuf::from("/abs/communes"));
        assert_eq!(config.area_table, dir.path().join("data/raw/commune-area.csv"));
    }

    #[test]
    fn test_builtin_lookup_tables() {
        let config = PipelineConfig::default();

        assert!(!config.alias_table().unwrap().is_empty());
        assert_eq!(config.region_table().unwrap().region_of("wiltz"), "North");
        assert!(config.source_catalog().unwrap().provenance("population").is_ok());
    }

    #[test]
    fn test_missing_alias_file_is_an_error() {
        let mut config = PipelineConfig::default();
        config.alias_file = Some(PathBuf::from("/nonexistent/aliases.json"));

        assert!(config.alias_table().is_err());
    }

    #[test]
    fn test_colliding_alias_table_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aliases.json");
        fs::write(
            &path,
            r#"[{"name": "Bech", "id": null}, {"name": "BECH", "id": "bech"}]"#,
        )
        .unwrap();

        let mut config = PipelineConfig::default();
        config.alias_file = Some(path);

        assert!(config.alias_table().is_err());
        assert!(PipelineConfig::default().alias_table().is_ok());
    }
}
