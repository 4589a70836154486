// 🚚 Pipeline - one batch run from official tables to stored records
//
// Every run follows the same order:
// 1. Load and extract ALL input tables (any failure aborts here, nothing written)
// 2. Resolve names and merge layers in memory
// 3. Commit records, then dimension registry, snapshot, ledger

use crate::aliases::{AliasTable, NameResolver, Resolution, SlugResolver};
use crate::config::PipelineConfig;
use crate::dimensions::{builtin_dimension, DimensionRegistry};
use crate::display::{build_display_data, render_js};
use crate::extract::{
    AreaExtractor, Extraction, Extractor, NationalityExtractor, PopulationExtractor, PriceExtractor,
    PriceRecord,
};
use crate::ledger::{RunLedger, RunRecord};
use crate::merge::{CommitReport, DerivedStats, MatchStats, Merger};
use crate::metrics::{
    Quantity, SourceCatalog, AREA_KM2, DENSITY, FOREIGN_PCT, POPULATION, PRICE_M2, PRICE_M2_NEW,
};
use crate::regions::RegionTable;
use crate::store::{write_atomically, JsonDirStore};
use crate::tables::{Encoding, Table, TableOptions};
use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

// ============================================================================
// RUN SUMMARY
// ============================================================================

/// What one extractor produced
#[derive(Debug, Clone, Serialize)]
pub struct SourceSummary {
    pub layer: String,
    pub table: String,
    pub extracted: usize,
    pub skipped: BTreeMap<&'static str, usize>,
    pub ignored: usize,
}

impl SourceSummary {
    fn of<T>(layer: &str, extraction: &Extraction<T>) -> Self {
        SourceSummary {
            layer: layer.to_string(),
            table: extraction.table.clone(),
            extracted: extraction.len(),
            skipped: extraction.skip_counts(),
            ignored: extraction.ignored,
        }
    }
}

/// End-of-run counts: nothing recoverable is dropped without showing up here
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub command: String,
    pub sources: Vec<SourceSummary>,
    pub matches: Vec<MatchStats>,
    pub density: Option<DerivedStats>,
    /// Identifiers carrying each layer after the merge
    pub layer_counts: BTreeMap<String, usize>,
    /// None for dry runs
    pub commit: Option<CommitReport>,
}

impl RunSummary {
    pub fn unmatched(&self) -> usize {
        self.matches.iter().map(|m| m.unmatched_count()).sum()
    }

    pub fn log(&self) {
        for source in &self.sources {
            info!(
                layer = %source.layer,
                table = %source.table,
                extracted = source.extracted,
                skipped = ?source.skipped,
                "source extracted"
            );
        }
        for (layer, count) in &self.layer_counts {
            info!("  {}: {} communes", layer, count);
        }
        match &self.commit {
            Some(commit) => info!(
                command = %self.command,
                created = commit.created,
                updated = commit.updated,
                unchanged = commit.unchanged,
                unmatched = self.unmatched(),
                "run complete"
            ),
            None => info!(command = %self.command, unmatched = self.unmatched(), "dry run, nothing written"),
        }
    }
}

// ============================================================================
// PRICE SNAPSHOT
// ============================================================================

#[derive(Serialize)]
struct PriceSnapshotEntry<'a> {
    id: &'a str,
    #[serde(flatten)]
    record: &'a PriceRecord,
    period: &'a str,
    source: &'a str,
    source_url: &'a str,
}

/// Extracted and merged in memory, not yet committed
struct PreparedRun<'a> {
    started_at: DateTime<Utc>,
    merger: Merger<'a>,
    layers: &'static [&'static str],
    summary: RunSummary,
    prices: Option<Extraction<PriceRecord>>,
}

fn layer_counts(merger: &Merger<'_>, layers: &[&str]) -> BTreeMap<String, usize> {
    layers
        .iter()
        .map(|layer| (layer.to_string(), merger.layer_count(layer)))
        .collect()
}

// ============================================================================
// PIPELINE
// ============================================================================

pub struct Pipeline {
    config: PipelineConfig,
    aliases: AliasTable,
    slugs: SlugResolver,
    regions: RegionTable,
    catalog: SourceCatalog,
}

impl Pipeline {
    /// Load lookup tables once; they stay immutable for the whole run
    pub fn new(config: PipelineConfig) -> Result<Self> {
        Ok(Pipeline {
            aliases: config.alias_table()?,
            slugs: SlugResolver::with_defaults(),
            regions: config.region_table()?,
            catalog: config.source_catalog()?,
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Population, area, foreign share and density
    pub fn run_demographics(&self, dry_run: bool) -> Result<RunSummary> {
        let run = self.prepare_demographics()?;
        self.finish(run, dry_run)
    }

    /// Apartment prices per m² (existing, with new-build fallback)
    pub fn run_prices(&self, dry_run: bool) -> Result<RunSummary> {
        let run = self.prepare_prices()?;
        self.finish(run, dry_run)
    }

    /// Regenerate the template data file from the record store
    pub fn generate_display(&self, dry_run: bool) -> Result<usize> {
        let store = JsonDirStore::new(&self.config.communes_dir);
        let entries = build_display_data(&store, &self.regions)?;

        if !dry_run {
            let js = render_js(&entries, Local::now().date_naive())?;
            write_atomically(&self.config.display_output, js.as_bytes())?;
            info!(
                communes = entries.len(),
                path = %self.config.display_output.display(),
                "display data written"
            );
        }

        Ok(entries.len())
    }

    /// Demographics, then prices, then display data
    ///
    /// Both sources are extracted and merged before the first commit, so a
    /// broken price sheet cannot leave half-updated demographics behind.
    pub fn run_all(&self, dry_run: bool) -> Result<Vec<RunSummary>> {
        let demographics = self.prepare_demographics()?;
        let prices = self.prepare_prices()?;
        if !dry_run {
            info!("all sources readable, committing");
        }

        let summaries = vec![
            self.finish(demographics, dry_run)?,
            self.finish(prices, dry_run)?,
        ];
        self.generate_display(dry_run)?;
        Ok(summaries)
    }

    /// Load, extract and merge the demographic tables; nothing is written
    fn prepare_demographics(&self) -> Result<PreparedRun<'_>> {
        let started_at = Utc::now();
        info!("loading demographic sources");

        let population_table = Table::load(&self.config.population_table, &TableOptions::default())?;
        let area_table = Table::load(&self.config.area_table, &TableOptions::default())?;
        let nationality_table = Table::load(
            &self.config.nationality_table,
            &TableOptions::default().encoding(Encoding::Latin1),
        )?;

        let population = PopulationExtractor::new().extract(&population_table)?;
        let area = AreaExtractor::new().extract(&area_table)?;
        let nationality = NationalityExtractor::new().extract(&nationality_table)?;

        let mut merger = Merger::new(&self.catalog);
        merger.add_layer(
            POPULATION,
            &self.aliases,
            population.values.iter().map(|(n, v)| (n.clone(), Quantity::Count(*v))),
        )?;
        merger.add_layer(
            AREA_KM2,
            &self.aliases,
            area.values.iter().map(|(n, v)| (n.clone(), Quantity::Measure(*v))),
        )?;
        merger.add_layer(
            FOREIGN_PCT,
            &self.aliases,
            nationality.values.iter().map(|(n, v)| (n.clone(), Quantity::Measure(*v))),
        )?;
        let density = merger.derive_density()?;

        let layers: &'static [&'static str] = &[POPULATION, AREA_KM2, DENSITY, FOREIGN_PCT];
        let summary = RunSummary {
            command: "demographics".to_string(),
            sources: vec![
                SourceSummary::of(POPULATION, &population),
                SourceSummary::of(AREA_KM2, &area),
                SourceSummary::of(FOREIGN_PCT, &nationality),
            ],
            matches: merger.stats().to_vec(),
            density: Some(density),
            layer_counts: layer_counts(&merger, layers),
            commit: None,
        };

        Ok(PreparedRun {
            started_at,
            merger,
            layers,
            summary,
            prices: None,
        })
    }

    /// Load, extract and merge the price sheet; nothing is written
    fn prepare_prices(&self) -> Result<PreparedRun<'_>> {
        let started_at = Utc::now();
        info!(period = %self.config.price_period, "loading price source");

        let options = TableOptions::default()
            .headerless()
            .skip(self.config.price_skip_rows);
        let price_table = Table::load(&self.config.price_table, &options)?;
        let prices = PriceExtractor::new().extract(&price_table)?;

        for skipped in &prices.skipped {
            info!(name = %skipped.name, reason = %skipped.reason, "no price");
        }

        let mut merger = Merger::new(&self.catalog);
        merger.add_layer(
            PRICE_M2,
            &self.slugs,
            prices
                .values
                .iter()
                .map(|(n, r)| (n.clone(), Quantity::Count(r.price_m2))),
        )?;
        merger.add_layer(
            PRICE_M2_NEW,
            &self.slugs,
            prices
                .values
                .iter()
                .filter_map(|(n, r)| r.price_new.map(|p| (n.clone(), Quantity::Count(p)))),
        )?;

        let layers: &'static [&'static str] = &[PRICE_M2, PRICE_M2_NEW];
        let summary = RunSummary {
            command: "prices".to_string(),
            sources: vec![SourceSummary::of(PRICE_M2, &prices)],
            matches: merger.stats().to_vec(),
            density: None,
            layer_counts: layer_counts(&merger, layers),
            commit: None,
        };

        Ok(PreparedRun {
            started_at,
            merger,
            layers,
            summary,
            prices: Some(prices),
        })
    }

    /// Commit a prepared run (unless dry) and log its summary
    fn finish(&self, run: PreparedRun<'_>, dry_run: bool) -> Result<RunSummary> {
        let PreparedRun {
            started_at,
            merger,
            layers,
            mut summary,
            prices,
        } = run;

        if !dry_run {
            summary.commit = Some(self.commit(&merger, layers)?);
            if let Some(prices) = &prices {
                self.write_price_snapshot(prices)?;
            }
            self.record_run(&summary, started_at)?;
        }

        summary.log();
        Ok(summary)
    }

    fn commit(&self, merger: &Merger<'_>, layers: &[&str]) -> Result<CommitReport> {
        // A broken registry file must fail before any record is touched
        let mut registry = DimensionRegistry::load(&self.config.dimensions_file)?;
        for layer in layers {
            if let Some(dimension) = builtin_dimension(layer) {
                registry.register(layer, dimension)?;
            }
        }

        let mut store = JsonDirStore::new(&self.config.communes_dir);
        let report = merger.commit(&mut store)?;
        registry.save(&self.config.dimensions_file)?;

        Ok(report)
    }

    fn write_price_snapshot(&self, prices: &Extraction<PriceRecord>) -> Result<()> {
        let provenance = self.catalog.provenance(PRICE_M2)?;
        let mut snapshot = BTreeMap::new();

        for (name, record) in &prices.values {
            if let Resolution::Resolved(id) = self.slugs.resolve(name) {
                snapshot.entry(id).or_insert(record);
            }
        }

        let entries: BTreeMap<&str, PriceSnapshotEntry<'_>> = snapshot
            .iter()
            .map(|(id, record)| {
                (
                    id.as_str(),
                    PriceSnapshotEntry {
                        id,
                        record,
                        period: &self.config.price_period,
                        source: &provenance.source,
                        source_url: &provenance.source_url,
                    },
                )
            })
            .collect();

        let json = serde_json::to_string_pretty(&entries).context("Failed to serialize price snapshot")?;
        write_atomically(&self.config.price_snapshot, json.as_bytes())
    }

    fn record_run(&self, summary: &RunSummary, started_at: DateTime<Utc>) -> Result<()> {
        let Some(path) = &self.config.ledger else {
            return Ok(());
        };

        let mut ledger = RunLedger::open(path)?;
        let summary_json = serde_json::to_value(summary).context("Failed to serialize run summary")?;
        let run = RunRecord::new(&summary.command, started_at, summary_json);
        let changes = summary
            .commit
            .as_ref()
            .map(|c| c.changes.as_slice())
            .unwrap_or_default();

        let events = ledger.record_run(&run, changes)?;
        info!(run_id = %run.run_id, events, "run recorded in ledger");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    const POPULATION_CSV: &str = "\
COMMUNE_NOM,FEMMES_MINEURES,HOMMES_MINEURS,FEMMES_MAJEURES,HOMMES_MAJEURS
Mamer,10,12,15,13
Kayl,200,210,290,300
Beaufort,5,5,5,5
Atlantis,1,1,1,1
";

    const AREA_CSV: &str = "\
COMMUNE,SURFACE_GEOMETRIQUE_COMMUNE_[m2]
Mamer,2000000
Kayl,4000000
";

    const NATIONALITY_CSV: &str = "\
COMMUNE_NOM,NATIONALITE_ISO3,NOMBRE_TOTAL
Mamer,LUX,30
Mamer,FRA,20
Kayl,LUX,900
Kayl,PRT,100
";

    const PRICE_CSV: &str = "\
Prix de vente des appartements par commune
,Commune,n,prix,fourchette,n,prix,fourchette
,Mamer,25,9876.4,x,3,*,y
,Groussbus-Wal,4,*,x,12,6100,y
,Kayl,2,*,x,1,*,y
,Moyenne nationale,,8000,,,9000,
";

    fn fixture(dir: &Path) -> PipelineConfig {
        let raw = dir.join("data/raw");
        fs::create_dir_all(&raw).unwrap();
        fs::write(raw.join("population-commune-2025.csv"), POPULATION_CSV).unwrap();
        fs::write(raw.join("commune-area.csv"), AREA_CSV).unwrap();
        fs::write(raw.join("nationality-commune-2025.csv"), NATIONALITY_CSV).unwrap();
        fs::write(raw.join("prix-m2-commune-2025t3.csv"), PRICE_CSV).unwrap();

        let mut config = PipelineConfig::with_base(dir);
        config.price_skip_rows = 1;
        config
    }

    fn read_json(path: &Path) -> serde_json::Value {
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn test_run_demographics() {
        let dir = tempfile::tempdir().unwrap();
        let config = fixture(dir.path());
        let pipeline = Pipeline::new(config.clone()).unwrap();

        let summary = pipeline.run_demographics(false).unwrap();

        let population = &summary.matches[0];
        assert_eq!(population.matched, 2);
        assert_eq!(population.excluded, 1);
        assert_eq!(population.unmatched, vec!["Atlantis".to_string()]);
        assert_eq!(summary.layer_counts["density"], 2);
        assert_eq!(summary.commit.as_ref().unwrap().created, 2);

        let mamer = read_json(&config.communes_dir.join("mamer.json"));
        assert_eq!(mamer["name"], "Mamer");
        assert_eq!(mamer["data"]["population"]["value"], 50);
        assert_eq!(mamer["data"]["area_km2"]["value"], 2.0);
        assert_eq!(mamer["data"]["density"]["value"], 25.0);
        assert_eq!(mamer["data"]["foreign_pct"]["value"], 40.0);
        assert_eq!(mamer["data"]["population"]["year"], 2025);

        let dimensions = read_json(&config.dimensions_file);
        assert_eq!(dimensions["foreign_pct"]["format"], "percent");
        assert!(dimensions.get("price_m2").is_none());
    }

    #[test]
    fn test_rerun_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(fixture(dir.path())).unwrap();

        pipeline.run_demographics(false).unwrap();
        let second = pipeline.run_demographics(false).unwrap();

        let commit = second.commit.unwrap();
        assert_eq!(commit.written(), 0);
        assert_eq!(commit.unchanged, 2);
    }

    #[test]
    fn test_run_prices_keeps_demographics() {
        let dir = tempfile::tempdir().unwrap();
        let config = fixture(dir.path());
        let pipeline = Pipeline::new(config.clone()).unwrap();

        pipeline.run_demographics(false).unwrap();
        let summary = pipeline.run_prices(false).unwrap();

        assert_eq!(summary.layer_counts["price_m2"], 2);
        assert_eq!(summary.layer_counts["price_m2_new"], 1);
        assert_eq!(summary.sources[0].ignored, 2);

        let mamer = read_json(&config.communes_dir.join("mamer.json"));
        assert_eq!(mamer["data"]["price_m2"]["value"], 9876);
        assert_eq!(mamer["data"]["population"]["value"], 50);

        let grosbous = read_json(&config.communes_dir.join("grosbous.json"));
        assert_eq!(grosbous["data"]["price_m2"]["value"], 6100);
        assert_eq!(grosbous["data"]["price_m2_new"]["value"], 6100);

        let snapshot = read_json(&config.price_snapshot);
        assert_eq!(snapshot["grosbous"]["price_type"], "new_construction");
        assert_eq!(snapshot["grosbous"]["n_transactions"], 12);
        assert_eq!(snapshot["mamer"]["period"], "Oct 2024 - Sep 2025");
        assert!(snapshot.get("kayl").is_none());
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = fixture(dir.path());
        let pipeline = Pipeline::new(config.clone()).unwrap();

        let summaries = pipeline.run_all(true).unwrap();

        assert_eq!(summaries.len(), 2);
        assert!(summaries.iter().all(|s| s.commit.is_none()));
        assert!(!config.communes_dir.exists());
        assert!(!config.dimensions_file.exists());
        assert!(!config.display_output.exists());
    }

    #[test]
    fn test_missing_table_aborts_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let config = fixture(dir.path());
        fs::remove_file(&config.price_table).unwrap();
        let pipeline = Pipeline::new(config.clone()).unwrap();

        assert!(pipeline.run_all(false).is_err());
        assert!(!config.communes_dir.exists());
        assert!(!config.dimensions_file.exists());
    }

    #[test]
    fn test_run_all_with_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let config = fixture(dir.path()).with_ledger(dir.path().join("runs.db"));
        let pipeline = Pipeline::new(config.clone()).unwrap();

        pipeline.run_all(false).unwrap();

        let js = fs::read_to_string(&config.display_output).unwrap();
        assert!(js.contains("window.COMMUNE_DATA = {"));
        assert!(js.contains("\"grosbous\""));

        let ledger = RunLedger::open(&dir.path().join("runs.db")).unwrap();
        assert_eq!(ledger.run_count().unwrap(), 2);
        let events = ledger.events_for_entity("mamer").unwrap();
        assert_eq!(events.len(), 5);
    }

    #[test]
    fn test_unstorable_price_name_is_unmatched() {
        let dir = tempfile::tempdir().unwrap();
        let config = fixture(dir.path());
        let sheet = format!("{},Redange (Attert),14,7100,x,2,*,y\n", PRICE_CSV);
        fs::write(&config.price_table, sheet).unwrap();
        let pipeline = Pipeline::new(config.clone()).unwrap();

        let summary = pipeline.run_prices(false).unwrap();

        assert_eq!(summary.matches[0].unmatched, vec!["Redange (Attert)".to_string()]);
        assert_eq!(summary.commit.unwrap().created, 2);
        assert!(config.communes_dir.join("mamer.json").exists());
        assert!(config.dimensions_file.exists());
    }

    #[test]
    fn test_broken_dimensions_file_leaves_records_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let config = fixture(dir.path());
        fs::create_dir_all(config.dimensions_file.parent().unwrap()).unwrap();
        fs::write(&config.dimensions_file, "{ not json").unwrap();
        let pipeline = Pipeline::new(config.clone()).unwrap();

        assert!(pipeline.run_demographics(false).is_err());
        assert!(pipeline.run_all(false).is_err());
        assert!(!config.communes_dir.exists());
        assert!(!config.price_snapshot.exists());
        assert_eq!(fs::read_to_string(&config.dimensions_file).unwrap(), "{ not json");
    }
}
