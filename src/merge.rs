// 🔀 Aggregator / Merger
// Joins extractor outputs by resolved identifier, derives density,
// and overlays everything onto the stored commune records.
//
// Flow: {raw name → value} per layer
//   → resolve each name (alias table or slug)
//   → pending layers per identifier (with provenance)
//   → density where population AND area exist
//   → read-modify-write per record

use crate::aliases::{NameResolver, Resolution};
use crate::metrics::{round_to, MetricValue, Quantity, SourceCatalog, AREA_KM2, DENSITY, POPULATION};
use crate::store::{RecordStore, UpdateOutcome};
use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

// ============================================================================
// STATISTICS
// ============================================================================

/// Name-matching diagnostics for one layer
#[derive(Debug, Clone, Default, Serialize)]
pub struct MatchStats {
    pub layer: String,
    pub resolver: String,
    pub matched: usize,
    /// Listed in the alias table as outside our dataset
    pub excluded: usize,
    pub unmatched: Vec<String>,
    /// (raw name, identifier) pairs dropped because another spelling already filled the layer
    pub collisions: Vec<(String, String)>,
}

impl MatchStats {
    pub fn unmatched_count(&self) -> usize {
        self.unmatched.len()
    }
}

/// Outcome of the density derivation
#[derive(Debug, Clone, Default, Serialize)]
pub struct DerivedStats {
    pub computed: usize,
    /// Identifiers with only one of population / area
    pub missing_inputs: usize,
    /// Identifiers whose area is zero
    pub unusable_area: Vec<String>,
}

/// One layer value that differs from what was stored
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerChange {
    pub entity_id: String,
    pub layer: String,
    pub old_value: Option<serde_json::Value>,
    pub new_value: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CommitReport {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Goes to the ledger, not into summaries
    #[serde(skip)]
    pub changes: Vec<LayerChange>,
}

impl CommitReport {
    pub fn written(&self) -> usize {
        self.created + self.updated
    }
}

// ============================================================================
// MERGER
// ============================================================================

#[derive(Debug, Clone, Default)]
struct PendingEntity {
    name: Option<String>,
    layers: BTreeMap<String, MetricValue>,
}

/// Accumulates resolved layers for one run
pub struct Merger<'a> {
    catalog: &'a SourceCatalog,
    pending: BTreeMap<String, PendingEntity>,
    stats: Vec<MatchStats>,
}

impl<'a> Merger<'a> {
    pub fn new(catalog: &'a SourceCatalog) -> Self {
        Merger {
            catalog,
            pending: BTreeMap::new(),
            stats: Vec::new(),
        }
    }

    /// Resolve and attach one single-source layer
    ///
    /// Fails only when the layer has no provenance configured.
    pub fn add_layer<I>(&mut self, layer: &str, resolver: &dyn NameResolver, values: I) -> Result<&MatchStats>
    where
        I: IntoIterator<Item = (String, Quantity)>,
    {
        let provenance = self.catalog.provenance(layer)?.clone();
        let mut stats = MatchStats {
            layer: layer.to_string(),
            resolver: resolver.kind().to_string(),
            ..MatchStats::default()
        };

        for (raw_name, value) in values {
            match resolver.resolve(&raw_name) {
                Resolution::Resolved(id) => {
                    let entity = self.pending.entry(id.clone()).or_default();
                    if entity.layers.contains_key(layer) {
                        warn!(
                            layer,
                            name = %raw_name,
                            id = %id,
                            "second source name for the same commune, keeping the value of the name that sorts first"
                        );
                        stats.collisions.push((raw_name, id));
                        continue;
                    }
                    debug!(layer, name = %raw_name, id = %id, "resolved");
                    entity.layers.insert(layer.to_string(), MetricValue::new(value, &provenance));
                    entity.name.get_or_insert(raw_name);
                    stats.matched += 1;
                }
                Resolution::Excluded => stats.excluded += 1,
                Resolution::Unresolved => {
                    warn!(layer, name = %raw_name, "no identifier for source name");
                    stats.unmatched.push(raw_name);
                }
            }
        }

        info!(
            layer,
            matched = stats.matched,
            excluded = stats.excluded,
            unmatched = stats.unmatched_count(),
            "layer merged"
        );
        let index = self.stats.len();
        self.stats.push(stats);
        Ok(&self.stats[index])
    }

    /// Density = population / area, only where both layers were merged this run
    pub fn derive_density(&mut self) -> Result<DerivedStats> {
        let provenance = self.catalog.provenance(DENSITY)?.clone();
        let mut stats = DerivedStats::default();

        for (id, entity) in self.pending.iter_mut() {
            let population = entity.layers.get(POPULATION).map(|m| m.value.as_f64());
            let area = entity.layers.get(AREA_KM2).map(|m| m.value.as_f64());

            match (population, area) {
                (Some(population), Some(area)) if area > 0.0 => {
                    let density = Quantity::Measure(round_to(population / area, 1));
                    entity
                        .layers
                        .insert(DENSITY.to_string(), MetricValue::new(density, &provenance));
                    stats.computed += 1;
                }
                (Some(_), Some(_)) => {
                    warn!(id = %id, "area is zero, density skipped");
                    stats.unusable_area.push(id.clone());
                }
                (None, None) => {}
                _ => stats.missing_inputs += 1,
            }
        }

        info!(computed = stats.computed, "density derived");
        Ok(stats)
    }

    /// Identifiers with at least one pending layer
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.pending.keys().map(String::as_str)
    }

    pub fn pending_metric(&self, id: &str, layer: &str) -> Option<&MetricValue> {
        self.pending.get(id).and_then(|e| e.layers.get(layer))
    }

    /// How many identifiers carry a given layer
    pub fn layer_count(&self, layer: &str) -> usize {
        self.pending
            .values()
            .filter(|e| e.layers.contains_key(layer))
            .count()
    }

    pub fn stats(&self) -> &[MatchStats] {
        &self.stats
    }

    /// Overlay every pending layer onto the store, one transaction per record
    ///
    /// Every identifier is checked against the store before the first write.
    pub fn commit<S: RecordStore>(&self, store: &mut S) -> Result<CommitReport> {
        for id in self.pending.keys() {
            store.check_id(id)?;
        }

        let mut report = CommitReport::default();

        for (id, entity) in &self.pending {
            let mut changes = Vec::new();

            let outcome = store.update(id, |record| {
                if record.name.is_none() {
                    record.name = entity.name.clone();
                }
                for (layer, metric) in &entity.layers {
                    let old_value = record.set_metric(layer, metric)?;
                    let new_value = record.data.get(layer).cloned().unwrap_or_default();
                    if old_value.as_ref() != Some(&new_value) {
                        changes.push(LayerChange {
                            entity_id: id.clone(),
                            layer: layer.clone(),
                            old_value,
                            new_value,
                        });
                    }
                }
                Ok(())
            })?;

            match outcome {
                UpdateOutcome::Created => report.created += 1,
                UpdateOutcome::Updated => report.updated += 1,
                UpdateOutcome::Unchanged => report.unchanged += 1,
            }
            report.changes.extend(changes);
        }

        info!(
            created = report.created,
            updated = report.updated,
            unchanged = report.unchanged,
            "records committed"
        );
        Ok(report)
    }
}
