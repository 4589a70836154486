// 🖼️ Display data for the web template
// window.COMMUNE_DATA = { id: {id, name, region, data: {layer: {value, year, source, source_url}}} };
// Write-only: nothing in this crate reads the artifact back.

use crate::metrics::MetricValue;
use crate::regions::RegionTable;
use crate::store::RecordStore;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayEntry {
    pub id: String,
    pub name: String,
    pub region: String,
    pub data: BTreeMap<String, MetricValue>,
}

/// Build the display mapping from every stored record
///
/// Layers that do not parse as a metric with provenance are left out.
pub fn build_display_data<S: RecordStore>(
    store: &S,
    regions: &RegionTable,
) -> Result<BTreeMap<String, DisplayEntry>> {
    let mut entries = BTreeMap::new();

    for id in store.ids()? {
        let Some(record) = store.load(&id)? else {
            continue;
        };

        let mut data = BTreeMap::new();
        for layer in record.data.keys() {
            match record.metric(layer) {
                Some(metric) if metric.provenance().is_complete() => {
                    data.insert(layer.clone(), metric);
                }
                _ => debug!(id = %id, layer = %layer, "layer has no usable provenance, not displayed"),
            }
        }

        if data.is_empty() {
            continue;
        }

        entries.insert(
            id.clone(),
            DisplayEntry {
                name: record.name.clone().unwrap_or_else(|| id.clone()),
                region: regions.region_of(&id).to_string(),
                id,
                data,
            },
        );
    }

    Ok(entries)
}

/// Render the JavaScript artifact
pub fn render_js(entries: &BTreeMap<String, DisplayEntry>, generated: NaiveDate) -> Result<String> {
    let sources: BTreeSet<&str> = entries
        .values()
        .flat_map(|e| e.data.values().map(|m| m.source.as_str()))
        .collect();

    let json = serde_json::to_string_pretty(entries).context("Failed to serialize display data")?;

    let mut out = String::new();
    out.push_str("// ============================================\n");
    out.push_str("// COMMUNE DATA - Generated from official sources\n");
    for source in &sources {
        out.push_str(&format!("// Source: {}\n", source));
    }
    out.push_str(&format!("// Generated: {}\n", generated.format("%Y-%m-%d")));
    out.push_str("// ============================================\n");
    out.push_str(&format!("window.COMMUNE_DATA = {};\n", json));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{Provenance, Quantity, POPULATION, PRICE_M2};
    use crate::store::{EntityRecord, MemoryStore};

    fn seeded_store() -> MemoryStore {
        let mut store = MemoryStore::new();
        let rnpp = Provenance::new(2025, "RNPP / CTIE", "https://data.public.lu/");
        let housing = Provenance::new(2025, "Observatoire de l'Habitat / STATEC", "https://data.public.lu/p");

        let mut mamer = EntityRecord::new("mamer");
        mamer.name = Some("Mamer".to_string());
        mamer
            .set_metric(POPULATION, &MetricValue::new(Quantity::Count(11_000), &rnpp))
            .unwrap();
        mamer
            .set_metric(PRICE_M2, &MetricValue::new(Quantity::Count(9876), &housing))
            .unwrap();
        mamer
            .data
            .insert("notes".to_string(), serde_json::json!({"value": "legacy"}));
        store.save(&mamer).unwrap();

        let mut bous = EntityRecord::new("bous");
        bous.set_metric(PRICE_M2, &MetricValue::new(Quantity::Count(7000), &housing))
            .unwrap();
        store.save(&bous).unwrap();

        store.save(&EntityRecord::new("empty")).unwrap();
        store
    }

    #[test]
    fn test_build_display_data() {
        let store = seeded_store();
        let entries = build_display_data(&store, &RegionTable::with_defaults()).unwrap();

        assert_eq!(entries.len(), 2);

        let mamer = &entries["mamer"];
        assert_eq!(mamer.name, "Mamer");
        assert_eq!(mamer.region, "Center");
        assert_eq!(mamer.data.len(), 2);
        assert!(!mamer.data.contains_key("notes"));

        let bous = &entries["bous"];
        assert_eq!(bous.name, "bous");
        assert_eq!(bous.region, "Luxembourg");
    }

    #[test]
    fn test_render_js() {
        let store = seeded_store();
        let entries = build_display_data(&store, &RegionTable::with_defaults()).unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 11, 3).unwrap();

        let js = render_js(&entries, date).unwrap();

        assert!(js.contains("// Generated: 2025-11-03\n"));
        assert!(js.contains("// Source: RNPP / CTIE\n"));
        assert!(js.contains("window.COMMUNE_DATA = {\n"));
        assert!(js.ends_with("};\n"));

        let start = js.find('{').unwrap();
        let json: serde_json::Value = serde_json::from_str(&js[start..js.len() - 2]).unwrap();
        assert_eq!(json["mamer"]["data"]["price_m2"]["value"], 9876);
        assert_eq!(json["mamer"]["id"], "mamer");
    }
}
