// 🗄️ Entity Record Store
// One JSON document per commune identifier (data/communes/<id>.json).
//
// Records are only ever changed through read → modify → write:
// - Layers not touched by a run are preserved
// - Unknown fields in existing documents are preserved
// - Writes replace the whole file atomically (temp file + rename)

use crate::error::PipelineError;
use crate::metrics::MetricValue;
use crate::normalize::is_identifier;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

// ============================================================================
// ENTITY RECORD
// ============================================================================

/// Persisted commune document
///
/// `data` maps layer name → `{value, year, source, source_url}`. Entries are
/// kept as raw JSON so layers written by other tools survive a rewrite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    #[serde(default)]
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default)]
    pub data: BTreeMap<String, serde_json::Value>,

    /// Any other top-level fields (coordinates, descriptions...)
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl EntityRecord {
    pub fn new(id: impl Into<String>) -> Self {
        EntityRecord {
            id: id.into(),
            name: None,
            data: BTreeMap::new(),
            extra: serde_json::Map::new(),
        }
    }

    /// Typed view of one layer; None if absent or not a metric value
    pub fn metric(&self, layer: &str) -> Option<MetricValue> {
        self.data
            .get(layer)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Overlay one layer, returning the previous raw value
    pub fn set_metric(&mut self, layer: &str, metric: &MetricValue) -> Result<Option<serde_json::Value>> {
        let value = serde_json::to_value(metric)
            .with_context(|| format!("Failed to serialize layer {} for {}", layer, self.id))?;
        Ok(self.data.insert(layer.to_string(), value))
    }

    pub fn has_layer(&self, layer: &str) -> bool {
        self.data.contains_key(layer)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).with_context(|| format!("Failed to serialize record {}", self.id))
    }

    /// SHA-256 of the serialized document, used to skip no-op rewrites
    pub fn content_hash(&self) -> Result<String> {
        let mut hasher = Sha256::new();
        hasher.update(self.to_json()?.as_bytes());
        Ok(format!("{:x}", hasher.finalize()))
    }
}

// ============================================================================
// STORE TRAIT
// ============================================================================

/// What a read-modify-write did to the stored document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Created,
    Updated,
    Unchanged,
}

pub trait RecordStore {
    fn load(&self, id: &str) -> Result<Option<EntityRecord>>;

    /// Replace the stored document as a whole
    fn save(&mut self, record: &EntityRecord) -> Result<()>;

    /// Identifiers of every stored record, sorted
    fn ids(&self) -> Result<Vec<String>>;

    /// Reject an identifier this store could never write
    fn check_id(&self, _id: &str) -> Result<(), PipelineError> {
        Ok(())
    }

    /// Read-modify-write transaction on one record
    ///
    /// The closure works on a private copy; nothing is written unless it
    /// returns Ok and the document actually changed.
    fn update<F>(&mut self, id: &str, modify: F) -> Result<UpdateOutcome>
    where
        Self: Sized,
        F: FnOnce(&mut EntityRecord) -> Result<()>,
    {
        let existing = self.load(id)?;
        let before_hash = match &existing {
            Some(record) => Some(record.content_hash()?),
            None => None,
        };

        let mut record = existing.unwrap_or_else(|| EntityRecord::new(id));
        if record.id.is_empty() {
            record.id = id.to_string();
        }
        modify(&mut record)?;

        let outcome = match before_hash {
            None => UpdateOutcome::Created,
            Some(hash) if hash == record.content_hash()? => return Ok(UpdateOutcome::Unchanged),
            Some(_) => UpdateOutcome::Updated,
        };

        self.save(&record)?;
        Ok(outcome)
    }
}

// ============================================================================
// JSON DIRECTORY STORE
// ============================================================================

pub struct JsonDirStore {
    dir: PathBuf,
}

impl JsonDirStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        JsonDirStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> Result<PathBuf, PipelineError> {
        if !is_identifier(id) {
            return Err(PipelineError::Store {
                id: id.to_string(),
                reason: "identifier is not a snake_case file name".to_string(),
            });
        }
        Ok(self.dir.join(format!("{}.json", id)))
    }
}

impl RecordStore for JsonDirStore {
    fn check_id(&self, id: &str) -> Result<(), PipelineError> {
        self.path_for(id).map(|_| ())
    }

    fn load(&self, id: &str) -> Result<Option<EntityRecord>> {
        let path = self.path_for(id)?;
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read record: {}", path.display()))?;
        let mut record: EntityRecord = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse record: {}", path.display()))?;

        if record.id.is_empty() {
            record.id = id.to_string();
        }
        Ok(Some(record))
    }

    fn save(&mut self, record: &EntityRecord) -> Result<()> {
        let path = self.path_for(&record.id)?;
        write_atomically(&path, record.to_json()?.as_bytes())
    }

    fn ids(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to list records in {}", self.dir.display()))?
        {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

/// Store backed by a map, for dry runs and tests
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    records: BTreeMap<String, EntityRecord>,
    pub writes: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub fn get(&self, id: &str) -> Option<&EntityRecord> {
        self.records.get(id)
    }
}

impl RecordStore for MemoryStore {
    fn load(&self, id: &str) -> Result<Option<EntityRecord>> {
        Ok(self.records.get(id).cloned())
    }

    fn save(&mut self, record: &EntityRecord) -> Result<()> {
        self.writes += 1;
        self.records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn ids(&self) -> Result<Vec<String>> {
        Ok(self.records.keys().cloned().collect())
    }
}

// ============================================================================
// ATOMIC FILE REPLACEMENT
// ============================================================================

/// Write `bytes` to `path` so readers see either the old or the new file
pub fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create directory: {}", parent.display()))?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("output");
    let tmp_path = parent.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

    let result = (|| -> Result<()> {
        let mut file = fs::File::create(&tmp_path)
            .with_context(|| format!("Failed to create temp file: {}", tmp_path.display()))?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}
