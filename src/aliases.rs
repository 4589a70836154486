// 🗺️ Alias Table - Source names → commune identifiers
//
// Official spreadsheets spell commune names in several ways
// ("Esch-sur-Alzette", "Esch-Sur-Alzette", "Luxembourg-Ville"...).
// The alias table is the curated, immutable graph from every known spelling
// to one stable identifier, or to an explicit "not in our dataset" marker.
//
// Problem solved:
// - Many spellings → one identifier (merged / renamed communes)
// - Deliberate exclusion is NOT the same as "never heard of it"
// - Resolution is a pure function of (name, table): no hidden state

use crate::error::PipelineError;
use crate::normalize::{is_identifier, normalize_name, to_identifier};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

// ============================================================================
// TARGETS & RESOLUTION
// ============================================================================

/// What an alias entry points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AliasTarget {
    /// Maps to a commune in our dataset
    Commune(String),

    /// Listed on purpose, but outside our dataset
    Excluded,
}

impl AliasTarget {
    pub fn id(&self) -> Option<&str> {
        match self {
            AliasTarget::Commune(id) => Some(id),
            AliasTarget::Excluded => None,
        }
    }
}

/// Outcome of resolving one raw source name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Name resolved to an identifier
    Resolved(String),

    /// Name is known and deliberately maps to nothing
    Excluded,

    /// Name is not known at all
    Unresolved,
}

impl Resolution {
    /// Identifier if resolved. Excluded and Unresolved both yield None.
    pub fn id(&self) -> Option<&str> {
        match self {
            Resolution::Resolved(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Resolution::Resolved(_))
    }
}

/// NameResolver - the seam between extractors and the merger
///
/// Implementations must be pure: same name, same answer, no matter the call order.
pub trait NameResolver {
    fn resolve(&self, raw_name: &str) -> Resolution;

    /// Short label for logs and summaries
    fn kind(&self) -> &str;
}

// ============================================================================
// ALIAS ENTRY (file format)
// ============================================================================

/// One row of an alias file
///
/// `{"name": "Habscht", "id": "hobscheid"}` or `{"name": "Beaufort", "id": null}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AliasEntry {
    pub name: String,
    pub id: Option<String>,
}

impl AliasEntry {
    pub fn new(name: impl Into<String>, id: Option<&str>) -> Self {
        AliasEntry {
            name: name.into(),
            id: id.map(|s| s.to_string()),
        }
    }

    fn target(&self) -> AliasTarget {
        match &self.id {
            Some(id) => AliasTarget::Commune(id.clone()),
            None => AliasTarget::Excluded,
        }
    }
}

#[derive(Debug, Clone)]
struct Alias {
    name: String,
    normalized: String,
    target: AliasTarget,
}

// ============================================================================
// ALIAS TABLE
// ============================================================================

/// Curated mapping from source spellings to identifiers
///
/// Iteration order is the order entries were supplied in. That order only
/// matters for the normalized fallback, and `from_entries` rejects any table
/// where it could change the answer.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    aliases: Vec<Alias>,
    exact: HashMap<String, usize>,
}

impl AliasTable {
    /// Build a table, rejecting ambiguous normalized keys
    pub fn from_entries(entries: Vec<AliasEntry>) -> Result<Self, PipelineError> {
        let mut table = AliasTable::default();
        let mut by_normalized: HashMap<String, usize> = HashMap::new();

        for entry in entries {
            let target = entry.target();
            if let AliasTarget::Commune(id) = &target {
                if !is_identifier(id) {
                    return Err(PipelineError::InvalidIdentifier {
                        name: entry.name,
                        id: id.clone(),
                    });
                }
            }
            let normalized = normalize_name(&entry.name);

            if let Some(&existing) = by_normalized.get(&normalized) {
                let previous = &table.aliases[existing];
                if previous.target != target {
                    return Err(PipelineError::AliasCollision {
                        first: previous.name.clone(),
                        second: entry.name,
                        normalized,
                    });
                }
            }

            if table.exact.contains_key(&entry.name) {
                // Same spelling, same normalized key, same target: nothing to add
                continue;
            }

            let index = table.aliases.len();
            table.exact.insert(entry.name.clone(), index);
            by_normalized.entry(normalized.clone()).or_insert(index);
            table.aliases.push(Alias {
                name: entry.name,
                normalized,
                target,
            });
        }

        Ok(table)
    }

    /// Load a table from a JSON array of `{name, id}` entries
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read alias file: {:?}", path.as_ref()))?;

        let entries: Vec<AliasEntry> =
            serde_json::from_str(&content).context("Failed to parse alias JSON")?;

        Ok(AliasTable::from_entries(entries)?)
    }

    /// Built-in table for the official RNPP / cadastre commune names
    pub fn with_defaults() -> Result<Self, PipelineError> {
        let entries = DEFAULT_ALIASES
            .iter()
            .map(|(name, id)| AliasEntry::new(*name, *id))
            .collect();

        AliasTable::from_entries(entries)
    }

    /// Resolve a raw source name
    ///
    /// 1. Exact lookup (an Excluded hit stops here, it is not "not found")
    /// 2. Normalized comparison against every key, in table order
    /// 3. Unresolved
    pub fn resolve(&self, raw_name: &str) -> Resolution {
        if let Some(&index) = self.exact.get(raw_name) {
            return Self::to_resolution(&self.aliases[index].target);
        }

        let normalized = normalize_name(raw_name);
        self.aliases
            .iter()
            .find(|alias| alias.normalized == normalized)
            .map(|alias| Self::to_resolution(&alias.target))
            .unwrap_or(Resolution::Unresolved)
    }

    fn to_resolution(target: &AliasTarget) -> Resolution {
        match target {
            AliasTarget::Commune(id) => Resolution::Resolved(id.clone()),
            AliasTarget::Excluded => Resolution::Excluded,
        }
    }

    /// Target of an exact key, if listed
    pub fn target_of(&self, name: &str) -> Option<&AliasTarget> {
        self.exact.get(name).map(|&i| &self.aliases[i].target)
    }

    /// All (name, target) pairs in table order
    pub fn entries(&self) -> impl Iterator<Item = (&str, &AliasTarget)> {
        self.aliases.iter().map(|a| (a.name.as_str(), &a.target))
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

impl NameResolver for AliasTable {
    fn resolve(&self, raw_name: &str) -> Resolution {
        AliasTable::resolve(self, raw_name)
    }

    fn kind(&self) -> &str {
        "alias-table"
    }
}

// ============================================================================
// SLUG RESOLVER (no alias table for this source)
// ============================================================================

/// Builds identifiers straight from the raw name
///
/// Special cases cover merged or renamed communes whose name does not
/// slugify to the current identifier.
#[derive(Debug, Clone, Default)]
pub struct SlugResolver {
    overrides: HashMap<String, String>,
}

impl SlugResolver {
    pub fn new() -> Self {
        SlugResolver::default()
    }

    /// Resolver with the known overrides for the housing observatory sheets
    pub fn with_defaults() -> Self {
        let mut resolver = SlugResolver::new();
        for (name, id) in DEFAULT_SLUG_OVERRIDES {
            resolver = resolver.with_override(*name, *id);
        }
        resolver
    }

    /// Builder: add a special-case mapping
    pub fn with_override(mut self, name: impl Into<String>, id: impl Into<String>) -> Self {
        self.overrides.insert(name.into(), id.into());
        self
    }
}

impl NameResolver for SlugResolver {
    fn resolve(&self, raw_name: &str) -> Resolution {
        let name = raw_name.trim();
        let id = match self.overrides.get(name) {
            Some(id) => id.clone(),
            None => to_identifier(name),
        };

        // Characters outside the folding table ("Redange (Attert)") leave an
        // id no record can be stored under
        if is_identifier(&id) {
            Resolution::Resolved(id)
        } else {
            Resolution::Unresolved
        }
    }

    fn kind(&self) -> &str {
        "slug"
    }
}

// ============================================================================
// BUILT-IN DATA
// ============================================================================

const DEFAULT_SLUG_OVERRIDES: &[(&str, &str)] = &[
    ("Luxembourg-Ville", "luxembourg"),
    // Reported as one figure for both former communes
    ("Bous-Waldbredimus", "bous"),
    ("Groussbus-Wal", "grosbous"),
    ("Habscht", "hobscheid"),
];

const DEFAULT_ALIASES: &[(&str, Option<&str>)] = &[
    ("Beaufort", None),
    ("Bech", None),
    ("Beckerich", None),
    ("Berdorf", None),
    ("Bertrange", Some("bertrange")),
    ("Bettembourg", Some("bettembourg")),
    ("Bettendorf", None),
    ("Betzdorf", None),
    ("Bissen", Some("bissen")),
    ("Biwer", None),
    ("Boulaide", None),
    ("Bourscheid", None),
    ("Clervaux", Some("clervaux")),
    ("Colmar-Berg", Some("colmar_berg")),
    ("Consdorf", None),
    ("Contern", Some("contern")),
    ("Dalheim", Some("dalheim")),
    ("Diekirch", Some("diekirch")),
    ("Differdange", Some("differdange")),
    ("Dippach", Some("dippach")),
    ("Dudelange", Some("dudelange")),
    ("Echternach", Some("echternach")),
    ("Ell", Some("ell")),
    ("Erpeldange-sur-Sûre", Some("erpeldange_sur_sure")),
    ("Esch-sur-Alzette", Some("esch_sur_alzette")),
    ("Esch-sur-Sûre", None),
    ("Ettelbruck", Some("ettelbruck")),
    ("Feulen", None),
    ("Fischbach", None),
    ("Flaxweiler", None),
    ("Frisange", Some("frisange")),
    ("Garnich", None),
    ("Goesdorf", None),
    ("Grevenmacher", Some("grevenmacher")),
    ("Grosbous", Some("grosbous")),
    ("Groussbus-Wal", Some("grosbous")),
    ("Habscht", Some("hobscheid")),
    ("Heffingen", None),
    ("Helperknapp", Some("helperknapp")),
    ("Hesperange", Some("hesperange")),
    ("Junglinster", Some("junglinster")),
    ("Kayl", Some("kayl")),
    ("Kehlen", Some("kehlen")),
    ("Kiischpelt", None),
    ("Koerich", None),
    ("Kopstal", Some("kopstal")),
    ("Käerjeng", Some("kaerjeng")),
    ("Lac de la Haute-Sûre", None),
    ("Larochette", Some("larochette")),
    ("Lenningen", None),
    ("Leudelange", Some("leudelange")),
    ("Lintgen", Some("lintgen")),
    ("Lorentzweiler", Some("lorentzweiler")),
    ("Luxembourg", Some("luxembourg")),
    ("Mamer", Some("mamer")),
    ("Manternach", None),
    ("Mersch", Some("mersch")),
    ("Mertert", Some("mertert")),
    ("Mertzig", None),
    ("Mondercange", Some("mondercange")),
    ("Mondorf-les-Bains", Some("mondorf_les_bains")),
    ("Niederanven", Some("niederanven")),
    ("Nommern", None),
    ("Parc Hosingen", Some("parc_hosingen")),
    ("Préizerdaul", None),
    ("Putscheid", None),
    ("Pétange", Some("petange")),
    ("Rambrouch", None),
    ("Reckange-sur-Mess", Some("reckange_sur_mess")),
    ("Redange/Attert", Some("redange")),
    ("Reisdorf", None),
    ("Remich", Some("remich")),
    ("Roeser", Some("roeser")),
    ("Rosport-Mompach", None),
    ("Rumelange", Some("rumelange")),
    ("Saeul", None),
    ("Sandweiler", Some("sandweiler")),
    ("Sanem", Some("sanem")),
    ("Schengen", Some("schengen")),
    ("Schieren", Some("schieren")),
    ("Schifflange", Some("schifflange")),
    ("Schuttrange", Some("schuttrange")),
    ("Stadtbredimus", None),
    ("Steinfort", Some("steinfort")),
    ("Steinsel", Some("steinsel")),
    ("Strassen", Some("strassen")),
    ("Tandel", None),
    ("Troisvierges", None),
    ("Useldange", None),
    ("Vallée de l'Ernz", None),
    ("Vianden", None),
    ("Vichten", None),
    ("Walferdange", Some("walferdange")),
    ("Waldbillig", None),
    ("Weiler-la-Tour", Some("weiler_la_tour")),
    ("Weiswampach", Some("weiswampach")),
    ("Wiltz", Some("wiltz")),
    ("Wincrange", None),
    ("Winseler", None),
    ("Wormeldange", Some("wormeldange")),
    // Spellings used by the nationality export
    ("Colmar - Berg", Some("colmar_berg")),
    ("Erpeldange-Sur-Sûre", Some("erpeldange_sur_sure")),
    ("Esch-Sur-Alzette", Some("esch_sur_alzette")),
    ("Mondorf-Les-Bains", Some("mondorf_les_bains")),
    ("Parc-Hosingen", Some("parc_hosingen")),
    ("Reckange-Sur-Mess", Some("reckange_sur_mess")),
    ("Redange", Some("redange")),
    ("Weiler-La-Tour", Some("weiler_la_tour")),
    ("Luxembourg-Ville", Some("luxembourg")),
];

// ============================================================================
// TESTS
// ============================================================================
