// Commune Atlas - Core Library
// Official commune tables → resolved identifiers → one JSON record per commune

pub mod error;
pub mod normalize;
pub mod aliases;        // Name resolution: alias table + slug fallback
pub mod regions;
pub mod tables;         // CSV loading (UTF-8 / Latin-1)
pub mod metrics;        // Layers, quantities, provenance
pub mod extract;        // One extractor per official table
pub mod dimensions;
pub mod store;          // Record store + atomic writes
pub mod merge;
pub mod display;
pub mod ledger;         // SQLite audit trail of runs
pub mod config;
pub mod pipeline;

// Re-export commonly used types
pub use error::PipelineError;
pub use normalize::{normalize_name, to_identifier};
pub use aliases::{
    AliasEntry, AliasTable, AliasTarget, NameResolver, Resolution, SlugResolver,
};
pub use regions::{RegionTable, DEFAULT_REGION};
pub use tables::{Encoding, Table, TableOptions};
pub use metrics::{
    MetricValue, Provenance, Quantity, SourceCatalog,
    AREA_KM2, DENSITY, FOREIGN_PCT, POPULATION, PRICE_M2, PRICE_M2_NEW,
};
pub use extract::{
    AreaExtractor, Extraction, Extractor, NationalityExtractor, PopulationExtractor,
    PriceCategory, PriceExtractor, PriceRecord, SkipReason, SkippedRow,
};
pub use dimensions::{Dimension, DimensionFormat, DimensionRegistry};
pub use store::{EntityRecord, JsonDirStore, MemoryStore, RecordStore, UpdateOutcome};
pub use merge::{CommitReport, DerivedStats, LayerChange, MatchStats, Merger};
pub use display::{build_display_data, render_js, DisplayEntry};
pub use ledger::{Event, RunLedger, RunRecord};
pub use config::PipelineConfig;
pub use pipeline::{Pipeline, RunSummary, SourceSummary};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
