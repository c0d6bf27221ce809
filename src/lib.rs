//! # accessgraph: Street-Network Accessibility Enrichment
//!
//! Computes, for a named place, a street-network graph enriched with:
//! travel time to the nearest grocery store, tract-level vulnerability
//! attributes joined by containment, and a PageRank importance score.
//!
//! ## Design Principles
//!
//! 1. **Trait-first**: `SourceProvider` is the contract between the pipeline
//!    and every external data collaborator (geocoder, POI query, road
//!    network, vulnerability dataset)
//! 2. **Clean DTOs**: `StreetNode`, `StreetEdge`, `Value` cross all stages
//! 3. **Mutate in place**: one arena graph is threaded through every stage
//! 4. **Fail loudly**: empty sources and degenerate graphs are errors, never
//!    a placeholder zero
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use accessgraph::{MemorySources, Pipeline, PipelineConfig};
//!
//! # async fn example(sources: MemorySources) -> accessgraph::Result<()> {
//! let pipeline = Pipeline::new(sources, PipelineConfig::default())?;
//! let tables = pipeline.data_from_placename("Hyde Park, Chicago").await?;
//!
//! for node in tables.nodes.iter().filter(|n| n.in_area_of_analysis) {
//!     println!("{} {:?}", node.osmid, node.nearest_grocery_time);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Stages
//!
//! | Stage | Module |
//! |-------|--------|
//! | Region circles | `region` |
//! | Memoized fetchers | `sources::fetch` |
//! | Spatial joins (equal-area) | `join` |
//! | Grocery travel time | `accessibility` |
//! | PageRank | `centrality` |
//! | Node → edge averaging | `aggregate` |
//! | Area-of-analysis tagging | `tagging` |
//! | Disk-cached orchestration | `pipeline` |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod crs;
pub mod region;
pub mod cache;
pub mod sources;
pub mod join;
pub mod accessibility;
pub mod centrality;
pub mod aggregate;
pub mod tagging;
pub mod tables;
pub mod config;
pub mod pipeline;

// ============================================================================
// Re-exports: Model (the DTOs)
// ============================================================================

pub use model::{
    StreetNode, StreetEdge, StreetGraph, Value, PropertyMap,
    NodeId, EdgeId, NodeAttribute,
};

// ============================================================================
// Re-exports: Sources, caching, configuration
// ============================================================================

pub use sources::{
    SourceProvider, SourceKind, MemorySources, TagFilter,
    PoiFeature, RoadNetwork, RawNode, RawEdge, Tract,
};
pub use cache::{DiskCache, InvalidationPolicy, Memo};
pub use config::PipelineConfig;
pub use region::{Region, RegionPolygons};

// ============================================================================
// Re-exports: Pipeline + outputs
// ============================================================================

pub use pipeline::Pipeline;
pub use tables::{EnrichedTables, NodeRecord, EdgeRecord};
pub use accessibility::{AccessibilityReport, IsolatedSourcePolicy};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An upstream data call failed. Not retried here.
    #[error("{source_kind} source unavailable: {message}")]
    SourceUnavailable { source_kind: SourceKind, message: String },

    /// A fetch or aggregation produced nothing to work with.
    #[error("Empty result: {0}")]
    EmptyResult(String),

    /// A disk cache entry could not be decoded. Recovered by recomputation.
    #[error("Corrupted cache entry {}: {message}", path.display())]
    CacheCorruption { path: std::path::PathBuf, message: String },

    /// The graph has no grocery-flagged nodes; accessibility is undefined.
    #[error("Degenerate graph: {0}")]
    DegenerateGraph(String),

    #[error("Invalid region: {0}")]
    InvalidRegion(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("PageRank did not converge after {iterations} iterations")]
    Convergence { iterations: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
