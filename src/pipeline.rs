//! # Pipeline
//!
//! Orchestrates one enrichment run:
//!
//! ```text
//! geocode → Region → fetch (groceries, graph, tracts) → join groceries
//!   → join tracts → grocery travel time → PageRank
//!   → edge averages (travel time, PageRank) → tables → area tagging
//! ```
//!
//! The whole run is wrapped in the disk cache, keyed on the place name and
//! every configuration field that shapes the output. The three fetchers are memoized in-process
//! per query polygon, so repeated runs over the same region inside one
//! `Pipeline` do not refetch.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::accessibility::{add_grocery_travel_time, IsolatedSourcePolicy};
use crate::aggregate::add_average_to_edge;
use crate::cache::DiskCache;
use crate::centrality::{add_pagerank, CentralityConfig};
use crate::config::PipelineConfig;
use crate::join::{join_groceries, join_tracts};
use crate::model::NodeAttribute;
use crate::region::Region;
use crate::sources::{CachedSources, SourceProvider, TagFilter};
use crate::tables::EnrichedTables;
use crate::tagging::tag_area_of_analysis;
use crate::Result;

/// Disk-cache function name of a place-name run.
pub const PLACENAME_FUNCTION: &str = "data_from_placename";

/// Result-affecting configuration beyond place, radius and buffer. Cache
/// directory and invalidation policy are left out.
#[derive(Serialize)]
struct CacheIdentity<'a> {
    grocery_tags: &'a TagFilter,
    circle_segments: usize,
    centrality: &'a CentralityConfig,
    isolated_source_policy: IsolatedSourcePolicy,
    svi_states: Option<Vec<String>>,
}

pub struct Pipeline<P: SourceProvider> {
    sources: CachedSources<P>,
    cache: DiskCache,
    config: PipelineConfig,
}

impl<P: SourceProvider> Pipeline<P> {
    pub fn new(provider: P, config: PipelineConfig) -> Result<Self> {
        Self::with_shared(Arc::new(provider), config)
    }

    /// Build over a provider the caller keeps a handle to.
    pub fn with_shared(provider: Arc<P>, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let cache = DiskCache::open(&config.cache.dir, config.cache.policy)?;
        let sources = CachedSources::new(provider, config.grocery_tags.clone());
        Ok(Self { sources, cache, config })
    }

    pub fn config(&self) -> &PipelineConfig { &self.config }
    pub fn sources(&self) -> &CachedSources<P> { &self.sources }
    pub fn cache(&self) -> &DiskCache { &self.cache }

    /// Disk-cache argument rendering of a place-name run.
    pub fn cache_args(&self, place: &str) -> Result<String> {
        let config = &self.config;
        let identity = CacheIdentity {
            grocery_tags: &config.grocery_tags,
            circle_segments: config.circle_segments,
            centrality: &config.centrality,
            isolated_source_policy: config.isolated_source_policy,
            // Partition order does not change which tracts load
            svi_states: config.svi.as_ref().map(|svi| {
                let mut states: Vec<String> =
                    svi.states.iter().map(|s| s.to_ascii_uppercase()).collect();
                states.sort();
                states.dedup();
                states
            }),
        };
        Ok(format!(
            "({place:?}, {:?}, {:?}, {})",
            config.radius_m,
            config.buffer_m,
            serde_json::to_string(&identity)?
        ))
    }

    /// Enriched tables for a place, served from the disk cache when present.
    pub async fn data_from_placename(&self, place: &str) -> Result<EnrichedTables> {
        let started = Instant::now();
        let args = self.cache_args(place)?;
        let tables = self
            .cache
            .get_or_compute(PLACENAME_FUNCTION, &args, || self.enrich(place))
            .await?;
        tracing::info!(
            stage = PLACENAME_FUNCTION,
            place,
            nodes = tables.nodes.len(),
            edges = tables.edges.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "place enriched"
        );
        Ok(tables)
    }

    /// Geocode `place` and enrich the region around it, bypassing the disk
    /// cache.
    pub async fn enrich(&self, place: &str) -> Result<EnrichedTables> {
        let center = self.sources.geocode(place).await?;
        let region = Region::new(center.y(), center.x(), self.config.radius_m, self.config.buffer_m)?;
        tracing::debug!(place, lat = region.lat(), lon = region.lon(), "geocoded");
        self.enrich_region(&region).await
    }

    /// Run every enrichment stage over `region`.
    pub async fn enrich_region(&self, region: &Region) -> Result<EnrichedTables> {
        let polygons = timed("region", || region.polygons(self.config.circle_segments))?;

        let groceries = self.sources.fetch_groceries(&polygons.query_scope).await?;
        let graph = self.sources.fetch_graph(&polygons.query_scope).await?;
        let tracts = self.sources.read_svi(&polygons.query_scope).await?;

        // The memo keeps the pristine graph; stages mutate a copy
        let mut graph = (*graph).clone();

        timed("merge_grocery", || join_groceries(&mut graph, &groceries))?;
        timed("merge_svi", || join_tracts(&mut graph, &tracts))?;

        let report = timed("nearest_grocery_time", || {
            add_grocery_travel_time(&mut graph, self.config.isolated_source_policy)
        })?;
        tracing::info!(
            sources = report.sources,
            reached = report.reached,
            unreachable = report.unreachable,
            isolated = report.isolated_sources.len(),
            "grocery accessibility"
        );

        timed("pagerank", || add_pagerank(&mut graph, &self.config.centrality))?;

        timed("average_to_edge", || {
            add_average_to_edge(&mut graph, &NodeAttribute::NearestGroceryTime);
            add_average_to_edge(&mut graph, &NodeAttribute::Pagerank);
        });

        timed("tag_area_of_analysis", || tag_area_of_analysis(&mut graph, &polygons));
        Ok(EnrichedTables::from_graph(&graph))
    }
}

/// Run a synchronous stage and log its wall-clock time.
fn timed<T>(stage: &'static str, f: impl FnOnce() -> T) -> T {
    let started = Instant::now();
    let out = f();
    tracing::debug!(stage, elapsed_ms = started.elapsed().as_millis() as u64, "stage finished");
    out
}
