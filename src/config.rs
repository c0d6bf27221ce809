//! Pipeline configuration, loadable from TOML.
//!
//! ```toml
//! radius_m = 10000.0
//! buffer_m = 5000.0
//! isolated_source_policy = "missing"
//!
//! [grocery_tags]
//! key = "shop"
//! value = "supermarket"
//!
//! [cache]
//! dir = "data/processed/cache"
//! policy = { kind = "max_age", max_age_secs = 86400 }
//!
//! [centrality]
//! damping = 0.85
//!
//! [svi]
//! dir = "data/raw/svi"
//! states = ["IL", "IN"]
//! ```
//!
//! Every field is optional; omitted fields take their defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::accessibility::IsolatedSourcePolicy;
use crate::cache::InvalidationPolicy;
use crate::centrality::CentralityConfig;
use crate::region::DEFAULT_CIRCLE_SEGMENTS;
use crate::sources::{SviDataset, TagFilter};
use crate::{Error, Result};

pub const DEFAULT_RADIUS_M: f64 = 10_000.0;
pub const DEFAULT_BUFFER_M: f64 = 5_000.0;
pub const DEFAULT_CACHE_DIR: &str = "data/processed/cache";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Area-of-analysis radius, meters.
    pub radius_m: f64,
    /// Extra ring fetched around the area of analysis, meters.
    pub buffer_m: f64,
    /// Vertices per region circle.
    pub circle_segments: usize,
    pub grocery_tags: TagFilter,
    pub cache: CacheConfig,
    pub centrality: CentralityConfig,
    pub isolated_source_policy: IsolatedSourcePolicy,
    /// On-disk vulnerability dataset, when tracts come from files.
    pub svi: Option<SviConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            radius_m: DEFAULT_RADIUS_M,
            buffer_m: DEFAULT_BUFFER_M,
            circle_segments: DEFAULT_CIRCLE_SEGMENTS,
            grocery_tags: TagFilter::default(),
            cache: CacheConfig::default(),
            centrality: CentralityConfig::default(),
            isolated_source_policy: IsolatedSourcePolicy::default(),
            svi: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub dir: PathBuf,
    pub policy: InvalidationPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { dir: PathBuf::from(DEFAULT_CACHE_DIR), policy: InvalidationPolicy::Never }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SviConfig {
    pub dir: PathBuf,
    pub states: Vec<String>,
}

impl SviConfig {
    pub fn dataset(&self) -> SviDataset {
        SviDataset::open(&self.dir, self.states.iter().cloned())
    }
}

impl PipelineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.radius_m.is_finite() && self.radius_m > 0.0) {
            return Err(Error::Config(format!("radius_m must be positive, got {}", self.radius_m)));
        }
        if !(self.buffer_m.is_finite() && self.buffer_m >= 0.0) {
            return Err(Error::Config(format!("buffer_m must be non-negative, got {}", self.buffer_m)));
        }
        if self.circle_segments < 3 {
            return Err(Error::Config(format!(
                "circle_segments must be at least 3, got {}",
                self.circle_segments
            )));
        }
        if self.grocery_tags.key.is_empty() {
            return Err(Error::Config("grocery_tags.key must not be empty".into()));
        }
        if let Some(svi) = &self.svi {
            if svi.states.is_empty() {
                return Err(Error::Config("svi.states must name at least one state".into()));
            }
        }
        self.centrality.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(PipelineConfig::from_toml_str("").unwrap(), PipelineConfig::default());
    }

    #[test]
    fn test_full_toml() {
        let text = r#"
            radius_m = 2000.0
            buffer_m = 0.0
            isolated_source_policy = "missing"

            [grocery_tags]
            key = "shop"
            value = "greengrocer"

            [cache]
            dir = "/tmp/ag-cache"
            policy = { kind = "max_age", max_age_secs = 60 }

            [centrality]
            damping = 0.9

            [svi]
            dir = "svi"
            states = ["IL"]
        "#;
        let config = PipelineConfig::from_toml_str(text).unwrap();
        assert_eq!(config.radius_m, 2000.0);
        assert_eq!(config.buffer_m, 0.0);
        assert_eq!(config.isolated_source_policy, IsolatedSourcePolicy::Missing);
        assert_eq!(config.grocery_tags, TagFilter::new("shop", "greengrocer"));
        assert_eq!(config.cache.policy, InvalidationPolicy::MaxAge { max_age_secs: 60 });
        assert_eq!(config.centrality.damping, 0.9);
        assert_eq!(config.centrality.max_iterations, 100);
        assert_eq!(config.svi.unwrap().dataset().states(), ["IL".to_string()]);
    }

    #[test]
    fn test_invalid_values_rejected() {
        for text in [
            "radius_m = 0.0",
            "radius_m = -1.0",
            "buffer_m = -5.0",
            "circle_segments = 2",
            "[centrality]\ndamping = 1.5",
        ] {
            assert!(matches!(PipelineConfig::from_toml_str(text), Err(Error::Config(_))), "{text}");
        }
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(matches!(PipelineConfig::from_toml_str("radius = 5.0"), Err(Error::Config(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(PipelineConfig::load(dir.path().join("none.toml")), Err(Error::Config(_))));
    }
}
