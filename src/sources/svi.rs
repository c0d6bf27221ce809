//! On-disk vulnerability (SVI) tract dataset, partitioned by state.
//!
//! Layout: one JSON file per state code, `<root>/<STATE>.json`, holding an
//! array of tract rows:
//!
//! ```text
//! [{"geoid": "17031410100", "wkt": "MULTIPOLYGON (...)",
//!   "attributes": {"E_TOTPOP": 3120, "AREA_SQMI": 0.21, "RPL_THEMES": 0.87}}]
//! ```
//!
//! Numeric attributes equal to the SVI missing sentinel (`-999`) load as
//! `Null`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use geo::{Geometry, MultiPolygon, Polygon};
use serde::{Deserialize, Serialize};
use wkt::{ToWkt, TryFromWkt};

use super::{SourceKind, Tract};
use crate::model::{PropertyMap, Value};
use crate::{Error, Result};

/// SVI's encoding of a missing estimate.
pub const MISSING_SENTINEL: f64 = -999.0;

#[derive(Debug, Serialize, Deserialize)]
struct TractRow {
    geoid: String,
    wkt: String,
    attributes: BTreeMap<String, serde_json::Value>,
}

/// State-partitioned tract dataset rooted at a directory.
#[derive(Debug, Clone, PartialEq)]
pub struct SviDataset {
    root: PathBuf,
    states: Vec<String>,
}

impl SviDataset {
    /// Dataset over `root`, loading the given state partitions.
    pub fn open(root: impl Into<PathBuf>, states: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            root: root.into(),
            states: states.into_iter().map(|s| s.into().to_ascii_uppercase()).collect(),
        }
    }

    pub fn root(&self) -> &Path { &self.root }
    pub fn states(&self) -> &[String] { &self.states }

    pub fn partition_path(&self, state: &str) -> PathBuf {
        self.root.join(format!("{}.json", state.to_ascii_uppercase()))
    }

    /// Every tract of every configured state. `_scope` selects nothing here;
    /// intersection filtering happens in the fetcher.
    pub fn read(&self, _scope: &Polygon<f64>) -> Result<Vec<Tract>> {
        let mut tracts = Vec::new();
        for state in &self.states {
            tracts.extend(self.read_state(state)?);
        }
        Ok(tracts)
    }

    /// Load a single state partition.
    pub fn read_state(&self, state: &str) -> Result<Vec<Tract>> {
        let path = self.partition_path(state);
        let bytes = std::fs::read(&path).map_err(|e| Error::SourceUnavailable {
            source_kind: SourceKind::Vulnerability,
            message: format!("{}: {e}", path.display()),
        })?;
        let rows: Vec<TractRow> =
            serde_json::from_slice(&bytes).map_err(|e| Error::SourceUnavailable {
                source_kind: SourceKind::Vulnerability,
                message: format!("{}: malformed partition: {e}", path.display()),
            })?;
        rows.into_iter().map(tract_from_row).collect()
    }

    /// Write a state partition (used to build fixture datasets).
    pub fn write_state(&self, state: &str, tracts: &[Tract]) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.root)?;
        let rows: Vec<TractRow> = tracts
            .iter()
            .map(|t| TractRow {
                geoid: t.geoid.clone(),
                wkt: t.geometry.wkt_string(),
                attributes: t.attributes.iter().map(|(k, v)| (k.clone(), to_json(v))).collect(),
            })
            .collect();
        let path = self.partition_path(state);
        std::fs::write(&path, serde_json::to_vec_pretty(&rows)?)?;
        Ok(path)
    }
}

fn tract_from_row(row: TractRow) -> Result<Tract> {
    let geometry = match Geometry::<f64>::try_from_wkt_str(&row.wkt) {
        Ok(Geometry::MultiPolygon(mp)) => mp,
        Ok(Geometry::Polygon(p)) => MultiPolygon::new(vec![p]),
        Ok(other) => {
            return Err(Error::InvalidData(format!(
                "tract {} has non-areal geometry {other:?}",
                row.geoid
            )))
        }
        Err(e) => return Err(Error::InvalidData(format!("tract {}: bad WKT: {e}", row.geoid))),
    };
    let attributes: PropertyMap = row
        .attributes
        .into_iter()
        .map(|(k, v)| (k, from_json(v)))
        .collect();
    Ok(Tract { geoid: row.geoid, geometry, attributes })
}

fn from_json(v: serde_json::Value) -> Value {
    match v {
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (_, Some(f)) if f == MISSING_SENTINEL => Value::Null,
            (Some(i), _) => Value::Int(i),
            (None, Some(f)) => Value::from(f),
            (None, None) => Value::Null,
        },
        serde_json::Value::String(s) => Value::String(s),
        _ => Value::Null,
    }
}

fn to_json(v: &Value) -> serde_json::Value {
    match v {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => (*b).into(),
        Value::Int(i) => (*i).into(),
        Value::Float(f) => (*f).into(),
        Value::String(s) => s.clone().into(),
    }
}
