//! Disk-backed result cache.
//!
//! Entries are keyed by a SHA-256 over the function name, a textual
//! rendering of its arguments and the policy generation. Each entry is one
//! JSON file `<dir>/<key>.json` holding an envelope with the payload.
//!
//! ## Semantics
//!
//! - A missing, stale or unreadable entry is a miss. Unreadable entries are
//!   logged and overwritten by the recomputed result.
//! - Writes go to a temporary sibling file and are renamed into place, so a
//!   reader never observes a partially written entry. Concurrent writers of
//!   the same key race; the last rename wins.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{Error, Result};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// When a stored entry stops being served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum InvalidationPolicy {
    /// Entries are served forever.
    #[default]
    Never,
    /// Entries older than `max_age_secs` are misses.
    MaxAge { max_age_secs: u64 },
    /// The generation is part of every key; bumping it orphans old entries.
    Generation { generation: u64 },
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    key: String,
    function: String,
    created_at: DateTime<Utc>,
    payload: T,
}

/// Content-hash keyed JSON cache in a directory.
#[derive(Debug, Clone)]
pub struct DiskCache {
    dir: PathBuf,
    policy: InvalidationPolicy,
}

impl DiskCache {
    /// Open (creating if needed) a cache directory.
    pub fn open(dir: impl Into<PathBuf>, policy: InvalidationPolicy) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, policy })
    }

    pub fn dir(&self) -> &Path { &self.dir }
    pub fn policy(&self) -> InvalidationPolicy { self.policy }

    /// Deterministic key for a function name and its rendered arguments.
    pub fn key(&self, function: &str, args: &str) -> String {
        let generation = match self.policy {
            InvalidationPolicy::Generation { generation } => generation,
            _ => 0,
        };
        let mut hasher = Sha256::new();
        hasher.update(function.as_bytes());
        hasher.update([0x1f]);
        hasher.update(args.as_bytes());
        hasher.update([0x1f]);
        hasher.update(generation.to_le_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Read an entry. `Ok(None)` on a miss or a stale entry; `CacheCorruption`
    /// when the file exists but cannot be decoded.
    pub fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let path = self.path_for(key);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Io(e)),
        };

        let envelope: Envelope<T> = serde_json::from_slice(&bytes).map_err(|e| {
            Error::CacheCorruption { path: path.clone(), message: e.to_string() }
        })?;
        if envelope.key != key {
            return Err(Error::CacheCorruption {
                path,
                message: format!("entry key {} does not match file name", envelope.key),
            });
        }

        if let InvalidationPolicy::MaxAge { max_age_secs } = self.policy {
            let age = (Utc::now() - envelope.created_at).num_seconds();
            if age > max_age_secs as i64 {
                tracing::debug!(key, age, max_age_secs, "cache entry stale");
                return Ok(None);
            }
        }

        Ok(Some(envelope.payload))
    }

    /// Persist an entry atomically, replacing any existing file.
    pub fn write<T: Serialize>(&self, key: &str, function: &str, payload: &T) -> Result<PathBuf> {
        let envelope = Envelope {
            key: key.to_string(),
            function: function.to_string(),
            created_at: Utc::now(),
            payload,
        };
        let bytes = serde_json::to_vec(&envelope)?;

        let path = self.path_for(key);
        let tmp = self.dir.join(format!(
            ".{key}.{}.{}.tmp",
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        std::fs::write(&tmp, &bytes)?;
        if let Err(e) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(Error::Io(e));
        }
        Ok(path)
    }

    pub fn remove(&self, key: &str) -> Result<bool> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Serve `function(args)` from disk, or compute and persist it.
    ///
    /// The result is written before it is returned; a failed computation
    /// writes nothing.
    pub async fn get_or_compute<T, F, Fut>(&self, function: &str, args: &str, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let key = self.key(function, args);
        match self.read::<T>(&key) {
            Ok(Some(hit)) => {
                tracing::debug!(function, key = %key, "disk cache hit");
                return Ok(hit);
            }
            Ok(None) => tracing::debug!(function, key = %key, "disk cache miss"),
            Err(e) => tracing::warn!(function, key = %key, error = %e, "cache error, recomputing"),
        }

        let value = compute().await?;
        let path = self.write(&key, function, &value)?;
        tracing::debug!(function, path = %path.display(), "disk cache stored");
        Ok(value)
    }
}
