//! In-process memo keyed on argument content.
//!
//! Geometry arguments are keyed by their canonical WKT rendering, so two
//! equal polygons built independently hit the same entry. Entries live for
//! the lifetime of the memo; there is no eviction. Failed fetches are not
//! stored.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use geo::{Geometry, Point, Polygon};
use hashbrown::HashMap;
use parking_lot::Mutex;
use wkt::ToWkt;

use crate::Result;

/// Content-based identity of a memo argument.
pub trait CanonicalKey {
    fn canonical_key(&self) -> String;
}

impl CanonicalKey for Polygon<f64> {
    fn canonical_key(&self) -> String { self.wkt_string() }
}

impl CanonicalKey for Point<f64> {
    fn canonical_key(&self) -> String { self.wkt_string() }
}

impl CanonicalKey for Geometry<f64> {
    fn canonical_key(&self) -> String { self.wkt_string() }
}

impl CanonicalKey for str {
    fn canonical_key(&self) -> String { self.to_string() }
}

/// Hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Unbounded memo of shared values.
pub struct Memo<V> {
    name: &'static str,
    entries: Mutex<HashMap<String, Arc<V>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V> Memo<V> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get<K: CanonicalKey + ?Sized>(&self, key: &K) -> Option<Arc<V>> {
        self.entries.lock().get(&key.canonical_key()).cloned()
    }

    /// Return the memoized value for `key`, running `fetch` on a miss.
    ///
    /// The lock is not held while `fetch` runs; two concurrent misses on the
    /// same key both fetch and the first stored value wins.
    pub async fn get_or_try_fetch<K, F, Fut>(&self, key: &K, fetch: F) -> Result<Arc<V>>
    where
        K: CanonicalKey + ?Sized,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let key = key.canonical_key();
        let cached = self.entries.lock().get(&key).cloned();
        if let Some(hit) = cached {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(memo = self.name, "memo hit");
            return Ok(hit);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(memo = self.name, "memo miss");
        let value = Arc::new(fetch().await?);

        let mut entries = self.entries.lock();
        Ok(entries.entry(key).or_insert(value).clone())
    }

    pub fn len(&self) -> usize { self.entries.lock().len() }
    pub fn is_empty(&self) -> bool { self.entries.lock().is_empty() }

    /// Drop every entry. Long-running callers use this to bound growth.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn stats(&self) -> MemoStats {
        MemoStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use geo::polygon;

    fn square(offset: f64) -> Polygon<f64> {
        polygon![
            (x: offset, y: 0.0), (x: offset + 1.0, y: 0.0),
            (x: offset + 1.0, y: 1.0), (x: offset, y: 1.0),
        ]
    }

    #[tokio::test]
    async fn test_equal_polygons_share_an_entry() {
        let memo: Memo<usize> = Memo::new("test");
        let a = memo.get_or_try_fetch(&square(0.0), || async { Ok(1) }).await.unwrap();
        // Independently constructed but equal geometry
        let b = memo.get_or_try_fetch(&square(0.0), || async { Ok(2) }).await.unwrap();
        let c = memo.get_or_try_fetch(&square(5.0), || async { Ok(3) }).await.unwrap();
        assert_eq!((*a, *b, *c), (1, 1, 3));
        assert_eq!(memo.stats(), MemoStats { hits: 1, misses: 2, entries: 2 });
    }

    #[tokio::test]
    async fn test_errors_are_not_memoized() {
        let memo: Memo<usize> = Memo::new("test");
        let err = memo
            .get_or_try_fetch(&square(0.0), || async { Err(Error::EmptyResult("nothing".into())) })
            .await;
        assert!(err.is_err());
        assert!(memo.is_empty());
        let ok = memo.get_or_try_fetch(&square(0.0), || async { Ok(7) }).await.unwrap();
        assert_eq!(*ok, 7);
        memo.clear();
        assert!(memo.get(&square(0.0)).is_none());
    }
}
