//! PropertyMap: the key-value store on nodes, edges and tracts.

use std::collections::BTreeMap;
use super::Value;

/// A map of attribute names to values.
///
/// Ordered so that serialized tables are byte-stable across runs.
pub type PropertyMap = BTreeMap<String, Value>;

/// Build a PropertyMap from (key, value) pairs.
pub fn props<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> PropertyMap
where
    K: Into<String>,
    V: Into<Value>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}
