//! Argument Values
//!
//! Every node consumes and produces an [`ArgMap`]: an insertion-ordered map
//! from string keys to JSON-like [`Value`]s. Keeping insertion order makes
//! merged inputs and serialized documents deterministic.

use indexmap::IndexMap;

pub use serde_json::Value;

/// Ordered mapping of argument names to values.
pub type ArgMap = IndexMap<String, Value>;

/// Merge `fragment` into `target`. Keys already present are overwritten, so
/// the fragment always wins on collision.
pub fn merge_into(target: &mut ArgMap, fragment: ArgMap) {
    for (key, value) in fragment {
        target.insert(key, value);
    }
}

/// Build an [`ArgMap`] from `(key, value)` pairs.
///
/// ```rust
/// use conflux_core::value::args;
/// use serde_json::json;
///
/// let map = args([("op", json!("add")), ("x", json!(1))]);
/// assert_eq!(map["x"], json!(1));
/// ```
pub fn args<K, I>(pairs: I) -> ArgMap
where
    K: Into<String>,
    I: IntoIterator<Item = (K, Value)>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

/// Convert a JSON object into an [`ArgMap`]. Non-object values yield `None`.
pub fn from_object(value: Value) -> Option<ArgMap> {
    match value {
        Value::Object(map) => Some(map.into_iter().collect()),
        _ => None,
    }
}
