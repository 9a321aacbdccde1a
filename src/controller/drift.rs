//! Drift detection between desired and live child objects
//!
//! Desired objects are sparse: the API server fills in defaults (strategy,
//! termination grace period, cluster IP, ...) when they are stored. Comparing
//! a sparse desired object against a live one would always report drift, so
//! the desired object is first run through a server-side dry-run update. The
//! result carries the same defaulting the live object went through, and only
//! then are the two specs compared.
//!
//! The comparison is semantic: a missing field, an explicit `null`, an empty
//! list and an empty map all mean "unset" and compare equal.

use serde_json::Value;

use super::store::ChildObject;
use crate::Error;

/// Returns true if the dry-run result differs from the live object
pub fn needs_update<K: ChildObject>(materialized: &K, live: &K) -> Result<bool, Error> {
    let desired = materialized.spec_value()?;
    let current = live.spec_value()?;
    Ok(!semantic_eq(&desired, &current))
}

/// Compare two JSON documents treating every form of "unset" as equal
pub fn semantic_eq(a: &Value, b: &Value) -> bool {
    normalize(a.clone()) == normalize(b.clone())
}

/// Strip nulls, empty arrays and empty objects, recursively
///
/// Returns `Value::Null` if nothing is left.
pub fn normalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let map: serde_json::Map<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, normalize(v)))
                .filter(|(_, v)| !v.is_null())
                .collect();
            if map.is_empty() {
                Value::Null
            } else {
                Value::Object(map)
            }
        }
        Value::Array(items) => {
            if items.is_empty() {
                Value::Null
            } else {
                // positions in a list are significant, so elements stay even when empty
                Value::Array(items.into_iter().map(normalize).collect())
            }
        }
        other => other,
    }
}
