use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A schema-less payload value.
///
/// Mirrors `serde_json::Value` in shape, but is kept as a distinct type so that
/// deep-merge, fingerprinting and JSON-path extraction can be defined as pure,
/// deterministic operations independent of how `serde_json` happens to represent
/// numbers or object key order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Num(OrderedFloat),
    Str(String),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

/// A float wrapper with a total order, so `Value` can derive `PartialEq` and be
/// hashed for fingerprinting without surprising NaN semantics (payloads never
/// legitimately carry NaN; any that arrive are normalized to `0.0`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OrderedFloat(pub f64);

impl PartialEq for OrderedFloat {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl PartialOrd for OrderedFloat {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Eq for OrderedFloat {}

impl Ord for OrderedFloat {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.partial_cmp(&other.0).unwrap_or(Ordering::Equal)
    }
}

impl From<f64> for OrderedFloat {
    fn from(value: f64) -> Self {
        Self(if value.is_nan() { 0.0 } else { value })
    }
}

impl Value {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Str(s) => s.is_empty(),
            Self::Array(items) => items.is_empty(),
            Self::Object(map) => map.is_empty(),
            Self::Bool(_) | Self::Num(_) => false,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Num(n) => Some(n.0),
            Self::Str(s) => s.parse().ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Stringified form used by strategies that compare/dedup by string identity
    /// (`longest`, `shortest`, `collect_all` dedup, conflict-detection equality).
    #[must_use]
    pub fn stringify(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Num(n) => {
                if n.0.fract() == 0.0 && n.0.abs() < 1e15 {
                    format!("{}", n.0 as i64)
                } else {
                    n.0.to_string()
                }
            }
            Self::Str(s) => s.clone(),
            Self::Array(_) | Self::Object(_) => {
                canonical_json_string(self).unwrap_or_default()
            }
        }
    }

    /// Deep-merges `incoming` onto `self` per the staged-store change-detection
    /// contract: object-valued keys are merged key-wise, recursively; any
    /// non-object value (including arrays and `null`) on the incoming side
    /// *replaces* the corresponding value wholesale.
    #[must_use]
    pub fn deep_merge(&self, incoming: &Value) -> Value {
        match (self, incoming) {
            (Value::Object(base), Value::Object(patch)) => {
                let mut merged = base.clone();
                for (key, patch_value) in patch {
                    match merged.get(key) {
                        Some(existing) => {
                            merged.insert(key.clone(), existing.deep_merge(patch_value));
                        }
                        None => {
                            merged.insert(key.clone(), patch_value.clone());
                        }
                    }
                }
                Value::Object(merged)
            }
            // Any other combination: the incoming value wins outright, including
            // when incoming is an array, null, or a scalar, and including the case
            // where `self` was an object but `incoming` is not.
            (_, incoming) => incoming.clone(),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Num(value.into())
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Num(n.as_f64().unwrap_or(0.0).into()),
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Num(n) => serde_json::Number::from_f64(n.0)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s),
            Value::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            Value::Object(map) => serde_json::Value::Object(
                map.into_iter().map(|(k, v)| (k, v.into())).collect(),
            ),
        }
    }
}

/// Serializes a `Value` with object keys in sorted order (guaranteed already by
/// `BTreeMap`) so that structurally equal values always produce byte-identical
/// output, regardless of insertion order upstream. This is the canonical form
/// fingerprinting hashes over.
pub fn canonical_json_string(value: &Value) -> Result<String, serde_json::Error> {
    serde_json::to_string(value)
}

/// Removes the dot/bracket paths named in `exclusions` from a top-level object
/// before fingerprinting. Only top-level and nested object paths are supported,
/// consistent with the JSON-path grammar used by the match-field extractor
/// (`key`, `key.sub`); array indices are not valid fingerprint exclusions.
#[must_use]
pub fn strip_excluded_fields(value: &Value, exclusions: &[String]) -> Value {
    let Value::Object(mut map) = value.clone() else {
        return value.clone();
    };
    for path in exclusions {
        remove_path(&mut map, path);
    }
    Value::Object(map)
}

fn remove_path(map: &mut BTreeMap<String, Value>, path: &str) {
    match path.split_once('.') {
        None => {
            map.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Value::Object(inner)) = map.get_mut(head) {
                remove_path(inner, rest);
            }
        }
    }
}

/// Deterministic 64-bit fingerprint over the canonical serialization of `value`.
/// Used by the staged store to detect whether a payload actually changed across
/// upserts; the function is pure so `fingerprint(x) == fingerprint(x)` always
/// holds and collisions are exactly as likely as `xxh3_64` allows.
#[must_use]
pub fn fingerprint(value: &Value) -> u64 {
    let canonical = canonical_json_string(value).unwrap_or_default();
    xxhash_rust::xxh3::xxh3_64(canonical.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(pairs: impl IntoIterator<Item = (&'static str, Value)>) -> Value {
        Value::Object(pairs.into_iter().map(|(k, v)| (k.to_owned(), v)).collect())
    }

    #[test]
    fn deep_merge_across_sources() {
        let v1 = obj([
            ("email", "john.doe@example.com".into()),
            (
                "name",
                obj([("first", "John".into()), ("last", "Doe".into())]),
            ),
        ]);
        let v2 = obj([
            ("phone", "+1-555-1234".into()),
            ("name", obj([("middle", "Q".into())])),
        ]);
        let v3 = obj([(
            "company",
            obj([("name", "Acme Corp".into()), ("role", "Engineer".into())]),
        )]);

        let merged = v1.deep_merge(&v2).deep_merge(&v3);
        let Value::Object(map) = &merged else {
            panic!("expected object");
        };
        assert_eq!(map["email"].as_str(), Some("john.doe@example.com"));
        assert_eq!(map["phone"].as_str(), Some("+1-555-1234"));
        assert_eq!(map["company"].as_object().unwrap()["name"].as_str(), Some("Acme Corp"));
        let name = map["name"].as_object().unwrap();
        assert_eq!(name["first"].as_str(), Some("John"));
        assert_eq!(name["middle"].as_str(), Some("Q"));
        assert_eq!(name["last"].as_str(), Some("Doe"));
    }

    #[test]
    fn array_values_are_replaced_not_combined() {
        let v1 = obj([
            (
                "tags",
                Value::Array(vec!["tag1".into(), "tag2".into()]),
            ),
            ("status", "active".into()),
        ]);
        let v2 = obj([
            (
                "tags",
                Value::Array(vec!["tag3".into(), "tag4".into(), "tag5".into()]),
            ),
            ("status", "inactive".into()),
        ]);
        let merged = v1.deep_merge(&v2);
        let Value::Object(map) = &merged else {
            panic!("expected object");
        };
        let Value::Array(tags) = &map["tags"] else {
            panic!("expected array");
        };
        assert_eq!(tags.len(), 3);
        assert_eq!(map["status"].as_str(), Some("inactive"));
    }

    #[test]
    fn deep_merge_is_idempotent() {
        let v = obj([("a", 1.0.into()), ("b", obj([("c", "x".into())]))]);
        assert_eq!(v.deep_merge(&v), v);
    }

    #[test]
    fn merging_a_subset_preserves_superset() {
        let superset = obj([("a", 1.0.into()), ("b", "x".into()), ("c", true.into())]);
        let subset = obj([("a", 1.0.into())]);
        assert_eq!(superset.deep_merge(&subset), superset);
    }

    #[test]
    fn fingerprint_is_pure_and_order_independent() {
        let a = obj([("a", 1.0.into()), ("b", 2.0.into())]);
        let b = obj([("b", 2.0.into()), ("a", 1.0.into())]);
        assert_eq!(fingerprint(&a), fingerprint(&a));
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn fingerprint_changes_iff_non_excluded_field_changes() {
        let exclusions = vec!["last_seen".to_owned()];
        let a = obj([("name", "x".into()), ("last_seen", 1.0.into())]);
        let b = obj([("name", "x".into()), ("last_seen", 2.0.into())]);
        let fp_a = fingerprint(&strip_excluded_fields(&a, &exclusions));
        let fp_b = fingerprint(&strip_excluded_fields(&b, &exclusions));
        assert_eq!(fp_a, fp_b);

        let c = obj([("name", "y".into()), ("last_seen", 1.0.into())]);
        let fp_c = fingerprint(&strip_excluded_fields(&c, &exclusions));
        assert_ne!(fp_a, fp_c);
    }
}
