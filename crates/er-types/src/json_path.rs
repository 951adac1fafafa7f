//! Dot/bracket JSON-path extraction used by the match-index writer (spec §4.2).
//!
//! Supported grammar: `key`, `key.sub`, `arr[0]`, `arr[*]`. A `[*]` segment
//! fans out into every array element; callers combine the results per
//! `array_handling`.

use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
    Wildcard,
}

fn parse(path: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    for dotted in path.split('.') {
        let mut rest = dotted;
        loop {
            match rest.find('[') {
                None => {
                    if !rest.is_empty() {
                        segments.push(Segment::Key(rest.to_owned()));
                    }
                    break;
                }
                Some(open) => {
                    if open > 0 {
                        segments.push(Segment::Key(rest[..open].to_owned()));
                    }
                    let close = rest[open..].find(']').map(|i| i + open);
                    let Some(close) = close else { break };
                    let inner = &rest[open + 1..close];
                    if inner == "*" {
                        segments.push(Segment::Wildcard);
                    } else if let Ok(index) = inner.parse::<usize>() {
                        segments.push(Segment::Index(index));
                    }
                    rest = &rest[close + 1..];
                }
            }
        }
    }
    segments
}

/// Extracts every value reachable by `path`. Returns `Vec<&Value>` because a
/// `[*]` wildcard segment can fan out to many values; non-wildcard paths yield
/// at most one.
#[must_use]
pub fn extract<'a>(value: &'a Value, path: &str) -> Vec<&'a Value> {
    let segments = parse(path);
    let mut current: Vec<&'a Value> = vec![value];
    for segment in segments {
        let mut next = Vec::new();
        for value in current {
            match (&segment, value) {
                (Segment::Key(key), Value::Object(map)) => {
                    if let Some(found) = map.get(key) {
                        next.push(found);
                    }
                }
                (Segment::Index(index), Value::Array(items)) => {
                    if let Some(found) = items.get(*index) {
                        next.push(found);
                    }
                }
                (Segment::Wildcard, Value::Array(items)) => {
                    next.extend(items.iter());
                }
                _ => {}
            }
        }
        current = next;
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn obj(pairs: impl IntoIterator<Item = (&'static str, Value)>) -> Value {
        Value::Object(pairs.into_iter().map(|(k, v)| (k.to_owned(), v)).collect::<BTreeMap<_, _>>())
    }

    #[test]
    fn extracts_nested_key() {
        let v = obj([("name", obj([("first", "John".into())]))]);
        let found = extract(&v, "name.first");
        assert_eq!(found, vec![&Value::Str("John".to_owned())]);
    }

    #[test]
    fn extracts_array_index() {
        let v = obj([("emails", Value::Array(vec!["a@x.com".into(), "b@x.com".into()]))]);
        let found = extract(&v, "emails[0]");
        assert_eq!(found, vec![&Value::Str("a@x.com".to_owned())]);
    }

    #[test]
    fn wildcard_fans_out() {
        let v = obj([("emails", Value::Array(vec!["a@x.com".into(), "b@x.com".into()]))]);
        let found = extract(&v, "emails[*]");
        assert_eq!(found.len(), 2);
    }
}
