//! Criteria evaluation for the criteria path (spec §4.5).

use std::collections::BTreeMap;

use er_types::staged::{CriteriaOperator, StagedEntity};
use er_types::value::{canonical_json_string, Value};

/// Computes the deterministic hash a [`StagedRelationshipCriteria`] is keyed
/// by, over its canonicalized operator map.
///
/// [`StagedRelationshipCriteria`]: er_types::staged::StagedRelationshipCriteria
#[must_use]
pub fn criteria_hash(criteria: &BTreeMap<String, CriteriaOperator>) -> u64 {
    let serializable: BTreeMap<&String, &CriteriaOperator> = criteria.iter().collect();
    let canonical = serde_json::to_string(&serializable).unwrap_or_default();
    xxhash_rust::xxh3::xxh3_64(canonical.as_bytes())
}

/// Evaluates every operator in `criteria` against `entity.data`; all must
/// hold for the entity to match (spec §4.5 criteria path step 2).
#[must_use]
pub fn matches(entity: &StagedEntity, criteria: &BTreeMap<String, CriteriaOperator>) -> bool {
    let Some(data) = entity.data.as_object() else {
        return false;
    };
    criteria.iter().all(|(field, operator)| {
        let actual = data.get(field);
        evaluate(actual, operator)
    })
}

fn evaluate(actual: Option<&Value>, operator: &CriteriaOperator) -> bool {
    match operator {
        CriteriaOperator::Eq(expected) => actual.map(|v| values_equal(v, expected)).unwrap_or(false),
        CriteriaOperator::Contains(expected) => match actual {
            Some(Value::Array(items)) => items.iter().any(|item| values_equal(item, expected)),
            _ => false,
        },
        CriteriaOperator::In(options) => actual
            .map(|v| options.iter().any(|option| values_equal(v, option)))
            .unwrap_or(false),
        CriteriaOperator::Gte(threshold) => actual.and_then(Value::as_f64).is_some_and(|v| v >= *threshold),
        CriteriaOperator::Gt(threshold) => actual.and_then(Value::as_f64).is_some_and(|v| v > *threshold),
        CriteriaOperator::Lte(threshold) => actual.and_then(Value::as_f64).is_some_and(|v| v <= *threshold),
        CriteriaOperator::Lt(threshold) => actual.and_then(Value::as_f64).is_some_and(|v| v < *threshold),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (canonical_json_string(a), canonical_json_string(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;
    use er_types::ids::{StagedEntityId, TenantId};

    fn entity(data: Value) -> StagedEntity {
        StagedEntity {
            id: StagedEntityId::new(),
            tenant_id: TenantId::new(),
            config_id: "cfg".into(),
            entity_type: "company".into(),
            source_id: "s1".into(),
            integration: "crm".into(),
            source_key: "k".into(),
            execution_id: "e1".into(),
            last_seen_execution: "e1".into(),
            data,
            fingerprint: 0,
            previous_fingerprint: None,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
            deleted_at: None,
        }
    }

    #[test]
    fn gte_operator_matches_numeric_threshold() {
        let e = entity(Value::Object(BTreeMap::from([("revenue".to_owned(), Value::from(500.0))])));
        let mut criteria = BTreeMap::new();
        criteria.insert("revenue".to_owned(), CriteriaOperator::Gte(100.0));
        assert!(matches(&e, &criteria));

        let mut too_high = BTreeMap::new();
        too_high.insert("revenue".to_owned(), CriteriaOperator::Gte(1000.0));
        assert!(!matches(&e, &too_high));
    }

    #[test]
    fn contains_operator_checks_array_membership() {
        let e = entity(Value::Object(BTreeMap::from([(
            "tags".to_owned(),
            Value::Array(vec![Value::from("vip"), Value::from("east")]),
        )])));
        let mut criteria = BTreeMap::new();
        criteria.insert("tags".to_owned(), CriteriaOperator::Contains(Value::from("vip")));
        assert!(matches(&e, &criteria));
    }

    #[test]
    fn criteria_hash_is_stable_across_map_construction_order() {
        let mut a = BTreeMap::new();
        a.insert("x".to_owned(), CriteriaOperator::Eq(Value::from("1")));
        a.insert("y".to_owned(), CriteriaOperator::Eq(Value::from("2")));

        let mut b = BTreeMap::new();
        b.insert("y".to_owned(), CriteriaOperator::Eq(Value::from("2")));
        b.insert("x".to_owned(), CriteriaOperator::Eq(Value::from("1")));

        assert_eq!(criteria_hash(&a), criteria_hash(&b));
    }
}
