//! Field merge strategies (spec §4.4.1). Pure over a slice of per-member
//! observations; no store access here so the resolution logic is directly
//! unit-testable.

use er_types::merged::{FieldValueObservation, MergeConflict, MergeStrategy, MergeStrategyConfig};
use er_types::value::Value;

/// Resolves one field's value across cluster members, returning the merged
/// value and, if the observed values disagreed, a [`MergeConflict`].
#[must_use]
pub fn resolve_field(
    field: &str,
    observations: &[FieldValueObservation],
    strategy: &MergeStrategy,
    config: &MergeStrategyConfig,
) -> (Value, Option<MergeConflict>) {
    let resolved = apply_strategy(observations, strategy, config)
        .filter(|v| !matches!(v, Value::Null))
        .unwrap_or_else(|| apply_strategy(observations, &MergeStrategy::PreferNonEmpty, config).unwrap_or(Value::Null));

    let conflict = distinct_values(observations).and_then(|(values, integrations)| {
        if values.len() < 2 {
            return None;
        }
        Some(MergeConflict {
            field: field.to_owned(),
            values,
            integrations,
            resolution: strategy_name(strategy).to_owned(),
            resolved_value: resolved.clone(),
        })
    });

    (resolved, conflict)
}

fn distinct_values(observations: &[FieldValueObservation]) -> Option<(Vec<Value>, Vec<String>)> {
    let mut seen = std::collections::BTreeSet::new();
    let mut values = Vec::new();
    let mut integrations = Vec::new();
    for obs in observations {
        if seen.insert(obs.value.stringify()) {
            values.push(obs.value.clone());
            integrations.push(obs.integration.clone());
        }
    }
    if values.is_empty() {
        None
    } else {
        Some((values, integrations))
    }
}

fn strategy_name(strategy: &MergeStrategy) -> &'static str {
    match strategy {
        MergeStrategy::MostRecent => "most_recent",
        MergeStrategy::Last => "last",
        MergeStrategy::First => "first",
        MergeStrategy::MostTrusted => "most_trusted",
        MergeStrategy::SourcePriority => "source_priority",
        MergeStrategy::CollectAll { .. } => "collect_all",
        MergeStrategy::Longest => "longest",
        MergeStrategy::Shortest => "shortest",
        MergeStrategy::Max => "max",
        MergeStrategy::Min => "min",
        MergeStrategy::Sum => "sum",
        MergeStrategy::Average => "average",
        MergeStrategy::PreferNonEmpty => "prefer_non_empty",
    }
}

fn apply_strategy(
    observations: &[FieldValueObservation],
    strategy: &MergeStrategy,
    config: &MergeStrategyConfig,
) -> Option<Value> {
    if observations.is_empty() {
        return None;
    }
    match strategy {
        MergeStrategy::MostRecent | MergeStrategy::Last => observations
            .iter()
            .max_by_key(|o| o.updated_at)
            .map(|o| o.value.clone()),
        MergeStrategy::First => observations
            .iter()
            .min_by_key(|o| o.updated_at)
            .map(|o| o.value.clone()),
        MergeStrategy::MostTrusted | MergeStrategy::SourcePriority => observations
            .iter()
            .max_by_key(|o| config.source_priority.get(&o.integration).copied().unwrap_or(0))
            .map(|o| o.value.clone()),
        MergeStrategy::CollectAll { dedup, max_items } => {
            let mut items = Vec::new();
            let mut seen = std::collections::BTreeSet::new();
            for obs in observations {
                let values: Vec<Value> = match &obs.value {
                    Value::Array(arr) => arr.clone(),
                    other => vec![other.clone()],
                };
                for value in values {
                    if *dedup {
                        if seen.insert(value.stringify()) {
                            items.push(value);
                        }
                    } else {
                        items.push(value);
                    }
                    if let Some(max) = max_items {
                        if items.len() >= *max {
                            return Some(Value::Array(items));
                        }
                    }
                }
            }
            Some(Value::Array(items))
        }
        MergeStrategy::Longest => observations
            .iter()
            .max_by_key(|o| o.value.stringify().len())
            .map(|o| o.value.clone()),
        MergeStrategy::Shortest => observations
            .iter()
            .min_by_key(|o| o.value.stringify().len())
            .map(|o| o.value.clone()),
        MergeStrategy::Max => numeric_reduce(observations, f64::max),
        MergeStrategy::Min => numeric_reduce(observations, f64::min),
        MergeStrategy::Sum => {
            let numbers = numeric_values(observations);
            if numbers.is_empty() {
                None
            } else {
                Some(Value::from(numbers.iter().sum::<f64>()))
            }
        }
        MergeStrategy::Average => {
            let numbers = numeric_values(observations);
            if numbers.is_empty() {
                None
            } else {
                Some(Value::from(numbers.iter().sum::<f64>() / numbers.len() as f64))
            }
        }
        MergeStrategy::PreferNonEmpty => observations
            .iter()
            .find(|o| !o.value.is_empty())
            .map(|o| o.value.clone()),
    }
}

fn numeric_values(observations: &[FieldValueObservation]) -> Vec<f64> {
    observations.iter().filter_map(|o| o.value.as_f64()).collect()
}

fn numeric_reduce(observations: &[FieldValueObservation], f: impl Fn(f64, f64) -> f64) -> Option<Value> {
    numeric_values(observations)
        .into_iter()
        .reduce(f)
        .map(Value::from)
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;
    use er_types::ids::{StagedEntityId, TenantId};

    fn obs(value: Value, integration: &str) -> FieldValueObservation {
        FieldValueObservation {
            value,
            updated_at: OffsetDateTime::now_utc(),
            integration: integration.to_owned(),
            source_entity_id: StagedEntityId::new(),
        }
    }

    #[test]
    fn prefer_non_empty_skips_blank_values() {
        let observations = vec![obs(Value::Str(String::new()), "a"), obs(Value::Str("x".into()), "b")];
        let config = MergeStrategyConfig {
            tenant_id: TenantId::new(),
            entity_type: "person".to_owned(),
            ..Default::default()
        };
        let (value, conflict) = resolve_field("name", &observations, &MergeStrategy::PreferNonEmpty, &config);
        assert_eq!(value.as_str(), Some("x"));
        assert!(conflict.is_some());
    }

    #[test]
    fn collect_all_dedups_and_caps() {
        let observations = vec![
            obs(Value::Array(vec!["a".into(), "b".into()]), "x"),
            obs(Value::Array(vec!["b".into(), "c".into()]), "y"),
        ];
        let config = MergeStrategyConfig::default();
        let (value, _) = resolve_field(
            "tags",
            &observations,
            &MergeStrategy::CollectAll { dedup: true, max_items: None },
            &config,
        );
        let Value::Array(items) = value else { panic!("expected array") };
        assert_eq!(items.len(), 3);
    }

    #[test]
    fn no_conflict_when_all_members_agree() {
        let observations = vec![obs(Value::Str("x".into()), "a"), obs(Value::Str("x".into()), "b")];
        let config = MergeStrategyConfig::default();
        let (_, conflict) = resolve_field("name", &observations, &MergeStrategy::First, &config);
        assert!(conflict.is_none());
    }
}
