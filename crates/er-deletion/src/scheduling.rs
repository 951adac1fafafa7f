//! Scope evaluation and the scheduling loop (spec §4.6 steps 1-3).

use er_types::deletion::{CompositeOperator, DeletionStrategy, ExecutionTracking, StrategyConfig};
use er_types::staged::StagedEntity;
use time::{Duration, OffsetDateTime};

/// Whether `entity` falls within a strategy's deletion scope, evaluated
/// against the execution that triggered scheduling.
#[must_use]
pub fn qualifies(entity: &StagedEntity, config: &StrategyConfig, execution: &ExecutionTracking) -> bool {
    match config {
        StrategyConfig::Explicit => false,
        StrategyConfig::ExecutionBased { .. } => entity.last_seen_execution != execution.execution_id,
        StrategyConfig::Staleness { check_field, max_age_days } => {
            older_than(check_field_value(entity, check_field, "updated_at"), Duration::days(*max_age_days))
        }
        StrategyConfig::Retention { check_field, retention_days } => {
            older_than(check_field_value(entity, check_field, "created_at"), Duration::days(*retention_days))
        }
        StrategyConfig::Composite { operator, strategies } => {
            let mut results = strategies.iter().map(|s| qualifies(entity, s, execution));
            match operator {
                CompositeOperator::And => results.all(|r| r),
                CompositeOperator::Or => results.any(|r| r),
            }
        }
    }
}

/// `scheduled_for` per spec §4.6: `completed_at + grace_period` for
/// `execution_based`; immediate (`now`) for staleness/retention matches,
/// since those are already past their age threshold by definition.
#[must_use]
pub fn scheduled_for(config: &StrategyConfig, execution: &ExecutionTracking) -> OffsetDateTime {
    match config {
        StrategyConfig::ExecutionBased { .. } => {
            execution.completed_at.unwrap_or_else(OffsetDateTime::now_utc) + config.grace_period()
        }
        StrategyConfig::Composite { strategies, .. } => strategies
            .iter()
            .map(|s| scheduled_for(s, execution))
            .max()
            .unwrap_or_else(OffsetDateTime::now_utc),
        _ => OffsetDateTime::now_utc(),
    }
}

fn check_field_value(entity: &StagedEntity, check_field: &str, default_field: &str) -> OffsetDateTime {
    match if check_field.is_empty() { default_field } else { check_field } {
        "created_at" => entity.created_at,
        _ => entity.updated_at,
    }
}

fn older_than(field_time: OffsetDateTime, max_age: Duration) -> bool {
    OffsetDateTime::now_utc() - field_time > max_age
}

/// One entity qualified under one selected strategy, ready to be scheduled.
pub struct ScheduledCandidate {
    pub staged_entity_id: er_types::ids::StagedEntityId,
    pub scheduled_for: OffsetDateTime,
}

/// Evaluates every entity in scope against the applicable strategy for its
/// `(integration, source_key)`, returning the ones that qualify for deletion
/// (spec §4.6 step 2).
#[must_use]
pub fn evaluate_scope(
    entities: &[StagedEntity],
    strategies: &[DeletionStrategy],
    execution: &ExecutionTracking,
) -> Vec<ScheduledCandidate> {
    entities
        .iter()
        .filter_map(|entity| {
            let strategy = crate::strategy_selection::select(strategies, &entity.integration, &entity.source_key)?;
            if !qualifies(entity, &strategy.config, execution) {
                return None;
            }
            Some(ScheduledCandidate {
                staged_entity_id: entity.id,
                scheduled_for: scheduled_for(&strategy.config, execution),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use er_types::ids::{StagedEntityId, TenantId};

    use super::*;

    fn entity(last_seen_execution: &str) -> StagedEntity {
        let now = OffsetDateTime::now_utc();
        StagedEntity {
            id: StagedEntityId::new(),
            tenant_id: TenantId::new(),
            config_id: "cfg".into(),
            entity_type: "person".into(),
            source_id: "s1".into(),
            integration: "crm".into(),
            source_key: "contacts".into(),
            execution_id: last_seen_execution.into(),
            last_seen_execution: last_seen_execution.into(),
            data: er_types::value::Value::Null,
            fingerprint: 0,
            previous_fingerprint: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    fn execution(execution_id: &str) -> ExecutionTracking {
        ExecutionTracking {
            tenant_id: TenantId::new(),
            plan_id: "plan-1".into(),
            entity_type: "person".into(),
            execution_id: execution_id.into(),
            started_at: OffsetDateTime::now_utc(),
            completed_at: Some(OffsetDateTime::now_utc()),
            entity_count: 1,
            processed_at: None,
        }
    }

    #[test]
    fn execution_based_strategy_qualifies_entities_not_seen_in_latest_run() {
        let exec = execution("exec-2");
        let stale = entity("exec-1");
        let fresh = entity("exec-2");
        let config = StrategyConfig::ExecutionBased { grace_period: None, grace_period_seconds: 3600 };

        assert!(qualifies(&stale, &config, &exec));
        assert!(!qualifies(&fresh, &config, &exec));

        let when = scheduled_for(&config, &exec);
        assert!(when > exec.completed_at.unwrap());
    }

    #[test]
    fn staleness_strategy_qualifies_old_updated_at() {
        let exec = execution("exec-1");
        let mut old = entity("exec-1");
        old.updated_at = OffsetDateTime::now_utc() - Duration::days(200);
        let config = StrategyConfig::Staleness { check_field: "updated_at".into(), max_age_days: 90 };
        assert!(qualifies(&old, &config, &exec));
    }

    #[test]
    fn composite_or_qualifies_if_any_branch_matches() {
        let exec = execution("exec-2");
        let e = entity("exec-1");
        let config = StrategyConfig::Composite {
            operator: CompositeOperator::Or,
            strategies: vec![
                StrategyConfig::Retention { check_field: "created_at".into(), retention_days: 99_999 },
                StrategyConfig::ExecutionBased { grace_period: None, grace_period_seconds: 0 },
            ],
        };
        assert!(qualifies(&e, &config, &exec));
    }
}
