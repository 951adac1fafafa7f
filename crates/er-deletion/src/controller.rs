//! Scheduling and execution loops wired against the store and event bus
//! contracts (spec §4.6).

use er_events::EventPublisher;
use er_store::{
    DeletionStrategyStore, EntityClusterStore, ExecutionTrackingStore, MergedEntityStore,
    PendingDeletionStore, StagedEntityStore,
};
use er_types::error::DeletionError;
use er_types::events::{EntityEvent, EntityEventType, PipelineEvent, SCHEMA_VERSION};
use er_types::ids::TenantId;
use error_stack::{Result, ResultExt};
use time::OffsetDateTime;

use crate::scheduling::evaluate_scope;

pub struct DeletionController<'s, S, P> {
    store: &'s S,
    publisher: &'s P,
}

impl<'s, S, P> DeletionController<'s, S, P>
where
    S: DeletionStrategyStore
        + PendingDeletionStore
        + ExecutionTrackingStore
        + StagedEntityStore
        + MergedEntityStore
        + EntityClusterStore,
    P: EventPublisher,
{
    #[must_use]
    pub fn new(store: &'s S, publisher: &'s P) -> Self {
        Self { store, publisher }
    }

    /// Scheduling loop (spec §4.6 steps 1-3): processes every unprocessed
    /// execution for `tenant_id`, scheduling pending deletions and marking
    /// each execution processed. Returns the number of deletions scheduled.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn run_scheduling(&self, tenant_id: TenantId) -> Result<u64, DeletionError> {
        let executions = self
            .store
            .list_unprocessed(tenant_id)
            .await
            .change_context(DeletionError)?;

        let mut scheduled_count = 0;
        for execution in executions {
            let strategies = self
                .store
                .strategies_for_entity_type(tenant_id, &execution.entity_type)
                .await
                .change_context(DeletionError)?;

            let entities = self
                .store
                .list_in_scope(tenant_id, &execution.entity_type)
                .await
                .change_context(DeletionError)?;

            for candidate in evaluate_scope(&entities, &strategies, &execution) {
                self.store
                    .upsert_scheduled(tenant_id, candidate.staged_entity_id, candidate.scheduled_for)
                    .await
                    .change_context(DeletionError)?;
                scheduled_count += 1;
            }

            self.store
                .mark_processed(
                    tenant_id,
                    &execution.plan_id,
                    &execution.entity_type,
                    &execution.execution_id,
                    OffsetDateTime::now_utc(),
                )
                .await
                .change_context(DeletionError)?;
        }
        Ok(scheduled_count)
    }

    /// Execution loop (spec §4.6): processes up to `limit` due pending
    /// deletions for `tenant_id`. Returns the number executed.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn run_execution(&self, tenant_id: TenantId, limit: usize) -> Result<u64, DeletionError> {
        let due = self
            .store
            .get_due(tenant_id, OffsetDateTime::now_utc(), limit)
            .await
            .change_context(DeletionError)?;

        let mut executed_count = 0;
        for pending in due {
            let Some(staged) = self
                .store
                .get_by_id(tenant_id, pending.staged_entity_id)
                .await
                .change_context(DeletionError)?
            else {
                self.store.mark_executed(tenant_id, pending.id).await.change_context(DeletionError)?;
                continue;
            };

            StagedEntityStore::soft_delete(self.store, tenant_id, staged.id)
                .await
                .change_context(DeletionError)?;

            let cluster = self
                .store
                .active_cluster_for(tenant_id, staged.id)
                .await
                .change_context(DeletionError)?;
            if let Some(cluster) = cluster {
                self.store
                    .remove_member(tenant_id, staged.id)
                    .await
                    .change_context(DeletionError)?;
                let remaining = self
                    .store
                    .active_members(tenant_id, cluster.merged_entity_id)
                    .await
                    .change_context(DeletionError)?;
                if remaining.is_empty() {
                    MergedEntityStore::soft_delete(self.store, tenant_id, cluster.merged_entity_id)
                        .await
                        .change_context(DeletionError)?;
                    self.emit_deleted(tenant_id, cluster.merged_entity_id, &staged.entity_type)
                        .await?;
                }
            }

            self.store.mark_executed(tenant_id, pending.id).await.change_context(DeletionError)?;
            executed_count += 1;
        }
        Ok(executed_count)
    }

    async fn emit_deleted(
        &self,
        tenant_id: TenantId,
        entity_id: er_types::ids::MergedEntityId,
        entity_type: &str,
    ) -> Result<(), DeletionError> {
        self.publisher
            .publish(PipelineEvent::Entity(EntityEvent {
                event_type: EntityEventType::Deleted,
                schema_version: SCHEMA_VERSION.to_owned(),
                tenant_id,
                entity_id,
                entity_type: entity_type.to_owned(),
                data: None,
                source_entities: None,
                version: 0,
                timestamp: OffsetDateTime::now_utc(),
                correlation_id: None,
            }))
            .await
            .change_context(DeletionError)
    }
}

#[cfg(test)]
mod tests {
    use er_events::RecordingEventPublisher;
    use er_memory_store::InMemoryStore;
    use er_types::deletion::{DeletionScopeType, DeletionStrategy, ExecutionTracking, StrategyConfig};
    use er_types::ids::{DeletionStrategyId, MergedEntityId};
    use er_types::merged::MergedEntity;
    use er_types::staged::UpsertStagedEntityRequest;
    use er_types::value::Value;

    use super::*;

    #[tokio::test]
    async fn execution_based_strategy_schedules_and_executes_stale_entities() {
        let store = InMemoryStore::default();
        let publisher = RecordingEventPublisher::new();
        let tenant_id = TenantId::new();

        let stale = StagedEntityStore::upsert(
            &store,
            UpsertStagedEntityRequest {
                tenant_id,
                config_id: "cfg".into(),
                entity_type: "person".into(),
                source_id: "stale".into(),
                integration: "crm".into(),
                source_key: "contacts".into(),
                execution_id: "exec-1".into(),
                data: Value::Null,
            },
        )
        .await
        .expect("stage stale")
        .entity;

        let now = OffsetDateTime::now_utc();
        let merged = MergedEntityStore::insert(
            &store,
            MergedEntity {
                id: MergedEntityId::new(),
                tenant_id,
                entity_type: "person".into(),
                data: Value::Null,
                source_count: 1,
                primary_source_id: Some(stale.id),
                version: 1,
                created_at: now,
                updated_at: now,
                deleted_at: None,
            },
        )
        .await
        .expect("insert merged");
        EntityClusterStore::add_member(&store, tenant_id, merged.id, stale.id, true)
            .await
            .expect("add member");

        StagedEntityStore::upsert(
            &store,
            UpsertStagedEntityRequest {
                tenant_id,
                config_id: "cfg".into(),
                entity_type: "person".into(),
                source_id: "fresh".into(),
                integration: "crm".into(),
                source_key: "contacts".into(),
                execution_id: "exec-2".into(),
                data: Value::Null,
            },
        )
        .await
        .expect("stage fresh");

        store.add_deletion_strategy(DeletionStrategy {
            id: DeletionStrategyId::new(),
            tenant_id,
            scope: DeletionScopeType::EntityType("person".into()),
            integration: None,
            source_key: None,
            config: StrategyConfig::ExecutionBased { grace_period: None, grace_period_seconds: 0 },
            priority: 0,
            enabled: true,
            created_at: OffsetDateTime::now_utc(),
        });

        ExecutionTrackingStore::upsert(
            &store,
            ExecutionTracking {
                tenant_id,
                plan_id: "plan-1".into(),
                entity_type: "person".into(),
                execution_id: "exec-2".into(),
                started_at: OffsetDateTime::now_utc(),
                completed_at: Some(OffsetDateTime::now_utc()),
                entity_count: 2,
                processed_at: None,
            },
        )
        .await
        .expect("track execution");

        let controller = DeletionController::new(&store, &publisher);
        let scheduled = controller.run_scheduling(tenant_id).await.expect("scheduling");
        assert_eq!(scheduled, 1);
        assert_eq!(store.pending_deletion_count(tenant_id), 1);

        let executed = controller.run_execution(tenant_id, 10).await.expect("execution");
        assert_eq!(executed, 1);

        let reloaded = StagedEntityStore::get_by_id(&store, tenant_id, stale.id)
            .await
            .expect("query")
            .expect("still present, soft-deleted");
        assert!(reloaded.is_deleted());

        let events = publisher.events();
        assert_eq!(events.len(), 1);
    }
}
