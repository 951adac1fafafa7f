use async_trait::async_trait;
use er_store::deletion::{DeletionStrategyStore, ExecutionTrackingStore, PendingDeletionStore};
use er_types::deletion::{DeletionStrategy, ExecutionTracking, PendingDeletion};
use er_types::error::{InsertionError, QueryError, UpdateError};
use er_types::ids::{PendingDeletionId, StagedEntityId, TenantId};
use error_stack::Result;
use time::OffsetDateTime;

use crate::InMemoryStore;

#[async_trait]
impl DeletionStrategyStore for InMemoryStore {
    async fn strategies_for_entity_type(
        &self,
        tenant_id: TenantId,
        entity_type: &str,
    ) -> Result<Vec<DeletionStrategy>, QueryError> {
        Ok(self
            .deletion_strategies
            .get(&(tenant_id, entity_type.to_owned()))
            .map(|e| e.clone())
            .unwrap_or_default()
            .into_iter()
            .filter(|s| s.enabled)
            .collect())
    }
}

#[async_trait]
impl PendingDeletionStore for InMemoryStore {
    async fn upsert_scheduled(
        &self,
        tenant_id: TenantId,
        staged_entity_id: StagedEntityId,
        scheduled_for: OffsetDateTime,
    ) -> Result<PendingDeletion, InsertionError> {
        let key = (tenant_id, staged_entity_id);
        let now = OffsetDateTime::now_utc();
        let mut stored = PendingDeletion {
            id: PendingDeletionId::new(),
            tenant_id,
            staged_entity_id,
            scheduled_for,
            executed_at: None,
            cancelled: false,
            cancelled_reason: None,
            created_at: now,
            updated_at: now,
        };
        self.pending_deletions
            .entry(key)
            .and_modify(|existing| {
                existing.scheduled_for = scheduled_for;
                existing.cancelled = false;
                existing.cancelled_reason = None;
                existing.updated_at = now;
                stored = existing.clone();
            })
            .or_insert_with(|| stored.clone());
        Ok(stored)
    }

    async fn get_due(
        &self,
        tenant_id: TenantId,
        now: OffsetDateTime,
        limit: usize,
    ) -> Result<Vec<PendingDeletion>, QueryError> {
        let mut due = self
            .pending_deletions
            .iter()
            .filter(|entry| {
                let p = entry.value();
                p.tenant_id == tenant_id && p.is_due(now)
            })
            .map(|entry| entry.value().clone())
            .collect::<Vec<_>>();
        due.sort_by_key(|p| p.scheduled_for);
        due.truncate(limit);
        Ok(due)
    }

    async fn mark_executed(
        &self,
        tenant_id: TenantId,
        id: PendingDeletionId,
    ) -> Result<(), UpdateError> {
        for mut entry in self.pending_deletions.iter_mut() {
            if entry.value().tenant_id == tenant_id && entry.value().id == id {
                entry.value_mut().executed_at = Some(OffsetDateTime::now_utc());
                break;
            }
        }
        Ok(())
    }

    async fn cancel_by_entity_id(
        &self,
        tenant_id: TenantId,
        staged_entity_id: StagedEntityId,
    ) -> Result<u64, UpdateError> {
        let mut count = 0u64;
        if let Some(mut entry) = self.pending_deletions.get_mut(&(tenant_id, staged_entity_id)) {
            if entry.executed_at.is_none() && !entry.cancelled {
                entry.cancelled = true;
                entry.cancelled_reason = Some("entity reappeared in execution".to_owned());
                count += 1;
            }
        }
        Ok(count)
    }
}

#[async_trait]
impl ExecutionTrackingStore for InMemoryStore {
    async fn upsert(&self, tracking: ExecutionTracking) -> Result<ExecutionTracking, InsertionError> {
        let key = (
            tracking.tenant_id,
            tracking.plan_id.clone(),
            tracking.entity_type.clone(),
            tracking.execution_id.clone(),
        );
        let mut stored = tracking.clone();
        self.execution_tracking
            .entry(key)
            .and_modify(|existing| {
                existing.entity_count = tracking.entity_count;
                existing.completed_at = tracking.completed_at;
                stored = existing.clone();
            })
            .or_insert(tracking);
        Ok(stored)
    }

    async fn list_unprocessed(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<ExecutionTracking>, QueryError> {
        let mut unprocessed = self
            .execution_tracking
            .iter()
            .filter(|entry| {
                let t = entry.value();
                t.tenant_id == tenant_id && t.completed_at.is_some() && t.processed_at.is_none()
            })
            .map(|entry| entry.value().clone())
            .collect::<Vec<_>>();
        unprocessed.sort_by_key(|t| t.completed_at);
        Ok(unprocessed)
    }

    async fn mark_processed(
        &self,
        tenant_id: TenantId,
        plan_id: &str,
        entity_type: &str,
        execution_id: &str,
        processed_at: OffsetDateTime,
    ) -> Result<(), UpdateError> {
        let key = (
            tenant_id,
            plan_id.to_owned(),
            entity_type.to_owned(),
            execution_id.to_owned(),
        );
        if let Some(mut entry) = self.execution_tracking.get_mut(&key) {
            entry.processed_at = Some(processed_at);
        }
        Ok(())
    }
}
