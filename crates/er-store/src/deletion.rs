use async_trait::async_trait;
use er_types::deletion::{DeletionStrategy, ExecutionTracking, PendingDeletion};
use er_types::error::{InsertionError, QueryError, UpdateError};
use er_types::ids::{PendingDeletionId, StagedEntityId, TenantId};
use error_stack::Result;
use time::OffsetDateTime;

/// Tenant-configured deletion policies (spec §3, §4.6, §9 hierarchical
/// selection).
#[async_trait]
pub trait DeletionStrategyStore: Send + Sync {
    /// Every enabled strategy for `entity_type`, regardless of specificity —
    /// the deletion controller performs the `(specificity DESC, priority
    /// DESC, created_at ASC)` ranking itself (spec §9) so the selection logic
    /// is testable independent of any particular storage backend's query
    /// planner.
    async fn strategies_for_entity_type(
        &self,
        tenant_id: TenantId,
        entity_type: &str,
    ) -> Result<Vec<DeletionStrategy>, QueryError>;
}

/// Scheduled soft-deletes (spec §3, §4.6, §9 "at-most-one pending deletion").
#[async_trait]
pub trait PendingDeletionStore: Send + Sync {
    /// `ON CONFLICT (tenant_id, staged_entity_id) DO UPDATE`: updates
    /// `scheduled_for` and clears any prior cancellation if a pending
    /// deletion already exists for this entity (spec §9).
    async fn upsert_scheduled(
        &self,
        tenant_id: TenantId,
        staged_entity_id: StagedEntityId,
        scheduled_for: OffsetDateTime,
    ) -> Result<PendingDeletion, InsertionError>;

    /// Pending deletions due by `now`, not executed, not cancelled, ordered
    /// by `scheduled_for ASC` (spec §4.6 execution loop step 1).
    async fn get_due(
        &self,
        tenant_id: TenantId,
        now: OffsetDateTime,
        limit: usize,
    ) -> Result<Vec<PendingDeletion>, QueryError>;

    async fn mark_executed(
        &self,
        tenant_id: TenantId,
        id: PendingDeletionId,
    ) -> Result<(), UpdateError>;

    /// Cancels any non-executed pending deletion for `staged_entity_id` with
    /// `cancelled_reason = "entity reappeared in execution"` (spec §4.6
    /// cancellation).
    async fn cancel_by_entity_id(
        &self,
        tenant_id: TenantId,
        staged_entity_id: StagedEntityId,
    ) -> Result<u64, UpdateError>;
}

/// Execution watermarks (spec §3, §4.6).
#[async_trait]
pub trait ExecutionTrackingStore: Send + Sync {
    /// Upsert on conflict: updates counts and `completed_at` (spec §4.6).
    async fn upsert(&self, tracking: ExecutionTracking) -> Result<ExecutionTracking, InsertionError>;

    /// Unprocessed executions (`completed_at IS NOT NULL AND processed_at IS
    /// NULL`), ordered by `completed_at ASC` (spec §4.6 step 1).
    async fn list_unprocessed(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<ExecutionTracking>, QueryError>;

    async fn mark_processed(
        &self,
        tenant_id: TenantId,
        plan_id: &str,
        entity_type: &str,
        execution_id: &str,
        processed_at: OffsetDateTime,
    ) -> Result<(), UpdateError>;
}
