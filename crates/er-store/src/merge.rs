use async_trait::async_trait;
use er_types::error::{InsertionError, QueryError, UpdateError};
use er_types::ids::{MergedEntityId, StagedEntityId, TenantId};
use er_types::merged::{EntityCluster, MergeAuditEntry, MergeStrategyConfig, MergedEntity};
use error_stack::Result;

/// Describes the API of a store implementation for [`MergedEntity`] golden
/// records (spec §4.4).
#[async_trait]
pub trait MergedEntityStore: Send + Sync {
    async fn get(
        &self,
        tenant_id: TenantId,
        id: MergedEntityId,
    ) -> Result<Option<MergedEntity>, QueryError>;

    /// Inserts a new golden record.
    async fn insert(&self, entity: MergedEntity) -> Result<MergedEntity, InsertionError>;

    /// Replaces `data`/`source_count`/`primary_source_id` and bumps `version`
    /// by exactly 1 (spec §4.4 invariant: version increases on every
    /// mutation).
    async fn update(&self, entity: MergedEntity) -> Result<MergedEntity, UpdateError>;

    async fn soft_delete(&self, tenant_id: TenantId, id: MergedEntityId) -> Result<(), UpdateError>;
}

/// Describes the API of a store implementation for [`EntityCluster`] links
/// (spec §4.4).
#[async_trait]
pub trait EntityClusterStore: Send + Sync {
    /// The active (`removed_at IS NULL`) cluster membership for a staged
    /// entity, if any (spec §3 invariant: at most one).
    async fn active_cluster_for(
        &self,
        tenant_id: TenantId,
        staged_entity_id: StagedEntityId,
    ) -> Result<Option<EntityCluster>, QueryError>;

    /// All active members of a merged entity's cluster.
    async fn active_members(
        &self,
        tenant_id: TenantId,
        merged_entity_id: MergedEntityId,
    ) -> Result<Vec<EntityCluster>, QueryError>;

    async fn add_member(
        &self,
        tenant_id: TenantId,
        merged_entity_id: MergedEntityId,
        staged_entity_id: StagedEntityId,
        is_primary: bool,
    ) -> Result<EntityCluster, InsertionError>;

    /// Re-parents every active member of `from` onto `to` (spec §4.4
    /// `Merge`).
    async fn reparent(
        &self,
        tenant_id: TenantId,
        from: MergedEntityId,
        to: MergedEntityId,
    ) -> Result<u64, UpdateError>;

    async fn remove_member(
        &self,
        tenant_id: TenantId,
        staged_entity_id: StagedEntityId,
    ) -> Result<(), UpdateError>;
}

/// Tenant merge-strategy configuration (spec §4.4.1).
#[async_trait]
pub trait MergeStrategyStore: Send + Sync {
    async fn get(
        &self,
        tenant_id: TenantId,
        entity_type: &str,
    ) -> Result<MergeStrategyConfig, QueryError>;
}

/// `merge_audit_log` (spec §6 persisted tables).
#[async_trait]
pub trait MergeAuditStore: Send + Sync {
    async fn append(&self, entry: MergeAuditEntry) -> Result<(), InsertionError>;
}
