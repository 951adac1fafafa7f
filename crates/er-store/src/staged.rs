use async_trait::async_trait;
use er_types::error::{InsertionError, QueryError};
use er_types::ids::{StagedEntityId, StagedRelationshipCriteriaId, StagedRelationshipId, TenantId};
use er_types::staged::{
    EntityTypeSchema, StagedEntity, StagedRelationship, StagedRelationshipCriteria,
    UpsertOutcome, UpsertStagedEntityRequest,
};
use error_stack::Result;

/// Describes the API of a store implementation for [`StagedEntity`] records
/// (spec §4.1). Mirrors the teacher's `EntityStore` trait shape: one method
/// per operation, `error_stack::Result` return types, tenant-scoped calls.
#[async_trait]
pub trait StagedEntityStore: Send + Sync {
    /// Upserts a staged entity. If the `(entity_type, source_id, integration)`
    /// identity already exists, `req.data` is deep-merged into the stored
    /// `data` and re-fingerprinted; otherwise a new row is created.
    ///
    /// # Errors
    ///
    /// - if the underlying storage operation fails transiently
    async fn upsert(
        &self,
        req: UpsertStagedEntityRequest,
    ) -> Result<UpsertOutcome, InsertionError>;

    /// Soft-deletes every staged entity in scope whose `last_seen_execution`
    /// is not `execution_id`. Returns the number of rows affected (spec
    /// §4.1).
    async fn mark_deleted_except_execution(
        &self,
        tenant_id: TenantId,
        config_id: &str,
        execution_id: &str,
        entity_type: Option<&str>,
    ) -> Result<u64, QueryError>;

    async fn get_by_source_and_type(
        &self,
        tenant_id: TenantId,
        entity_type: &str,
        source_id: &str,
        integration: &str,
    ) -> Result<Option<StagedEntity>, QueryError>;

    async fn get_by_id(
        &self,
        tenant_id: TenantId,
        id: StagedEntityId,
    ) -> Result<Option<StagedEntity>, QueryError>;

    /// All staged entities in `(tenant, plan, entity_type)` scope, used by the
    /// deletion controller's execution-based strategy (spec §4.6).
    async fn list_in_scope(
        &self,
        tenant_id: TenantId,
        entity_type: &str,
    ) -> Result<Vec<StagedEntity>, QueryError>;

    async fn soft_delete(&self, tenant_id: TenantId, id: StagedEntityId) -> Result<(), QueryError>;
}

/// Tenant schema metadata (fingerprint exclusions), spec §4.1/§9.
#[async_trait]
pub trait EntityTypeSchemaStore: Send + Sync {
    async fn get(
        &self,
        tenant_id: TenantId,
        entity_type: &str,
    ) -> Result<EntityTypeSchema, QueryError>;
}

/// Describes the API of a store implementation for [`StagedRelationship`]
/// records (spec §4.5).
#[async_trait]
pub trait StagedRelationshipStore: Send + Sync {
    async fn upsert(
        &self,
        relationship: StagedRelationship,
    ) -> Result<StagedRelationship, InsertionError>;

    async fn get_by_id(
        &self,
        tenant_id: TenantId,
        id: StagedRelationshipId,
    ) -> Result<Option<StagedRelationship>, QueryError>;

    async fn get_by_identity(
        &self,
        tenant_id: TenantId,
        relationship_type: &str,
        from_source_id: &str,
        from_integration: &str,
        to_source_id: &str,
        to_integration: &str,
    ) -> Result<Option<StagedRelationship>, QueryError>;

    /// Relationships with at least one unresolved end, used to retry
    /// resolution as new staged entities arrive (spec §4.5 step 2).
    async fn list_unresolved(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<StagedRelationship>, QueryError>;

    /// Relationships materialized from `criteria_id` whose `last_verified_at`
    /// predates the latest criteria execution (spec §4.5 step 4).
    async fn list_stale_criteria_matches(
        &self,
        tenant_id: TenantId,
        criteria_id: StagedRelationshipCriteriaId,
        current_execution_id: &str,
    ) -> Result<Vec<StagedRelationship>, QueryError>;
}

/// Describes the API of a store implementation for
/// [`StagedRelationshipCriteria`] subscriptions (spec §4.5 criteria path).
#[async_trait]
pub trait RelationshipCriteriaStore: Send + Sync {
    async fn upsert(
        &self,
        criteria: StagedRelationshipCriteria,
    ) -> Result<StagedRelationshipCriteria, InsertionError>;

    async fn list_by_target(
        &self,
        tenant_id: TenantId,
        to_entity_type: &str,
        to_integration: &str,
    ) -> Result<Vec<StagedRelationshipCriteria>, QueryError>;
}
