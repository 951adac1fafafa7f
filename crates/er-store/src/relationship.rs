use async_trait::async_trait;
use er_types::error::{InsertionError, QueryError};
use er_types::ids::{MergedEntityId, MergedRelationshipId, StagedRelationshipId, TenantId};
use er_types::merged::{MergedRelationship, RelationshipCluster};
use error_stack::Result;

/// Describes the API of a store implementation for [`MergedRelationship`]
/// golden edges (spec §4.5 step 3).
#[async_trait]
pub trait MergedRelationshipStore: Send + Sync {
    async fn get(
        &self,
        tenant_id: TenantId,
        id: MergedRelationshipId,
    ) -> Result<Option<MergedRelationship>, QueryError>;

    /// Inserts the edge if absent, or merges `data` (object-level,
    /// null-stripping) and clears `deleted_at` if present. The ID is always
    /// `id` (the caller computes the deterministic UUIDv5 before calling).
    async fn upsert(
        &self,
        relationship: MergedRelationship,
    ) -> Result<MergedRelationship, InsertionError>;

    async fn soft_delete(
        &self,
        tenant_id: TenantId,
        id: MergedRelationshipId,
    ) -> Result<(), QueryError>;
}

/// Describes the API of a store implementation for [`RelationshipCluster`]
/// links (spec §4.5 step 4).
#[async_trait]
pub trait RelationshipClusterStore: Send + Sync {
    async fn link(
        &self,
        tenant_id: TenantId,
        staged_relationship_id: StagedRelationshipId,
        merged_relationship_id: MergedRelationshipId,
    ) -> Result<RelationshipCluster, InsertionError>;

    async fn get_for_staged(
        &self,
        tenant_id: TenantId,
        staged_relationship_id: StagedRelationshipId,
    ) -> Result<Option<RelationshipCluster>, QueryError>;
}

/// Identifies which merged entity a staged entity currently belongs to, the
/// seam the relationship resolver uses to find out whether both ends of a
/// staged relationship are clustered yet (spec §4.5 step 2).
#[async_trait]
pub trait ClusterLookup: Send + Sync {
    async fn merged_entity_for_staged(
        &self,
        tenant_id: TenantId,
        staged_entity_id: er_types::ids::StagedEntityId,
    ) -> Result<Option<MergedEntityId>, QueryError>;
}
