use async_trait::async_trait;
use er_store::relationship::{ClusterLookup, MergedRelationshipStore, RelationshipClusterStore};
use er_types::error::{InsertionError, QueryError};
use er_types::ids::{MergedEntityId, MergedRelationshipId, StagedEntityId, StagedRelationshipId, TenantId};
use er_types::merged::{MergedRelationship, RelationshipCluster};
use error_stack::Result;
use time::OffsetDateTime;

use crate::InMemoryStore;

#[async_trait]
impl MergedRelationshipStore for InMemoryStore {
    async fn get(
        &self,
        tenant_id: TenantId,
        id: MergedRelationshipId,
    ) -> Result<Option<MergedRelationship>, QueryError> {
        Ok(self
            .merged_relationships
            .get(&id)
            .map(|e| e.clone())
            .filter(|r| r.tenant_id == tenant_id))
    }

    async fn upsert(
        &self,
        relationship: MergedRelationship,
    ) -> Result<MergedRelationship, InsertionError> {
        let mut stored = relationship.clone();
        self.merged_relationships
            .entry(relationship.id)
            .and_modify(|existing| {
                existing.data = existing.data.deep_merge(&relationship.data);
                strip_nulls_in_place(&mut existing.data);
                existing.updated_at = OffsetDateTime::now_utc();
                existing.deleted_at = None;
                stored = existing.clone();
            })
            .or_insert(relationship);
        Ok(stored)
    }

    async fn soft_delete(
        &self,
        tenant_id: TenantId,
        id: MergedRelationshipId,
    ) -> Result<(), QueryError> {
        if let Some(mut entry) = self.merged_relationships.get_mut(&id) {
            if entry.tenant_id == tenant_id {
                entry.deleted_at = Some(OffsetDateTime::now_utc());
            }
        }
        Ok(())
    }
}

/// Golden-edge merges are null-stripping: an incoming `null` clears a field
/// rather than it surviving as an explicit null (spec §4.5 step 3), unlike the
/// staged-entity deep merge which lets an explicit `null` replace wholesale.
fn strip_nulls_in_place(value: &mut er_types::value::Value) {
    if let er_types::value::Value::Object(map) = value {
        map.retain(|_, v| !matches!(v, er_types::value::Value::Null));
        for v in map.values_mut() {
            strip_nulls_in_place(v);
        }
    }
}

#[async_trait]
impl RelationshipClusterStore for InMemoryStore {
    async fn link(
        &self,
        tenant_id: TenantId,
        staged_relationship_id: StagedRelationshipId,
        merged_relationship_id: MergedRelationshipId,
    ) -> Result<RelationshipCluster, InsertionError> {
        let cluster = RelationshipCluster {
            tenant_id,
            staged_relationship_id,
            merged_relationship_id,
            is_primary: true,
            created_at: OffsetDateTime::now_utc(),
        };
        self.relationship_clusters
            .insert(staged_relationship_id, cluster.clone());
        Ok(cluster)
    }

    async fn get_for_staged(
        &self,
        tenant_id: TenantId,
        staged_relationship_id: StagedRelationshipId,
    ) -> Result<Option<RelationshipCluster>, QueryError> {
        Ok(self
            .relationship_clusters
            .get(&staged_relationship_id)
            .map(|e| e.clone())
            .filter(|c| c.tenant_id == tenant_id))
    }
}

#[async_trait]
impl ClusterLookup for InMemoryStore {
    async fn merged_entity_for_staged(
        &self,
        tenant_id: TenantId,
        staged_entity_id: StagedEntityId,
    ) -> Result<Option<MergedEntityId>, QueryError> {
        Ok(self.entity_clusters.get(&staged_entity_id).and_then(|clusters| {
            clusters
                .iter()
                .find(|c| c.tenant_id == tenant_id && c.is_active())
                .map(|c| c.merged_entity_id)
        }))
    }
}
