use async_trait::async_trait;
use er_store::merge::{EntityClusterStore, MergeAuditStore, MergeStrategyStore, MergedEntityStore};
use er_types::error::{InsertionError, QueryError, UpdateError};
use er_types::ids::{MergedEntityId, StagedEntityId, TenantId};
use er_types::merged::{EntityCluster, MergeAuditEntry, MergeStrategyConfig, MergedEntity};
use error_stack::{Report, Result};
use time::OffsetDateTime;

use crate::InMemoryStore;

#[async_trait]
impl MergedEntityStore for InMemoryStore {
    async fn get(
        &self,
        tenant_id: TenantId,
        id: MergedEntityId,
    ) -> Result<Option<MergedEntity>, QueryError> {
        Ok(self
            .merged_entities
            .get(&id)
            .map(|e| e.clone())
            .filter(|e| e.tenant_id == tenant_id))
    }

    async fn insert(&self, entity: MergedEntity) -> Result<MergedEntity, InsertionError> {
        if self.merged_entities.contains_key(&entity.id) {
            return Err(Report::new(InsertionError)
                .attach_printable("merged entity id already exists"));
        }
        self.merged_entities.insert(entity.id, entity.clone());
        Ok(entity)
    }

    async fn update(&self, mut entity: MergedEntity) -> Result<MergedEntity, UpdateError> {
        let mut slot = self
            .merged_entities
            .get_mut(&entity.id)
            .ok_or_else(|| Report::new(UpdateError).attach_printable("merged entity not found"))?;
        if slot.tenant_id != entity.tenant_id {
            return Err(Report::new(UpdateError).attach_printable("tenant mismatch on update"));
        }
        entity.version = slot.version + 1;
        entity.updated_at = OffsetDateTime::now_utc();
        *slot = entity.clone();
        Ok(entity)
    }

    async fn soft_delete(&self, tenant_id: TenantId, id: MergedEntityId) -> Result<(), UpdateError> {
        if let Some(mut entry) = self.merged_entities.get_mut(&id) {
            if entry.tenant_id == tenant_id {
                entry.deleted_at = Some(OffsetDateTime::now_utc());
                entry.version += 1;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl EntityClusterStore for InMemoryStore {
    async fn active_cluster_for(
        &self,
        tenant_id: TenantId,
        staged_entity_id: StagedEntityId,
    ) -> Result<Option<EntityCluster>, QueryError> {
        Ok(self
            .entity_clusters
            .get(&staged_entity_id)
            .and_then(|clusters| {
                clusters
                    .iter()
                    .find(|c| c.tenant_id == tenant_id && c.is_active())
                    .cloned()
            }))
    }

    async fn active_members(
        &self,
        tenant_id: TenantId,
        merged_entity_id: MergedEntityId,
    ) -> Result<Vec<EntityCluster>, QueryError> {
        Ok(self
            .entity_clusters
            .iter()
            .flat_map(|entry| entry.value().clone())
            .filter(|c| c.tenant_id == tenant_id && c.merged_entity_id == merged_entity_id && c.is_active())
            .collect())
    }

    async fn add_member(
        &self,
        tenant_id: TenantId,
        merged_entity_id: MergedEntityId,
        staged_entity_id: StagedEntityId,
        is_primary: bool,
    ) -> Result<EntityCluster, InsertionError> {
        let cluster = EntityCluster {
            tenant_id,
            staged_entity_id,
            merged_entity_id,
            is_primary,
            created_at: OffsetDateTime::now_utc(),
            removed_at: None,
        };
        let mut entries = self.entity_clusters.entry(staged_entity_id).or_default();
        for existing in entries.iter_mut() {
            if existing.tenant_id == tenant_id && existing.is_active() {
                existing.removed_at = Some(OffsetDateTime::now_utc());
            }
        }
        entries.push(cluster.clone());
        Ok(cluster)
    }

    async fn reparent(
        &self,
        tenant_id: TenantId,
        from: MergedEntityId,
        to: MergedEntityId,
    ) -> Result<u64, UpdateError> {
        let mut count = 0u64;
        for mut entries in self.entity_clusters.iter_mut() {
            for cluster in entries.value_mut().iter_mut() {
                if cluster.tenant_id == tenant_id && cluster.merged_entity_id == from && cluster.is_active() {
                    cluster.merged_entity_id = to;
                    count += 1;
                }
            }
        }
        Ok(count)
    }

    async fn remove_member(
        &self,
        tenant_id: TenantId,
        staged_entity_id: StagedEntityId,
    ) -> Result<(), UpdateError> {
        if let Some(mut entries) = self.entity_clusters.get_mut(&staged_entity_id) {
            for cluster in entries.iter_mut() {
                if cluster.tenant_id == tenant_id && cluster.is_active() {
                    cluster.removed_at = Some(OffsetDateTime::now_utc());
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl MergeStrategyStore for InMemoryStore {
    async fn get(
        &self,
        tenant_id: TenantId,
        entity_type: &str,
    ) -> Result<MergeStrategyConfig, QueryError> {
        Ok(self
            .merge_strategies
            .get(&(tenant_id, entity_type.to_owned()))
            .map(|e| e.clone())
            .unwrap_or_else(|| MergeStrategyConfig {
                tenant_id,
                entity_type: entity_type.to_owned(),
                ..Default::default()
            }))
    }
}

#[async_trait]
impl MergeAuditStore for InMemoryStore {
    async fn append(&self, entry: MergeAuditEntry) -> Result<(), InsertionError> {
        self.merge_audit_log
            .entry(entry.merged_entity_id)
            .or_default()
            .push(entry);
        Ok(())
    }
}
