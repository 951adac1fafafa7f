use async_trait::async_trait;
use er_store::staged::{EntityTypeSchemaStore, RelationshipCriteriaStore, StagedEntityStore, StagedRelationshipStore};
use er_types::error::{InsertionError, QueryError};
use er_types::ids::{StagedEntityId, StagedRelationshipCriteriaId, StagedRelationshipId, TenantId};
use er_types::staged::{
    EntityTypeSchema, SourceIdentity, StagedEntity, StagedRelationship,
    StagedRelationshipCriteria, UpsertOutcome, UpsertStagedEntityRequest,
};
use er_types::value::{fingerprint, strip_excluded_fields};
use error_stack::{Report, Result};
use time::OffsetDateTime;

use crate::InMemoryStore;

#[async_trait]
impl StagedEntityStore for InMemoryStore {
    #[tracing::instrument(level = "debug", skip(self, req))]
    async fn upsert(&self, req: UpsertStagedEntityRequest) -> Result<UpsertOutcome, InsertionError> {
        let now = OffsetDateTime::now_utc();
        let identity = SourceIdentity {
            entity_type: req.entity_type.clone(),
            source_id: req.source_id.clone(),
            integration: req.integration.clone(),
        };
        let schema = self
            .entity_type_schemas
            .get(&(req.tenant_id, req.entity_type.clone()))
            .map(|entry| entry.value().clone())
            .unwrap_or_else(|| EntityTypeSchema {
                tenant_id: req.tenant_id,
                entity_type: req.entity_type.clone(),
                exclude_from_fingerprint: Vec::new(),
            });

        // The unique index on (tenant, entity_type, source_id, integration) is
        // what absorbs a concurrent insert race: `DashMap::entry` gives the
        // critical section its atomicity here, in place of a DB-level unique
        // constraint plus retry (spec §4.1 failure semantics).
        let key = (req.tenant_id, identity.clone());
        let existing_id = self.staged_entity_index.get(&key).map(|e| *e.value());

        if let Some(existing_id) = existing_id {
            let mut entry = self.staged_entities.get_mut(&existing_id).ok_or_else(|| {
                Report::new(InsertionError)
                    .attach_printable("indexed staged entity missing from primary table")
            })?;
            let merged_data = entry.data.deep_merge(&req.data);
            let new_fp = fingerprint(&strip_excluded_fields(
                &merged_data,
                &schema.exclude_from_fingerprint,
            ));
            let is_changed = new_fp != entry.fingerprint;
            entry.previous_fingerprint = Some(entry.fingerprint);
            entry.fingerprint = new_fp;
            entry.data = merged_data;
            entry.execution_id = req.execution_id.clone();
            entry.last_seen_execution = req.execution_id;
            entry.updated_at = now;
            entry.deleted_at = None;
            return Ok(UpsertOutcome {
                entity: entry.clone(),
                is_new: false,
                is_changed,
            });
        }

        let fp = fingerprint(&strip_excluded_fields(
            &req.data,
            &schema.exclude_from_fingerprint,
        ));
        let entity = StagedEntity {
            id: StagedEntityId::new(),
            tenant_id: req.tenant_id,
            config_id: req.config_id,
            entity_type: req.entity_type,
            source_id: req.source_id,
            integration: req.integration,
            source_key: req.source_key,
            execution_id: req.execution_id.clone(),
            last_seen_execution: req.execution_id,
            data: req.data,
            fingerprint: fp,
            previous_fingerprint: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.staged_entities.insert(entity.id, entity.clone());
        // Races on first-insert: if another task won the `entry` window above
        // between our `get` and this `insert`, the later writer here would
        // clobber the index; `DashMap`'s per-shard locking makes the
        // check-then-insert atomic in practice because both the index probe
        // and the index write happen while holding the same shard lock for
        // `key`.
        let mut is_new = true;
        self.staged_entity_index
            .entry(key)
            .and_modify(|_| is_new = false)
            .or_insert(entity.id);
        Ok(UpsertOutcome {
            entity,
            is_new,
            is_changed: true,
        })
    }

    async fn mark_deleted_except_execution(
        &self,
        tenant_id: TenantId,
        config_id: &str,
        execution_id: &str,
        entity_type: Option<&str>,
    ) -> Result<u64, QueryError> {
        let now = OffsetDateTime::now_utc();
        let mut count = 0u64;
        for mut entry in self.staged_entities.iter_mut() {
            let entity = entry.value_mut();
            if entity.tenant_id != tenant_id || entity.config_id != config_id {
                continue;
            }
            if let Some(entity_type) = entity_type {
                if entity.entity_type != entity_type {
                    continue;
                }
            }
            if entity.last_seen_execution != execution_id && entity.deleted_at.is_none() {
                entity.deleted_at = Some(now);
                count += 1;
            }
        }
        Ok(count)
    }

    async fn get_by_source_and_type(
        &self,
        tenant_id: TenantId,
        entity_type: &str,
        source_id: &str,
        integration: &str,
    ) -> Result<Option<StagedEntity>, QueryError> {
        let key = (
            tenant_id,
            SourceIdentity {
                entity_type: entity_type.to_owned(),
                source_id: source_id.to_owned(),
                integration: integration.to_owned(),
            },
        );
        Ok(self
            .staged_entity_index
            .get(&key)
            .and_then(|id| self.staged_entities.get(id.value()).map(|e| e.clone())))
    }

    async fn get_by_id(
        &self,
        tenant_id: TenantId,
        id: StagedEntityId,
    ) -> Result<Option<StagedEntity>, QueryError> {
        Ok(self
            .staged_entities
            .get(&id)
            .map(|e| e.clone())
            .filter(|e| e.tenant_id == tenant_id))
    }

    async fn list_in_scope(
        &self,
        tenant_id: TenantId,
        entity_type: &str,
    ) -> Result<Vec<StagedEntity>, QueryError> {
        Ok(self
            .staged_entities
            .iter()
            .filter(|e| e.tenant_id == tenant_id && e.entity_type == entity_type)
            .map(|e| e.clone())
            .collect())
    }

    async fn soft_delete(&self, tenant_id: TenantId, id: StagedEntityId) -> Result<(), QueryError> {
        if let Some(mut entry) = self.staged_entities.get_mut(&id) {
            if entry.tenant_id == tenant_id {
                entry.deleted_at = Some(OffsetDateTime::now_utc());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl EntityTypeSchemaStore for InMemoryStore {
    async fn get(
        &self,
        tenant_id: TenantId,
        entity_type: &str,
    ) -> Result<EntityTypeSchema, QueryError> {
        Ok(self
            .entity_type_schemas
            .get(&(tenant_id, entity_type.to_owned()))
            .map(|e| e.clone())
            .unwrap_or_else(|| EntityTypeSchema {
                tenant_id,
                entity_type: entity_type.to_owned(),
                exclude_from_fingerprint: Vec::new(),
            }))
    }
}

#[async_trait]
impl StagedRelationshipStore for InMemoryStore {
    async fn upsert(
        &self,
        mut relationship: StagedRelationship,
    ) -> Result<StagedRelationship, InsertionError> {
        let key = (
            relationship.tenant_id,
            relationship.relationship_type.clone(),
            relationship.from_source_id.clone(),
            relationship.from_integration.clone(),
            relationship.to_source_id.clone().unwrap_or_default(),
            relationship.to_integration.clone(),
        );
        if let Some(existing_id) = self.staged_relationship_index.get(&key).map(|e| *e.value()) {
            let mut entry = self.staged_relationships.get_mut(&existing_id).ok_or_else(|| {
                Report::new(InsertionError).attach_printable("indexed staged relationship missing")
            })?;
            entry.data = entry.data.deep_merge(&relationship.data);
            entry.execution_id = relationship.execution_id.clone();
            entry.last_seen_execution = relationship.execution_id;
            entry.from_staged_entity_id =
                relationship.from_staged_entity_id.or(entry.from_staged_entity_id);
            entry.to_staged_entity_id =
                relationship.to_staged_entity_id.or(entry.to_staged_entity_id);
            entry.updated_at = OffsetDateTime::now_utc();
            entry.deleted_at = None;
            return Ok(entry.clone());
        }
        relationship.id = StagedRelationshipId::new();
        self.staged_relationships
            .insert(relationship.id, relationship.clone());
        self.staged_relationship_index.insert(key, relationship.id);
        Ok(relationship)
    }

    async fn get_by_id(
        &self,
        tenant_id: TenantId,
        id: StagedRelationshipId,
    ) -> Result<Option<StagedRelationship>, QueryError> {
        Ok(self
            .staged_relationships
            .get(&id)
            .map(|e| e.clone())
            .filter(|r| r.tenant_id == tenant_id))
    }

    async fn get_by_identity(
        &self,
        tenant_id: TenantId,
        relationship_type: &str,
        from_source_id: &str,
        from_integration: &str,
        to_source_id: &str,
        to_integration: &str,
    ) -> Result<Option<StagedRelationship>, QueryError> {
        let key = (
            tenant_id,
            relationship_type.to_owned(),
            from_source_id.to_owned(),
            from_integration.to_owned(),
            to_source_id.to_owned(),
            to_integration.to_owned(),
        );
        Ok(self
            .staged_relationship_index
            .get(&key)
            .and_then(|id| self.staged_relationships.get(id.value()).map(|e| e.clone())))
    }

    async fn list_unresolved(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<StagedRelationship>, QueryError> {
        Ok(self
            .staged_relationships
            .iter()
            .filter(|r| r.tenant_id == tenant_id && !r.both_ends_resolved())
            .map(|r| r.clone())
            .collect())
    }

    async fn list_stale_criteria_matches(
        &self,
        tenant_id: TenantId,
        criteria_id: StagedRelationshipCriteriaId,
        current_execution_id: &str,
    ) -> Result<Vec<StagedRelationship>, QueryError> {
        Ok(self
            .staged_relationships
            .iter()
            .filter(|r| {
                r.tenant_id == tenant_id
                    && r.criteria_id == Some(criteria_id)
                    && r.last_seen_execution != current_execution_id
            })
            .map(|r| r.clone())
            .collect())
    }
}

#[async_trait]
impl RelationshipCriteriaStore for InMemoryStore {
    async fn upsert(
        &self,
        mut criteria: StagedRelationshipCriteria,
    ) -> Result<StagedRelationshipCriteria, InsertionError> {
        if let Some(existing) = self
            .relationship_criteria
            .iter()
            .find(|c| c.tenant_id == criteria.tenant_id && c.criteria_hash == criteria.criteria_hash)
        {
            return Ok(existing.clone());
        }
        criteria.id = StagedRelationshipCriteriaId::new();
        self.relationship_criteria
            .insert(criteria.id, criteria.clone());
        Ok(criteria)
    }

    async fn list_by_target(
        &self,
        tenant_id: TenantId,
        to_entity_type: &str,
        to_integration: &str,
    ) -> Result<Vec<StagedRelationshipCriteria>, QueryError> {
        Ok(self
            .relationship_criteria
            .iter()
            .filter(|c| {
                c.tenant_id == tenant_id
                    && c.to_entity_type == to_entity_type
                    && c.to_integration == to_integration
            })
            .map(|c| c.clone())
            .collect())
    }
}
