//! Direct and criteria paths, golden-edge materialization (spec §4.5).

use er_store::{
    ClusterLookup, MergedRelationshipStore, RelationshipClusterStore, RelationshipCriteriaStore,
    StagedEntityStore, StagedRelationshipStore,
};
use er_types::error::RelationshipError;
use er_types::ids::{golden_relationship_id, StagedRelationshipCriteriaId, TenantId};
use er_types::merged::MergedRelationship;
use er_types::staged::{StagedRelationship, StagedRelationshipCriteria};
use error_stack::{Result, ResultExt};
use time::OffsetDateTime;

use crate::criteria::{criteria_hash, matches};

pub struct RelationshipResolver<'s, S> {
    store: &'s S,
}

impl<'s, S> RelationshipResolver<'s, S>
where
    S: StagedEntityStore
        + StagedRelationshipStore
        + RelationshipCriteriaStore
        + MergedRelationshipStore
        + RelationshipClusterStore
        + ClusterLookup,
{
    #[must_use]
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    /// Direct path steps 1-4 (spec §4.5): upsert the staged relationship,
    /// resolve both ends against staged entities, and materialize the golden
    /// edge if both ends are clustered. Out-of-order arrival — either end not
    /// yet staged — is legal and simply leaves the edge unmaterialized.
    #[tracing::instrument(level = "debug", skip(self, relationship))]
    pub async fn resolve_direct(
        &self,
        tenant_id: TenantId,
        mut relationship: StagedRelationship,
    ) -> Result<StagedRelationship, RelationshipError> {
        relationship.from_staged_entity_id = self
            .store
            .get_by_source_and_type(
                tenant_id,
                &relationship.from_entity_type,
                &relationship.from_source_id,
                &relationship.from_integration,
            )
            .await
            .change_context(RelationshipError)?
            .map(|e| e.id);

        if let Some(to_source_id) = relationship.to_source_id.clone() {
            relationship.to_staged_entity_id = self
                .store
                .get_by_source_and_type(tenant_id, &relationship.to_entity_type, &to_source_id, &relationship.to_integration)
                .await
                .change_context(RelationshipError)?
                .map(|e| e.id);
        }

        let staged = StagedRelationshipStore::upsert(self.store, relationship)
            .await
            .change_context(RelationshipError)?;
        self.materialize_if_clustered(tenant_id, &staged).await?;
        Ok(staged)
    }

    /// Retries resolution for relationships with an unresolved end (spec
    /// §4.5 step 2), called as new staged entities arrive.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn retry_unresolved(&self, tenant_id: TenantId) -> Result<u64, RelationshipError> {
        let unresolved = self
            .store
            .list_unresolved(tenant_id)
            .await
            .change_context(RelationshipError)?;

        let mut resolved_count = 0;
        for mut relationship in unresolved {
            let mut changed = false;
            if relationship.from_staged_entity_id.is_none() {
                relationship.from_staged_entity_id = self
                    .store
                    .get_by_source_and_type(
                        tenant_id,
                        &relationship.from_entity_type,
                        &relationship.from_source_id,
                        &relationship.from_integration,
                    )
                    .await
                    .change_context(RelationshipError)?
                    .map(|e| e.id);
                changed |= relationship.from_staged_entity_id.is_some();
            }
            if relationship.to_staged_entity_id.is_none() {
                if let Some(to_source_id) = relationship.to_source_id.clone() {
                    relationship.to_staged_entity_id = self
                        .store
                        .get_by_source_and_type(tenant_id, &relationship.to_entity_type, &to_source_id, &relationship.to_integration)
                        .await
                        .change_context(RelationshipError)?
                        .map(|e| e.id);
                    changed |= relationship.to_staged_entity_id.is_some();
                }
            }
            if !changed {
                continue;
            }
            let staged = StagedRelationshipStore::upsert(self.store, relationship)
                .await
                .change_context(RelationshipError)?;
            if self.materialize_if_clustered(tenant_id, &staged).await?.is_some() {
                resolved_count += 1;
            }
        }
        Ok(resolved_count)
    }

    /// Criteria path step 1 (spec §4.5): canonicalize and upsert a
    /// subscription, then evaluate it against currently staged entities.
    #[tracing::instrument(level = "debug", skip(self, criteria))]
    pub async fn upsert_criteria(
        &self,
        mut criteria: StagedRelationshipCriteria,
    ) -> Result<StagedRelationshipCriteria, RelationshipError> {
        criteria.criteria_hash = criteria_hash(&criteria.criteria);
        RelationshipCriteriaStore::upsert(self.store, criteria)
            .await
            .change_context(RelationshipError)
    }

    /// Criteria path steps 2-3 (spec §4.5): evaluate a subscription against
    /// every staged entity of `(tenant, to_entity_type, to_integration)` and
    /// materialize a [`StagedRelationship`] per match.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn evaluate_criteria(
        &self,
        tenant_id: TenantId,
        criteria: &StagedRelationshipCriteria,
        execution_id: &str,
    ) -> Result<Vec<StagedRelationship>, RelationshipError> {
        let candidates = self
            .store
            .list_in_scope(tenant_id, &criteria.to_entity_type)
            .await
            .change_context(RelationshipError)?;

        let mut materialized = Vec::new();
        for candidate in candidates {
            if candidate.integration != criteria.to_integration || candidate.is_deleted() {
                continue;
            }
            if !matches(&candidate, &criteria.criteria) {
                continue;
            }
            let relationship = StagedRelationship {
                id: er_types::ids::StagedRelationshipId::new(),
                tenant_id,
                relationship_type: criteria.relationship_type.clone(),
                from_entity_type: criteria.from_entity_type.clone(),
                from_source_id: criteria.from_source_id.clone(),
                from_integration: criteria.from_integration.clone(),
                from_staged_entity_id: None,
                to_entity_type: criteria.to_entity_type.clone(),
                to_source_id: Some(candidate.source_id.clone()),
                to_integration: criteria.to_integration.clone(),
                to_staged_entity_id: Some(candidate.id),
                criteria_id: Some(criteria.id),
                data: er_types::value::Value::Null,
                execution_id: execution_id.to_owned(),
                last_seen_execution: execution_id.to_owned(),
                created_at: OffsetDateTime::now_utc(),
                updated_at: OffsetDateTime::now_utc(),
                deleted_at: None,
            };
            let staged = self.resolve_direct(tenant_id, relationship).await?;
            materialized.push(staged);
        }
        Ok(materialized)
    }

    /// Stale criteria matches not re-verified by the latest execution (spec
    /// §4.5 step 4); the deletion controller schedules their removal.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn stale_criteria_matches(
        &self,
        tenant_id: TenantId,
        criteria_id: StagedRelationshipCriteriaId,
        current_execution_id: &str,
    ) -> Result<Vec<StagedRelationship>, RelationshipError> {
        self.store
            .list_stale_criteria_matches(tenant_id, criteria_id, current_execution_id)
            .await
            .change_context(RelationshipError)
    }

    async fn materialize_if_clustered(
        &self,
        tenant_id: TenantId,
        staged: &StagedRelationship,
    ) -> Result<Option<MergedRelationship>, RelationshipError> {
        let (Some(from_staged), Some(to_staged)) = (staged.from_staged_entity_id, staged.to_staged_entity_id) else {
            return Ok(None);
        };
        let Some(from_merged) = self
            .store
            .merged_entity_for_staged(tenant_id, from_staged)
            .await
            .change_context(RelationshipError)?
        else {
            return Ok(None);
        };
        let Some(to_merged) = self
            .store
            .merged_entity_for_staged(tenant_id, to_staged)
            .await
            .change_context(RelationshipError)?
        else {
            return Ok(None);
        };

        let id = golden_relationship_id(tenant_id, &staged.relationship_type, from_merged, to_merged);
        let now = OffsetDateTime::now_utc();
        let edge = MergedRelationship {
            id,
            tenant_id,
            relationship_type: staged.relationship_type.clone(),
            from_merged_entity_id: from_merged,
            to_merged_entity_id: to_merged,
            data: staged.data.clone(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        let edge = MergedRelationshipStore::upsert(self.store, edge)
            .await
            .change_context(RelationshipError)?;
        self.store
            .link(tenant_id, staged.id, id)
            .await
            .change_context(RelationshipError)?;
        Ok(Some(edge))
    }
}

#[cfg(test)]
mod tests {
    use er_memory_store::InMemoryStore;
    use er_store::{EntityClusterStore, MergedEntityStore, StagedEntityStore};
    use er_types::ids::{MergedEntityId, StagedRelationshipId, TenantId};
    use er_types::merged::MergedEntity;
    use er_types::staged::UpsertStagedEntityRequest;
    use er_types::value::Value;

    use super::*;

    async fn stage_and_cluster(store: &InMemoryStore, tenant_id: TenantId, entity_type: &str, source_id: &str) -> er_types::ids::StagedEntityId {
        let outcome = store
            .upsert(UpsertStagedEntityRequest {
                tenant_id,
                config_id: "cfg".into(),
                entity_type: entity_type.into(),
                source_id: source_id.into(),
                integration: "crm".into(),
                source_key: "k".into(),
                execution_id: "e1".into(),
                data: Value::Null,
            })
            .await
            .expect("upsert staged");
        let staged_id = outcome.entity.id;

        let now = OffsetDateTime::now_utc();
        let merged = store
            .insert(MergedEntity {
                id: MergedEntityId::new(),
                tenant_id,
                entity_type: entity_type.into(),
                data: Value::Null,
                source_count: 1,
                primary_source_id: Some(staged_id),
                version: 1,
                created_at: now,
                updated_at: now,
                deleted_at: None,
            })
            .await
            .expect("insert merged");
        store
            .add_member(tenant_id, merged.id, staged_id, true)
            .await
            .expect("add member");
        staged_id
    }

    #[tokio::test]
    async fn direct_path_materializes_golden_edge_once_both_ends_clustered() {
        let store = InMemoryStore::default();
        let tenant_id = TenantId::new();
        stage_and_cluster(&store, tenant_id, "person", "alice").await;
        stage_and_cluster(&store, tenant_id, "company", "acme").await;

        let resolver = RelationshipResolver::new(&store);
        let relationship = StagedRelationship {
            id: StagedRelationshipId::new(),
            tenant_id,
            relationship_type: "works_at".into(),
            from_entity_type: "person".into(),
            from_source_id: "alice".into(),
            from_integration: "crm".into(),
            from_staged_entity_id: None,
            to_entity_type: "company".into(),
            to_source_id: Some("acme".into()),
            to_integration: "crm".into(),
            to_staged_entity_id: None,
            criteria_id: None,
            data: Value::Null,
            execution_id: "e1".into(),
            last_seen_execution: "e1".into(),
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
            deleted_at: None,
        };

        let staged = resolver.resolve_direct(tenant_id, relationship).await.expect("resolve");
        assert!(staged.both_ends_resolved());

        let cluster = store
            .get_for_staged(tenant_id, staged.id)
            .await
            .expect("get_for_staged")
            .expect("golden edge materialized");
        let edge = store
            .get(tenant_id, cluster.merged_relationship_id)
            .await
            .expect("get edge")
            .expect("present");
        assert_eq!(edge.relationship_type, "works_at");
    }

    #[tokio::test]
    async fn out_of_order_arrival_leaves_relationship_unmaterialized() {
        let store = InMemoryStore::default();
        let tenant_id = TenantId::new();

        let resolver = RelationshipResolver::new(&store);
        let relationship = StagedRelationship {
            id: StagedRelationshipId::new(),
            tenant_id,
            relationship_type: "works_at".into(),
            from_entity_type: "person".into(),
            from_source_id: "alice".into(),
            from_integration: "crm".into(),
            from_staged_entity_id: None,
            to_entity_type: "company".into(),
            to_source_id: Some("acme".into()),
            to_integration: "crm".into(),
            to_staged_entity_id: None,
            criteria_id: None,
            data: Value::Null,
            execution_id: "e1".into(),
            last_seen_execution: "e1".into(),
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
            deleted_at: None,
        };

        let staged = resolver.resolve_direct(tenant_id, relationship).await.expect("resolve");
        assert!(!staged.both_ends_resolved());
        assert!(store.get_for_staged(tenant_id, staged.id).await.expect("query").is_none());
    }
}
