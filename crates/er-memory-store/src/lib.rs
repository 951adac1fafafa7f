//! A concurrent, in-process implementation of every [`er_store`] trait.
//!
//! Grounded in the teacher's `PostgresStore<C>` (one struct implementing many
//! narrow store traits) and in the `DashMap`-backed identity-graph pattern
//! used elsewhere in the retrieved corpus for concurrent record stores. This
//! is the reference backend the pipeline's tests run against; a real
//! deployment would swap it for a Postgres-backed adapter implementing the
//! same `er_store::Store` supertrait.

mod deletion;
mod match_index;
mod merge;
mod relationship;
mod staged;

use std::collections::BTreeMap;

use dashmap::DashMap;
use er_types::deletion::{DeletionStrategy, PendingDeletion};
use er_types::ids::{
    MergedEntityId, MergedRelationshipId, PendingDeletionId, StagedEntityId,
    StagedRelationshipCriteriaId, StagedRelationshipId, TenantId,
};
use er_types::match_types::{EntityMatchField, MatchCandidateRecord, MatchFieldMapping, MatchRule};
use er_types::merged::{EntityCluster, MergeAuditEntry, MergeStrategyConfig, MergedEntity, MergedRelationship, RelationshipCluster};
use er_types::staged::{EntityTypeSchema, SourceIdentity, StagedEntity, StagedRelationship, StagedRelationshipCriteria};

type TenantType = (TenantId, String);
type RelIdentity = (TenantId, String, String, String, String, String);

/// In-memory tables backing every `er_store` trait. Field names mirror the
/// `spec.md` §6 persisted-table list one-to-one.
#[derive(Default)]
pub struct InMemoryStore {
    pub(crate) staged_entities: DashMap<StagedEntityId, StagedEntity>,
    pub(crate) staged_entity_index: DashMap<(TenantId, SourceIdentity), StagedEntityId>,
    pub(crate) entity_type_schemas: DashMap<TenantType, EntityTypeSchema>,

    pub(crate) match_field_mappings: DashMap<TenantType, Vec<MatchFieldMapping>>,
    pub(crate) match_fields: DashMap<StagedEntityId, Vec<EntityMatchField>>,
    pub(crate) match_rules: DashMap<TenantType, Vec<MatchRule>>,
    pub(crate) match_candidates: DashMap<(TenantId, StagedEntityId, StagedEntityId), MatchCandidateRecord>,

    pub(crate) merged_entities: DashMap<MergedEntityId, MergedEntity>,
    pub(crate) entity_clusters: DashMap<StagedEntityId, Vec<EntityCluster>>,
    pub(crate) merge_strategies: DashMap<TenantType, MergeStrategyConfig>,
    pub(crate) merge_audit_log: DashMap<MergedEntityId, Vec<MergeAuditEntry>>,

    pub(crate) staged_relationships: DashMap<StagedRelationshipId, StagedRelationship>,
    pub(crate) staged_relationship_index: DashMap<RelIdentity, StagedRelationshipId>,
    pub(crate) relationship_criteria: DashMap<StagedRelationshipCriteriaId, StagedRelationshipCriteria>,
    pub(crate) merged_relationships: DashMap<MergedRelationshipId, MergedRelationship>,
    pub(crate) relationship_clusters: DashMap<StagedRelationshipId, RelationshipCluster>,

    pub(crate) deletion_strategies: DashMap<TenantType, Vec<DeletionStrategy>>,
    pub(crate) pending_deletions: DashMap<(TenantId, StagedEntityId), PendingDeletion>,
    pub(crate) execution_tracking:
        DashMap<(TenantId, String, String, String), er_types::deletion::ExecutionTracking>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/seed helper: registers the tenant's field mappings for an entity
    /// type (spec §4.2 step 1). Production code would load these from the
    /// tenant configuration store instead.
    pub fn set_match_field_mappings(
        &self,
        tenant_id: TenantId,
        entity_type: &str,
        mappings: Vec<MatchFieldMapping>,
    ) {
        self.match_field_mappings
            .insert((tenant_id, entity_type.to_owned()), mappings);
    }

    pub fn set_match_rules(&self, tenant_id: TenantId, entity_type: &str, rules: Vec<MatchRule>) {
        self.match_rules
            .insert((tenant_id, entity_type.to_owned()), rules);
    }

    pub fn set_merge_strategy(&self, config: MergeStrategyConfig) {
        self.merge_strategies
            .insert((config.tenant_id, config.entity_type.clone()), config);
    }

    pub fn set_entity_type_schema(&self, schema: EntityTypeSchema) {
        self.entity_type_schemas
            .insert((schema.tenant_id, schema.entity_type.clone()), schema);
    }

    pub fn add_deletion_strategy(&self, strategy: DeletionStrategy) {
        let scope_key = match &strategy.scope {
            er_types::deletion::DeletionScopeType::EntityType(t)
            | er_types::deletion::DeletionScopeType::RelationshipType(t) => t.clone(),
        };
        self.deletion_strategies
            .entry((strategy.tenant_id, scope_key))
            .or_default()
            .push(strategy);
    }

    #[must_use]
    pub fn pending_deletion_count(&self, tenant_id: TenantId) -> usize {
        self.pending_deletions
            .iter()
            .filter(|entry| entry.key().0 == tenant_id && !entry.value().cancelled)
            .count()
    }

    #[must_use]
    pub fn pending_deletion_for(
        &self,
        tenant_id: TenantId,
        staged_entity_id: StagedEntityId,
    ) -> Option<PendingDeletion> {
        self.pending_deletions
            .get(&(tenant_id, staged_entity_id))
            .map(|entry| entry.value().clone())
    }
}

pub(crate) fn group_by_field<'a>(
    fields: &'a [EntityMatchField],
) -> BTreeMap<(String, er_types::match_types::MatchType, er_types::match_types::Normalizer), &'a EntityMatchField> {
    fields.iter().map(|f| (f.key(), f)).collect()
}
