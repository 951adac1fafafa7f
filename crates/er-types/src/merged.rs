use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::ids::{MergedEntityId, MergedRelationshipId, StagedEntityId, StagedRelationshipId, TenantId};
use crate::value::Value;

/// The golden record (spec §3, `MergedEntity`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergedEntity {
    pub id: MergedEntityId,
    pub tenant_id: TenantId,
    pub entity_type: String,
    pub data: Value,
    pub source_count: u32,
    pub primary_source_id: Option<StagedEntityId>,
    pub version: u64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub deleted_at: Option<OffsetDateTime>,
}

/// Link from a staged entity to its merged entity (spec §3, `EntityCluster`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityCluster {
    pub tenant_id: TenantId,
    pub staged_entity_id: StagedEntityId,
    pub merged_entity_id: MergedEntityId,
    pub is_primary: bool,
    pub created_at: OffsetDateTime,
    pub removed_at: Option<OffsetDateTime>,
}

impl EntityCluster {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.removed_at.is_none()
    }
}

/// One cluster-member value contributing to a field merge (spec §4.4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldValueObservation {
    pub value: Value,
    pub updated_at: OffsetDateTime,
    pub integration: String,
    pub source_entity_id: StagedEntityId,
}

/// Field merge strategies, exact behavior per spec §4.4.1.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum MergeStrategy {
    MostRecent,
    Last,
    First,
    MostTrusted,
    SourcePriority,
    CollectAll { dedup: bool, max_items: Option<usize> },
    Longest,
    Shortest,
    Max,
    Min,
    Sum,
    Average,
    PreferNonEmpty,
}

/// Tenant-defined, per-entity-type field -> strategy mapping (spec §4.4.1).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MergeStrategyConfig {
    pub tenant_id: TenantId,
    pub entity_type: String,
    pub field_strategies: BTreeMap<String, MergeStrategy>,
    /// Integration -> priority rank used by `most_trusted`/`source_priority`;
    /// higher wins.
    pub source_priority: BTreeMap<String, i32>,
}

/// A recorded disagreement between cluster members on one field (spec §4.4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConflict {
    pub field: String,
    pub values: Vec<Value>,
    pub integrations: Vec<String>,
    pub resolution: String,
    pub resolved_value: Value,
}

/// One entry in `merge_audit_log` (spec §6 persisted tables).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeAuditEntry {
    pub tenant_id: TenantId,
    pub merged_entity_id: MergedEntityId,
    pub version: u64,
    pub conflicts: Vec<MergeConflict>,
    pub created_at: OffsetDateTime,
}

/// Golden edge between two golden entities (spec §3, `MergedRelationship`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergedRelationship {
    pub id: MergedRelationshipId,
    pub tenant_id: TenantId,
    pub relationship_type: String,
    pub from_merged_entity_id: MergedEntityId,
    pub to_merged_entity_id: MergedEntityId,
    pub data: Value,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub deleted_at: Option<OffsetDateTime>,
}

/// Links a `staged_relationship_id` to its golden edge (spec §3, §4.5 step 4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipCluster {
    pub tenant_id: TenantId,
    pub staged_relationship_id: StagedRelationshipId,
    pub merged_relationship_id: MergedRelationshipId,
    pub is_primary: bool,
    pub created_at: OffsetDateTime,
}
