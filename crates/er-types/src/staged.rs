use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::ids::{StagedEntityId, StagedRelationshipCriteriaId, StagedRelationshipId, TenantId};
use crate::value::Value;

/// A raw record from one source identity (spec §3, `StagedEntity`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagedEntity {
    pub id: StagedEntityId,
    pub tenant_id: TenantId,
    pub config_id: String,
    pub entity_type: String,
    pub source_id: String,
    pub integration: String,
    pub source_key: String,
    pub execution_id: String,
    pub last_seen_execution: String,
    pub data: Value,
    pub fingerprint: u64,
    pub previous_fingerprint: Option<u64>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub deleted_at: Option<OffsetDateTime>,
}

impl StagedEntity {
    #[must_use]
    pub fn identity(&self) -> SourceIdentity {
        SourceIdentity {
            entity_type: self.entity_type.clone(),
            source_id: self.source_id.clone(),
            integration: self.integration.clone(),
        }
    }

    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// `(entity_type, source_id, integration)` — the unique-identity key staged
/// entities are upserted on (spec §3 invariant).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceIdentity {
    pub entity_type: String,
    pub source_id: String,
    pub integration: String,
}

/// Request payload for `StagedStore::upsert` (spec §4.1).
#[derive(Debug, Clone)]
pub struct UpsertStagedEntityRequest {
    pub tenant_id: TenantId,
    pub config_id: String,
    pub entity_type: String,
    pub source_id: String,
    pub integration: String,
    pub source_key: String,
    pub execution_id: String,
    pub data: Value,
}

/// Result of `StagedStore::upsert`.
#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub entity: StagedEntity,
    pub is_new: bool,
    pub is_changed: bool,
}

/// A concrete directed edge between two source identities (spec §3,
/// `StagedRelationship`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagedRelationship {
    pub id: StagedRelationshipId,
    pub tenant_id: TenantId,
    pub relationship_type: String,

    pub from_entity_type: String,
    pub from_source_id: String,
    pub from_integration: String,
    pub from_staged_entity_id: Option<StagedEntityId>,

    pub to_entity_type: String,
    pub to_source_id: Option<String>,
    pub to_integration: String,
    pub to_staged_entity_id: Option<StagedEntityId>,

    /// Non-null for criteria-materialized edges (spec §3 invariant).
    pub criteria_id: Option<StagedRelationshipCriteriaId>,

    pub data: Value,
    pub execution_id: String,
    pub last_seen_execution: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub deleted_at: Option<OffsetDateTime>,
}

impl StagedRelationship {
    #[must_use]
    pub fn both_ends_resolved(&self) -> bool {
        self.from_staged_entity_id.is_some() && self.to_staged_entity_id.is_some()
    }
}

/// The supported criteria comparison operators (spec §3, `StagedRelationshipCriteria`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "snake_case")]
pub enum CriteriaOperator {
    Eq(Value),
    Contains(Value),
    In(Vec<Value>),
    Gte(f64),
    Gt(f64),
    Lte(f64),
    Lt(f64),
}

/// A subscription describing a class of target entities for a given `from`
/// source identity (spec §3, §4.5 criteria path).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagedRelationshipCriteria {
    pub id: StagedRelationshipCriteriaId,
    pub tenant_id: TenantId,
    pub relationship_type: String,
    pub from_entity_type: String,
    pub from_source_id: String,
    pub from_integration: String,
    pub to_entity_type: String,
    pub to_integration: String,
    pub criteria: BTreeMap<String, CriteriaOperator>,
    pub criteria_hash: u64,
    pub last_execution_id: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Tenant-scoped schema metadata for an entity type (spec §9 "Cyclic ownership"
/// note and §4.1 "schema-declared fingerprint exclusions" — named but never
/// modeled in the distilled spec; this is the first-class record for it).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityTypeSchema {
    pub tenant_id: TenantId,
    pub entity_type: String,
    pub exclude_from_fingerprint: Vec<String>,
}

impl Default for EntityTypeSchema {
    fn default() -> Self {
        Self {
            tenant_id: TenantId::default(),
            entity_type: String::new(),
            exclude_from_fingerprint: Vec::new(),
        }
    }
}
