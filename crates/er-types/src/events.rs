use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::ids::{MergedEntityId, MergedRelationshipId, StagedEntityId, TenantId};
use crate::value::Value;

pub const SCHEMA_VERSION: &str = "1.0";

/// Egress event (entity) payload, spec §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityEvent {
    pub event_type: EntityEventType,
    pub schema_version: String,
    pub tenant_id: TenantId,
    pub entity_id: MergedEntityId,
    pub entity_type: String,
    pub data: Option<Value>,
    pub source_entities: Option<Vec<StagedEntityId>>,
    pub version: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub correlation_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityEventType {
    Created,
    Updated,
    Deleted,
    Merged,
}

/// Egress event (relationship) payload, spec §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipEvent {
    pub event_type: RelationshipEventType,
    pub schema_version: String,
    pub tenant_id: TenantId,
    pub relationship_id: MergedRelationshipId,
    pub relationship_type: String,
    pub from_entity_id: MergedEntityId,
    pub from_entity_type: String,
    pub to_entity_id: MergedEntityId,
    pub to_entity_type: String,
    pub properties: Option<Value>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipEventType {
    Created,
    Deleted,
}

/// `match.candidate` event, emitted alongside the persisted `match_candidates`
/// row (spec §4.3 side effect, §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCandidateEvent {
    pub schema_version: String,
    pub tenant_id: TenantId,
    pub source_staged_entity_id: StagedEntityId,
    pub candidate_staged_entity_id: StagedEntityId,
    pub score: f64,
    pub auto_merge: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Every event kind the emitter publishes (spec §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum PipelineEvent {
    Entity(EntityEvent),
    Relationship(RelationshipEvent),
    MatchCandidate(MatchCandidateEvent),
}

impl PipelineEvent {
    /// Bus partition key: entity or relationship ID, so events for the same
    /// key are delivered in commit order (spec §4.7, §5).
    #[must_use]
    pub fn partition_key(&self) -> String {
        match self {
            Self::Entity(event) => event.entity_id.to_string(),
            Self::Relationship(event) => event.relationship_id.to_string(),
            Self::MatchCandidate(event) => event.source_staged_entity_id.to_string(),
        }
    }
}
