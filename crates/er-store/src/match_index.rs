use async_trait::async_trait;
use er_types::error::{InsertionError, QueryError};
use er_types::ids::{StagedEntityId, TenantId};
use er_types::match_types::{
    EntityMatchField, MatchCandidateRecord, MatchFieldMapping, MatchRule,
};
use error_stack::Result;

/// Describes the API of a store implementation for [`EntityMatchField`] rows
/// (spec §4.2). A given entity's full match-field set is always replaced
/// transactionally, never patched incrementally.
#[async_trait]
pub trait MatchFieldStore: Send + Sync {
    async fn mappings_for_type(
        &self,
        tenant_id: TenantId,
        entity_type: &str,
    ) -> Result<Vec<MatchFieldMapping>, QueryError>;

    /// Deletes every row for `staged_entity_id`, then inserts `fields` in
    /// batches of at most `batch_size` (spec §4.2 step 5, batch size <= 500).
    async fn replace_fields(
        &self,
        tenant_id: TenantId,
        staged_entity_id: StagedEntityId,
        fields: Vec<EntityMatchField>,
    ) -> Result<(), InsertionError>;

    async fn fields_for_entity(
        &self,
        tenant_id: TenantId,
        staged_entity_id: StagedEntityId,
    ) -> Result<Vec<EntityMatchField>, QueryError>;

    /// Batch-fetches match fields for every candidate ID (spec §4.3 step 4).
    async fn fields_for_entities(
        &self,
        tenant_id: TenantId,
        staged_entity_ids: &[StagedEntityId],
    ) -> Result<Vec<EntityMatchField>, QueryError>;

    /// Candidate discovery for one condition: exact/phonetic lookups match by
    /// normalized value or token; numeric/date lookups match by range; fuzzy
    /// lookups are not served here (the match engine batches those itself via
    /// [`MatchFieldStore::fields_for_entities`] plus an in-process similarity
    /// pass, per spec §9's resolved open question). Returns candidate
    /// `staged_entity_id`s, excluding `source_id` itself.
    async fn candidate_ids_exact_or_phonetic(
        &self,
        tenant_id: TenantId,
        entity_type: &str,
        source_id: StagedEntityId,
        field: &str,
        value_or_token: &str,
        limit: usize,
    ) -> Result<Vec<StagedEntityId>, QueryError>;

    /// Candidate discovery for `numeric`/`date_range` conditions: every
    /// staged entity of `entity_type` that carries a value for `field` within
    /// the given inclusive range.
    async fn candidate_ids_in_range(
        &self,
        tenant_id: TenantId,
        entity_type: &str,
        source_id: StagedEntityId,
        field: &str,
        low: f64,
        high: f64,
        limit: usize,
    ) -> Result<Vec<StagedEntityId>, QueryError>;

    /// Every candidate carrying *some* value for `(field, normalizer)`,
    /// fuzzy match_type — the match engine scores these in-process in one
    /// batched similarity pass (spec §4.3 step 5).
    async fn candidate_ids_with_fuzzy_field(
        &self,
        tenant_id: TenantId,
        entity_type: &str,
        source_id: StagedEntityId,
        field: &str,
        limit: usize,
    ) -> Result<Vec<StagedEntityId>, QueryError>;
}

/// Describes the API of a store implementation for [`MatchRule`] definitions
/// (spec §4.3 step 2).
#[async_trait]
pub trait MatchRuleStore: Send + Sync {
    /// Active rules for `entity_type`, sorted by `priority DESC`.
    async fn active_rules(
        &self,
        tenant_id: TenantId,
        entity_type: &str,
    ) -> Result<Vec<MatchRule>, QueryError>;
}

/// Describes the API of a store implementation for `match_candidates` rows
/// (spec §4.3 side effect).
#[async_trait]
pub trait MatchCandidateStore: Send + Sync {
    /// Inserts or updates a candidate pair; an existing row is only updated
    /// if the new score is higher (spec §4.3 side effect).
    async fn upsert_if_higher(
        &self,
        record: MatchCandidateRecord,
    ) -> Result<(), InsertionError>;

    async fn get(
        &self,
        tenant_id: TenantId,
        source_staged_entity_id: StagedEntityId,
        candidate_staged_entity_id: StagedEntityId,
    ) -> Result<Option<MatchCandidateRecord>, QueryError>;
}
