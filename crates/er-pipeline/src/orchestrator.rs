//! Wires the staged store, match index writer, match engine, merge engine,
//! relationship resolver, deletion controller, and event emitter into the
//! shard-serialized pipeline described in spec §5.

use er_deletion::DeletionController;
use er_events::EventPublisher;
use er_match::engine::MatchEngine;
use er_match::index_writer::MatchIndexWriter;
use er_merge::MergeEngine;
use er_relationships::RelationshipResolver;
use er_store::{MergedEntityStore, Store};
use er_types::error::PipelineError;
use er_types::events::{EntityEvent, EntityEventType, PipelineEvent, SCHEMA_VERSION};
use er_types::ids::TenantId;
use er_types::match_types::MatchEngineConfig;
use er_types::staged::{StagedEntity, StagedRelationship, UpsertStagedEntityRequest};
use error_stack::{Result, ResultExt};
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

use crate::shard::{ShardExecutor, ShardKey};

/// One tenant-agnostic orchestrator instance per process, backed by a single
/// storage implementation and event publisher.
pub struct Pipeline<'s, S, P> {
    store: &'s S,
    publisher: &'s P,
    match_config: MatchEngineConfig,
    shards: ShardExecutor,
}

/// What happened as a result of ingesting one entity record (spec §8
/// scenario 4's `is_new` plus whether it ended up auto-merged).
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub staged: StagedEntity,
    pub is_new: bool,
    pub is_changed: bool,
    pub auto_merged_into: Vec<er_types::ids::MergedEntityId>,
}

impl<'s, S, P> Pipeline<'s, S, P>
where
    S: Store,
    P: EventPublisher,
{
    #[must_use]
    pub fn new(store: &'s S, publisher: &'s P, match_config: MatchEngineConfig) -> Self {
        Self { store, publisher, match_config, shards: ShardExecutor::new() }
    }

    /// Full per-entity path (spec §4.1-§4.4, §4.7): upsert, reindex match
    /// fields if changed, run candidate scoring, auto-merge, recompute the
    /// golden record, and emit the resulting event. Serialized per `(tenant,
    /// entity_type)` shard; returns `None` if cancelled before the shard slot
    /// could be acquired.
    #[tracing::instrument(level = "debug", skip(self, request, cancellation))]
    pub async fn ingest_entity(
        &self,
        request: UpsertStagedEntityRequest,
        cancellation: &CancellationToken,
    ) -> Option<Result<IngestOutcome, PipelineError>> {
        let tenant_id = request.tenant_id;
        let entity_type = request.entity_type.clone();
        let key = ShardKey::new(tenant_id, entity_type.clone());

        self.shards
            .run(key, cancellation, || self.ingest_entity_inner(tenant_id, entity_type, request))
            .await
    }

    async fn ingest_entity_inner(
        &self,
        tenant_id: TenantId,
        entity_type: String,
        request: UpsertStagedEntityRequest,
    ) -> Result<IngestOutcome, PipelineError> {
        let outcome = er_store::StagedEntityStore::upsert(self.store, request)
            .await
            .change_context(PipelineError)?;

        if !outcome.is_new {
            er_store::PendingDeletionStore::cancel_by_entity_id(self.store, tenant_id, outcome.entity.id)
                .await
                .change_context(PipelineError)?;
        }

        if !outcome.is_changed {
            return Ok(IngestOutcome {
                staged: outcome.entity,
                is_new: outcome.is_new,
                is_changed: false,
                auto_merged_into: Vec::new(),
            });
        }

        let index_writer = MatchIndexWriter::new(self.store);
        index_writer
            .write_for_entity(tenant_id, &entity_type, outcome.entity.id, &outcome.entity.data)
            .await
            .change_context(PipelineError)?;

        let match_engine = MatchEngine::new(self.store, self.match_config.clone());
        let results = match_engine
            .run(tenant_id, &entity_type, outcome.entity.id)
            .await
            .change_context(PipelineError)?;

        let merge_engine = MergeEngine::new(self.store);
        let mut auto_merged_into = Vec::new();
        for result in results.iter().filter(|r| r.auto_merge) {
            let merged_id = merge_engine
                .merge(tenant_id, &entity_type, outcome.entity.id, result.candidate_staged_entity_id)
                .await
                .change_context(PipelineError)?;
            auto_merged_into.push(merged_id);
        }
        if auto_merged_into.is_empty() {
            if let Some(merged_id) = merge_engine
                .apply_upsert(tenant_id, &entity_type, outcome.entity.id)
                .await
                .change_context(PipelineError)?
            {
                auto_merged_into.push(merged_id);
            }
        }

        let relationships = RelationshipResolver::new(self.store);
        relationships.retry_unresolved(tenant_id).await.change_context(PipelineError)?;

        for merged_id in &auto_merged_into {
            self.emit_entity_event(tenant_id, *merged_id, &entity_type, outcome.is_new).await?;
        }

        Ok(IngestOutcome {
            staged: outcome.entity,
            is_new: outcome.is_new,
            is_changed: outcome.is_changed,
            auto_merged_into,
        })
    }

    /// Direct-path relationship ingestion (spec §4.5 steps 1-4), serialized on
    /// the `from` side's shard.
    #[tracing::instrument(level = "debug", skip(self, relationship, cancellation))]
    pub async fn ingest_relationship(
        &self,
        relationship: StagedRelationship,
        cancellation: &CancellationToken,
    ) -> Option<Result<StagedRelationship, PipelineError>> {
        let tenant_id = relationship.tenant_id;
        let key = ShardKey::new(tenant_id, relationship.from_entity_type.clone());
        self.shards
            .run(key, cancellation, || async {
                RelationshipResolver::new(self.store)
                    .resolve_direct(tenant_id, relationship)
                    .await
                    .change_context(PipelineError)
            })
            .await
    }

    /// Deletion tick (spec §4.6): runs one scheduling pass followed by one
    /// execution pass for `tenant_id`, not shard-keyed since deletion scope
    /// spans every shard for the entity type.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn run_deletion_tick(&self, tenant_id: TenantId, execution_limit: usize) -> Result<(u64, u64), PipelineError> {
        let controller = DeletionController::new(self.store, self.publisher);
        let scheduled = controller.run_scheduling(tenant_id).await.change_context(PipelineError)?;
        let executed = controller.run_execution(tenant_id, execution_limit).await.change_context(PipelineError)?;
        Ok((scheduled, executed))
    }

    async fn emit_entity_event(
        &self,
        tenant_id: TenantId,
        entity_id: er_types::ids::MergedEntityId,
        entity_type: &str,
        is_new: bool,
    ) -> Result<(), PipelineError> {
        let merged = MergedEntityStore::get(self.store, tenant_id, entity_id)
            .await
            .change_context(PipelineError)?
            .ok_or_else(|| error_stack::Report::new(PipelineError).attach_printable("merged entity vanished mid-ingest"))?;

        self.publisher
            .publish(PipelineEvent::Entity(EntityEvent {
                event_type: if is_new && merged.source_count == 1 {
                    EntityEventType::Created
                } else {
                    EntityEventType::Merged
                },
                schema_version: SCHEMA_VERSION.to_owned(),
                tenant_id,
                entity_id,
                entity_type: entity_type.to_owned(),
                data: Some(merged.data),
                source_entities: merged.primary_source_id.map(|id| vec![id]),
                version: merged.version,
                timestamp: OffsetDateTime::now_utc(),
                correlation_id: None,
            }))
            .await
            .change_context(PipelineError)
    }
}
