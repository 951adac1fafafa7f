use std::path::PathBuf;

use clap::Parser;
use er_events::RecordingEventPublisher;
use er_memory_store::InMemoryStore;
use er_pipeline::Pipeline;
use er_types::ids::{StagedRelationshipId, TenantId};
use er_types::match_types::MatchEngineConfig;
use er_types::staged::{StagedRelationship, UpsertStagedEntityRequest};
use error_stack::{Result, ResultExt};
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

use crate::batch::Batch;
use crate::error::CliError;

#[derive(Debug, Parser)]
pub struct RunArgs {
    /// Path to a JSON batch file of entities/relationships to ingest.
    #[clap(long, env = "ENTITY_RESOLUTION_INPUT")]
    pub input: PathBuf,

    /// Tenant the batch is ingested under. A fresh tenant is minted if omitted.
    #[clap(long, env = "ENTITY_RESOLUTION_TENANT_ID")]
    pub tenant_id: Option<uuid::Uuid>,

    /// Minimum aggregate score for a candidate to surface as a match (spec §4.3).
    #[clap(long, default_value_t = MatchEngineConfig::default().min_match_score)]
    pub min_match_score: f64,

    /// Aggregate score at or above which a match is auto-merged (spec §4.3).
    #[clap(long, default_value_t = MatchEngineConfig::default().auto_merge_threshold)]
    pub auto_merge_threshold: f64,

    /// Run a deletion scheduling + execution tick after the batch is ingested.
    #[clap(long)]
    pub run_deletion_tick: bool,

    /// Cap on pending deletions executed in one tick.
    #[clap(long, default_value_t = 1000)]
    pub deletion_execution_limit: usize,
}

#[tracing::instrument(skip(args))]
pub async fn run(args: RunArgs) -> Result<(), CliError> {
    let raw = std::fs::read_to_string(&args.input)
        .change_context(CliError)
        .attach_printable_lazy(|| format!("could not read {}", args.input.display()))?;
    let batch: Batch = serde_json::from_str(&raw)
        .change_context(CliError)
        .attach_printable("input file is not a valid batch document")?;

    let tenant_id = args.tenant_id.map(TenantId::from).unwrap_or_default();
    let store = InMemoryStore::default();
    let publisher = RecordingEventPublisher::new();
    let match_config = MatchEngineConfig {
        min_match_score: args.min_match_score,
        auto_merge_threshold: args.auto_merge_threshold,
        ..MatchEngineConfig::default()
    };
    let pipeline = Pipeline::new(&store, &publisher, match_config);
    let cancellation = CancellationToken::new();

    let mut new_count = 0u64;
    let mut changed_count = 0u64;
    let mut merged_count = 0u64;
    for entity in batch.entities {
        let outcome = pipeline
            .ingest_entity(
                UpsertStagedEntityRequest {
                    tenant_id,
                    config_id: entity.config_id,
                    entity_type: entity.entity_type,
                    source_id: entity.source_id,
                    integration: entity.integration,
                    source_key: entity.source_key,
                    execution_id: entity.execution_id,
                    data: entity.data,
                },
                &cancellation,
            )
            .await
            .ok_or_else(|| error_stack::Report::new(CliError).attach_printable("ingest cancelled"))?
            .change_context(CliError)?;

        if outcome.is_new {
            new_count += 1;
        }
        if outcome.is_changed {
            changed_count += 1;
        }
        merged_count += outcome.auto_merged_into.len() as u64;
    }

    let mut relationships_staged = 0u64;
    for relationship in batch.relationships {
        let now = OffsetDateTime::now_utc();
        pipeline
            .ingest_relationship(
                StagedRelationship {
                    id: StagedRelationshipId::new(),
                    tenant_id,
                    relationship_type: relationship.relationship_type,
                    from_entity_type: relationship.from_entity_type,
                    from_source_id: relationship.from_source_id,
                    from_integration: relationship.from_integration,
                    from_staged_entity_id: None,
                    to_entity_type: relationship.to_entity_type,
                    to_source_id: relationship.to_source_id,
                    to_integration: relationship.to_integration,
                    to_staged_entity_id: None,
                    criteria_id: None,
                    data: relationship.data,
                    execution_id: relationship.execution_id.clone(),
                    last_seen_execution: relationship.execution_id,
                    created_at: now,
                    updated_at: now,
                    deleted_at: None,
                },
                &cancellation,
            )
            .await
            .ok_or_else(|| error_stack::Report::new(CliError).attach_printable("ingest cancelled"))?
            .change_context(CliError)?;
        relationships_staged += 1;
    }

    let deletion_summary = if args.run_deletion_tick {
        let (scheduled, executed) = pipeline
            .run_deletion_tick(tenant_id, args.deletion_execution_limit)
            .await
            .change_context(CliError)?;
        Some((scheduled, executed))
    } else {
        None
    };

    let summary = serde_json::json!({
        "tenant_id": tenant_id.0,
        "entities_new": new_count,
        "entities_changed": changed_count,
        "auto_merges": merged_count,
        "relationships_staged": relationships_staged,
        "deletion_scheduled": deletion_summary.map(|(s, _)| s),
        "deletion_executed": deletion_summary.map(|(_, e)| e),
        "events": publisher.events(),
    });
    println!("{}", serde_json::to_string_pretty(&summary).change_context(CliError)?);

    Ok(())
}
