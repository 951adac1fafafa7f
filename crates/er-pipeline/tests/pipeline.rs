//! End-to-end wiring tests (spec §8): these exercise `Pipeline` itself rather
//! than any one component, so they cover the scenarios that depend on the
//! shard executor and on the staging → matching → merging → events chain
//! running together. Scenarios 1, 2, 6, 7 are covered as pure-function unit
//! tests next to `Value::deep_merge` and the match engine; scenario 3 next to
//! the deletion controller.

use er_events::RecordingEventPublisher;
use er_memory_store::InMemoryStore;
use er_pipeline::Pipeline;
use er_store::{EntityClusterStore, MergedEntityStore, RelationshipClusterStore};
use er_types::ids::{MatchRuleId, MergedEntityId, StagedRelationshipId, TenantId};
use er_types::match_types::{
    ArrayHandling, MatchCondition, MatchEngineConfig, MatchFieldMapping, MatchRule, MatchType, Normalizer,
};
use er_types::merged::MergedEntity;
use er_types::staged::{StagedRelationship, UpsertStagedEntityRequest};
use er_types::value::Value;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

fn request(tenant_id: TenantId, entity_type: &str, source_id: &str, integration: &str, data: Value) -> UpsertStagedEntityRequest {
    UpsertStagedEntityRequest {
        tenant_id,
        config_id: "cfg-1".into(),
        entity_type: entity_type.into(),
        source_id: source_id.into(),
        integration: integration.into(),
        source_key: "contacts".into(),
        execution_id: "exec-1".into(),
        data,
    }
}

/// Scenario 4: 10 concurrent upserts to the same source identity report
/// `is_new=true` exactly once, and the final payload is the union of every
/// field written.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_upsert_race_resolves_to_single_new_and_union_payload() {
    let store = InMemoryStore::default();
    let publisher = RecordingEventPublisher::new();
    let pipeline = Pipeline::new(&store, &publisher, MatchEngineConfig::default());
    let tenant_id = TenantId::new();
    let cancellation = CancellationToken::new();

    let mut handles = Vec::new();
    for i in 0..10 {
        let req = request(
            tenant_id,
            "person",
            "p1",
            "crm",
            Value::Object(
                [(format!("field_{i}"), Value::from(i as f64))]
                    .into_iter()
                    .collect(),
            ),
        );
        handles.push(async { pipeline.ingest_entity(req, &cancellation).await });
    }
    let results = futures::future::join_all(handles).await;

    let new_count = results
        .iter()
        .filter(|r| r.as_ref().expect("not cancelled").as_ref().expect("no error").is_new)
        .count();
    assert_eq!(new_count, 1);

    let final_id = results[0].as_ref().unwrap().as_ref().unwrap().staged.id;
    let final_entity = er_store::StagedEntityStore::get_by_id(&store, tenant_id, final_id)
        .await
        .expect("query")
        .expect("present");
    let Value::Object(data) = &final_entity.data else { panic!("expected object") };
    assert_eq!(data.len(), 10);
    for i in 0..10 {
        assert_eq!(data.get(&format!("field_{i}")).and_then(Value::as_f64), Some(i as f64));
    }
}

/// An exact match on a shared identifier auto-merges two staged entities and
/// publishes the resulting golden-record event — the full chain from staging
/// through match indexing, candidate scoring, merge, to event emission.
#[tokio::test]
async fn exact_match_auto_merges_and_publishes_event() {
    let store = InMemoryStore::default();
    let publisher = RecordingEventPublisher::new();
    let tenant_id = TenantId::new();

    store.set_match_field_mappings(
        tenant_id,
        "person",
        vec![MatchFieldMapping {
            tenant_id,
            entity_type: "person".into(),
            source_path: "ssn".into(),
            target_column: "ssn".into(),
            normalizer: Normalizer::Raw,
            array_handling: ArrayHandling::First,
            array_filter: None,
            include_phonetic: false,
            include_trigram: false,
        }],
    );
    store.set_match_rules(
        tenant_id,
        "person",
        vec![MatchRule {
            id: MatchRuleId::new(),
            tenant_id,
            entity_type: "person".into(),
            name: "ssn_exact".into(),
            priority: 1,
            is_active: true,
            score_weight: 1.0,
            conditions: vec![MatchCondition {
                field: "ssn".into(),
                match_type: MatchType::Exact,
                weight: 1.0,
                required: false,
                threshold: None,
                case_sensitive: true,
                date_range_days: None,
                normalizer: Normalizer::Raw,
                no_merge: false,
                invert: false,
            }],
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }],
    );

    let pipeline = Pipeline::new(&store, &publisher, MatchEngineConfig::default());
    let cancellation = CancellationToken::new();

    let a = pipeline
        .ingest_entity(request(tenant_id, "person", "a", "crm", Value::Object([("ssn".to_owned(), Value::from("123-45-6789"))].into_iter().collect())), &cancellation)
        .await
        .expect("not cancelled")
        .expect("no error");
    assert!(a.auto_merged_into.is_empty());

    let b = pipeline
        .ingest_entity(request(tenant_id, "person", "b", "erp", Value::Object([("ssn".to_owned(), Value::from("123-45-6789"))].into_iter().collect())), &cancellation)
        .await
        .expect("not cancelled")
        .expect("no error");
    assert_eq!(b.auto_merged_into.len(), 1);

    let merged_id = b.auto_merged_into[0];
    let merged = MergedEntityStore::get(&store, tenant_id, merged_id)
        .await
        .expect("get")
        .expect("present");
    assert_eq!(merged.source_count, 2);

    assert!(!publisher.events().is_empty());
}

/// Scenario 5: a relationship arriving before both endpoints are clustered
/// stays unmaterialized; once both ends are clustered the golden edge appears.
#[tokio::test]
async fn out_of_order_relationship_materializes_once_both_ends_are_clustered() {
    let store = InMemoryStore::default();
    let publisher = RecordingEventPublisher::new();
    let tenant_id = TenantId::new();
    let pipeline = Pipeline::new(&store, &publisher, MatchEngineConfig::default());
    let cancellation = CancellationToken::new();

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

    let staged = pipeline
        .ingest_relationship(relationship, &cancellation)
        .await
        .expect("not cancelled")
        .expect("no error");
    assert!(!staged.both_ends_resolved());

    let alice = pipeline
        .ingest_entity(request(tenant_id, "person", "alice", "crm", Value::Null), &cancellation)
        .await
        .expect("not cancelled")
        .expect("no error");
    seed_singleton_cluster(&store, tenant_id, "person", alice.staged.id).await;

    let acme = pipeline
        .ingest_entity(request(tenant_id, "company", "acme", "crm", Value::Null), &cancellation)
        .await
        .expect("not cancelled")
        .expect("no error");
    seed_singleton_cluster(&store, tenant_id, "company", acme.staged.id).await;

    let resolved = pipeline
        .ingest_relationship(staged, &cancellation)
        .await
        .expect("not cancelled")
        .expect("no error");
    assert!(resolved.both_ends_resolved());

    let cluster = RelationshipClusterStore::get_for_staged(&store, tenant_id, resolved.id)
        .await
        .expect("query")
        .expect("golden edge materialized");
    let edge = er_store::MergedRelationshipStore::get(&store, tenant_id, cluster.merged_relationship_id)
        .await
        .expect("query")
        .expect("present");
    assert_eq!(edge.relationship_type, "works_at");
}

async fn seed_singleton_cluster(store: &InMemoryStore, tenant_id: TenantId, entity_type: &str, staged_entity_id: er_types::ids::StagedEntityId) {
    let now = OffsetDateTime::now_utc();
    let merged = MergedEntity {
        id: MergedEntityId::new(),
        tenant_id,
        entity_type: entity_type.into(),
        data: Value::Null,
        source_count: 1,
        primary_source_id: Some(staged_entity_id),
        version: 1,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    };
    let merged = MergedEntityStore::insert(store, merged).await.expect("insert merged");
    EntityClusterStore::add_member(store, tenant_id, merged.id, staged_entity_id, true)
        .await
        .expect("add member");
}
