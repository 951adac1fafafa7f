//! Cluster bookkeeping and golden-record recomputation (spec §4.4).

use std::collections::BTreeMap;

use er_store::{EntityClusterStore, MergeAuditStore, MergeStrategyStore, MergedEntityStore, StagedEntityStore};
use er_types::error::MergeError;
use er_types::ids::{MergedEntityId, StagedEntityId, TenantId};
use er_types::merged::{FieldValueObservation, MergeAuditEntry, MergedEntity};
use er_types::value::Value;
use error_stack::{Result, ResultExt};
use time::OffsetDateTime;

use crate::field_strategy::resolve_field;

pub struct MergeEngine<'s, S> {
    store: &'s S,
}

impl<'s, S> MergeEngine<'s, S>
where
    S: MergedEntityStore + EntityClusterStore + MergeStrategyStore + MergeAuditStore + StagedEntityStore,
{
    #[must_use]
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    /// `Merge(tenant, a, b)` (spec §4.4). Returns the surviving
    /// [`MergedEntityId`].
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn merge(
        &self,
        tenant_id: TenantId,
        entity_type: &str,
        a: StagedEntityId,
        b: StagedEntityId,
    ) -> Result<MergedEntityId, MergeError> {
        let ca = self.ensure_cluster(tenant_id, entity_type, a).await?;
        let cb = self.ensure_cluster(tenant_id, entity_type, b).await?;

        if ca == cb {
            self.recompute(tenant_id, entity_type, ca).await?;
            return Ok(ca);
        }

        let merged_a = MergedEntityStore::get(self.store, tenant_id, ca)
            .await
            .change_context(MergeError)?
            .ok_or_else(|| error_stack::Report::new(MergeError).attach_printable("cluster a missing"))?;
        let merged_b = MergedEntityStore::get(self.store, tenant_id, cb)
            .await
            .change_context(MergeError)?
            .ok_or_else(|| error_stack::Report::new(MergeError).attach_printable("cluster b missing"))?;

        let (survivor, loser) = pick_survivor(&merged_a, &merged_b);

        self.store
            .reparent(tenant_id, loser, survivor)
            .await
            .change_context(MergeError)?;
        self.store
            .soft_delete(tenant_id, loser)
            .await
            .change_context(MergeError)?;

        self.recompute(tenant_id, entity_type, survivor).await?;
        Ok(survivor)
    }

    /// `ApplyUpsert(tenant, staged_entity)` (spec §4.4): if already clustered,
    /// recompute the merged entity's data and bump `version`.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn apply_upsert(
        &self,
        tenant_id: TenantId,
        entity_type: &str,
        staged_entity_id: StagedEntityId,
    ) -> Result<Option<MergedEntityId>, MergeError> {
        let Some(cluster) = self
            .store
            .active_cluster_for(tenant_id, staged_entity_id)
            .await
            .change_context(MergeError)?
        else {
            return Ok(None);
        };
        self.recompute(tenant_id, entity_type, cluster.merged_entity_id).await?;
        Ok(Some(cluster.merged_entity_id))
    }

    async fn ensure_cluster(
        &self,
        tenant_id: TenantId,
        entity_type: &str,
        staged_entity_id: StagedEntityId,
    ) -> Result<MergedEntityId, MergeError> {
        if let Some(cluster) = self
            .store
            .active_cluster_for(tenant_id, staged_entity_id)
            .await
            .change_context(MergeError)?
        {
            return Ok(cluster.merged_entity_id);
        }

        let staged = self
            .store
            .get_by_id(tenant_id, staged_entity_id)
            .await
            .change_context(MergeError)?
            .ok_or_else(|| error_stack::Report::new(MergeError).attach_printable("staged entity not found"))?;

        let now = OffsetDateTime::now_utc();
        let merged = MergedEntity {
            id: MergedEntityId::new(),
            tenant_id,
            entity_type: entity_type.to_owned(),
            data: staged.data,
            source_count: 1,
            primary_source_id: Some(staged_entity_id),
            version: 1,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        let merged = self.store.insert(merged).await.change_context(MergeError)?;
        self.store
            .add_member(tenant_id, merged.id, staged_entity_id, true)
            .await
            .change_context(MergeError)?;
        Ok(merged.id)
    }

    async fn recompute(
        &self,
        tenant_id: TenantId,
        entity_type: &str,
        merged_entity_id: MergedEntityId,
    ) -> Result<(), MergeError> {
        let members = self
            .store
            .active_members(tenant_id, merged_entity_id)
            .await
            .change_context(MergeError)?;

        let mut observations: BTreeMap<String, Vec<FieldValueObservation>> = BTreeMap::new();
        let mut primary_source_id = None;
        for member in &members {
            let Some(staged) = self
                .store
                .get_by_id(tenant_id, member.staged_entity_id)
                .await
                .change_context(MergeError)?
            else {
                continue;
            };
            if member.is_primary {
                primary_source_id = Some(member.staged_entity_id);
            }
            if let Value::Object(map) = &staged.data {
                for (field, value) in map {
                    observations.entry(field.clone()).or_default().push(FieldValueObservation {
                        value: value.clone(),
                        updated_at: staged.updated_at,
                        integration: staged.integration.clone(),
                        source_entity_id: staged.id,
                    });
                }
            }
        }

        let strategy_config = MergeStrategyStore::get(self.store, tenant_id, entity_type)
            .await
            .change_context(MergeError)?;

        let mut data = BTreeMap::new();
        let mut conflicts = Vec::new();
        for (field, field_observations) in &observations {
            let strategy = strategy_config
                .field_strategies
                .get(field)
                .cloned()
                .unwrap_or(er_types::merged::MergeStrategy::PreferNonEmpty);
            let (value, conflict) = resolve_field(field, field_observations, &strategy, &strategy_config);
            data.insert(field.clone(), value);
            if let Some(conflict) = conflict {
                conflicts.push(conflict);
            }
        }

        let existing = MergedEntityStore::get(self.store, tenant_id, merged_entity_id)
            .await
            .change_context(MergeError)?
            .ok_or_else(|| error_stack::Report::new(MergeError).attach_printable("merged entity missing"))?;

        let updated = MergedEntity {
            id: merged_entity_id,
            tenant_id,
            entity_type: entity_type.to_owned(),
            data: Value::Object(data),
            source_count: members.len() as u32,
            primary_source_id: primary_source_id.or(existing.primary_source_id),
            version: existing.version,
            created_at: existing.created_at,
            updated_at: existing.updated_at,
            deleted_at: None,
        };
        let updated = self.store.update(updated).await.change_context(MergeError)?;

        if !conflicts.is_empty() {
            self.store
                .append(MergeAuditEntry {
                    tenant_id,
                    merged_entity_id,
                    version: updated.version,
                    conflicts,
                    created_at: OffsetDateTime::now_utc(),
                })
                .await
                .change_context(MergeError)?;
        }

        Ok(())
    }
}

/// `(higher source_count, older created_at)` wins (spec §4.4).
fn pick_survivor(a: &MergedEntity, b: &MergedEntity) -> (MergedEntityId, MergedEntityId) {
    let a_wins = match a.source_count.cmp(&b.source_count) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => a.created_at <= b.created_at,
    };
    if a_wins {
        (a.id, b.id)
    } else {
        (b.id, a.id)
    }
}

#[cfg(test)]
mod tests {
    use er_memory_store::InMemoryStore;
    use er_store::StagedEntityStore;
    use er_types::ids::TenantId;
    use er_types::staged::UpsertStagedEntityRequest;

    use super::*;

    async fn stage(store: &InMemoryStore, tenant_id: TenantId, source_id: &str, integration: &str, data: Value) -> StagedEntityId {
        let outcome = store
            .upsert(UpsertStagedEntityRequest {
                tenant_id,
                config_id: "cfg-1".into(),
                entity_type: "person".into(),
                source_id: source_id.into(),
                integration: integration.into(),
                source_key: "k".into(),
                execution_id: "exec-1".into(),
                data,
            })
            .await
            .expect("upsert");
        outcome.entity.id
    }

    #[tokio::test]
    async fn merging_two_singletons_unions_fields_and_soft_deletes_loser() {
        let store = InMemoryStore::default();
        let tenant_id = TenantId::new();
        let a = stage(
            &store,
            tenant_id,
            "a",
            "crm",
            Value::Object(BTreeMap::from([("name".to_owned(), Value::from("Alice"))])),
        )
        .await;
        let b = stage(
            &store,
            tenant_id,
            "b",
            "erp",
            Value::Object(BTreeMap::from([("email".to_owned(), Value::from("alice@example.com"))])),
        )
        .await;

        let engine = MergeEngine::new(&store);
        let survivor = engine.merge(tenant_id, "person", a, b).await.expect("merge");

        let merged = MergedEntityStore::get(&store, tenant_id, survivor).await.expect("get").expect("present");
        assert_eq!(merged.source_count, 2);
        let Value::Object(data) = &merged.data else { panic!("expected object") };
        assert_eq!(data.get("name").and_then(Value::as_str), Some("Alice"));
        assert_eq!(data.get("email").and_then(Value::as_str), Some("alice@example.com"));
    }

    #[tokio::test]
    async fn apply_upsert_recomputes_clustered_entity() {
        let store = InMemoryStore::default();
        let tenant_id = TenantId::new();
        let a = stage(
            &store,
            tenant_id,
            "a",
            "crm",
            Value::Object(BTreeMap::from([("name".to_owned(), Value::from("Alice"))])),
        )
        .await;

        let engine = MergeEngine::new(&store);
        let merged_id = engine.ensure_cluster(tenant_id, "person", a).await.expect("ensure");

        let updated = stage(
            &store,
            tenant_id,
            "a",
            "crm",
            Value::Object(BTreeMap::from([("name".to_owned(), Value::from("Alice B."))])),
        )
        .await;
        assert_eq!(updated, a);

        let result = engine.apply_upsert(tenant_id, "person", a).await.expect("apply_upsert");
        assert_eq!(result, Some(merged_id));

        let merged = MergedEntityStore::get(&store, tenant_id, merged_id).await.expect("get").expect("present");
        let Value::Object(data) = &merged.data else { panic!("expected object") };
        assert_eq!(data.get("name").and_then(Value::as_str), Some("Alice B."));
    }
}
