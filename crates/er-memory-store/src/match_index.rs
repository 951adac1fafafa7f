use async_trait::async_trait;
use er_store::match_index::{MatchCandidateStore, MatchFieldStore, MatchRuleStore};
use er_types::error::{InsertionError, QueryError};
use er_types::ids::{StagedEntityId, TenantId};
use er_types::match_types::{
    EntityMatchField, MatchCandidateRecord, MatchFieldMapping, MatchRule, MatchType,
};
use error_stack::Result;
use time::OffsetDateTime;

use crate::InMemoryStore;

#[async_trait]
impl MatchFieldStore for InMemoryStore {
    async fn mappings_for_type(
        &self,
        tenant_id: TenantId,
        entity_type: &str,
    ) -> Result<Vec<MatchFieldMapping>, QueryError> {
        Ok(self
            .match_field_mappings
            .get(&(tenant_id, entity_type.to_owned()))
            .map(|e| e.clone())
            .unwrap_or_default())
    }

    async fn replace_fields(
        &self,
        tenant_id: TenantId,
        staged_entity_id: StagedEntityId,
        fields: Vec<EntityMatchField>,
    ) -> Result<(), InsertionError> {
        for field in &fields {
            debug_assert_eq!(field.tenant_id, tenant_id);
        }
        self.match_fields.insert(staged_entity_id, fields);
        Ok(())
    }

    async fn fields_for_entity(
        &self,
        _tenant_id: TenantId,
        staged_entity_id: StagedEntityId,
    ) -> Result<Vec<EntityMatchField>, QueryError> {
        Ok(self
            .match_fields
            .get(&staged_entity_id)
            .map(|e| e.clone())
            .unwrap_or_default())
    }

    async fn fields_for_entities(
        &self,
        _tenant_id: TenantId,
        staged_entity_ids: &[StagedEntityId],
    ) -> Result<Vec<EntityMatchField>, QueryError> {
        let mut out = Vec::new();
        for id in staged_entity_ids {
            if let Some(fields) = self.match_fields.get(id) {
                out.extend(fields.value().iter().cloned());
            }
        }
        Ok(out)
    }

    async fn candidate_ids_exact_or_phonetic(
        &self,
        tenant_id: TenantId,
        entity_type: &str,
        source_id: StagedEntityId,
        field: &str,
        value_or_token: &str,
        limit: usize,
    ) -> Result<Vec<StagedEntityId>, QueryError> {
        let mut ids = Vec::new();
        for entry in self.match_fields.iter() {
            let (candidate_id, fields) = entry.pair();
            if *candidate_id == source_id {
                continue;
            }
            let hit = fields.iter().any(|f| {
                f.tenant_id == tenant_id
                    && f.entity_type == entity_type
                    && f.field == field
                    && matches!(f.match_type, MatchType::Exact | MatchType::Phonetic)
                    && (f.value_text.as_deref() == Some(value_or_token)
                        || f.token.as_deref() == Some(value_or_token))
            });
            if hit {
                ids.push(*candidate_id);
                if ids.len() >= limit {
                    break;
                }
            }
        }
        Ok(ids)
    }

    async fn candidate_ids_in_range(
        &self,
        tenant_id: TenantId,
        entity_type: &str,
        source_id: StagedEntityId,
        field: &str,
        low: f64,
        high: f64,
        limit: usize,
    ) -> Result<Vec<StagedEntityId>, QueryError> {
        let mut ids = Vec::new();
        for entry in self.match_fields.iter() {
            let (candidate_id, fields) = entry.pair();
            if *candidate_id == source_id {
                continue;
            }
            let hit = fields.iter().any(|f| {
                f.tenant_id == tenant_id
                    && f.entity_type == entity_type
                    && f.field == field
                    && matches!(f.match_type, MatchType::Numeric | MatchType::DateRange)
                    && f.value_num.is_some_and(|v| v >= low && v <= high)
            });
            if hit {
                ids.push(*candidate_id);
                if ids.len() >= limit {
                    break;
                }
            }
        }
        Ok(ids)
    }

    async fn candidate_ids_with_fuzzy_field(
        &self,
        tenant_id: TenantId,
        entity_type: &str,
        source_id: StagedEntityId,
        field: &str,
        limit: usize,
    ) -> Result<Vec<StagedEntityId>, QueryError> {
        let mut ids = Vec::new();
        for entry in self.match_fields.iter() {
            let (candidate_id, fields) = entry.pair();
            if *candidate_id == source_id {
                continue;
            }
            let hit = fields.iter().any(|f| {
                f.tenant_id == tenant_id
                    && f.entity_type == entity_type
                    && f.field == field
                    && f.match_type == MatchType::Fuzzy
                    && f.value_text.is_some()
            });
            if hit {
                ids.push(*candidate_id);
                if ids.len() >= limit {
                    break;
                }
            }
        }
        Ok(ids)
    }
}

#[async_trait]
impl MatchRuleStore for InMemoryStore {
    async fn active_rules(
        &self,
        tenant_id: TenantId,
        entity_type: &str,
    ) -> Result<Vec<MatchRule>, QueryError> {
        let mut rules = self
            .match_rules
            .get(&(tenant_id, entity_type.to_owned()))
            .map(|e| e.clone())
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.is_active)
            .collect::<Vec<_>>();
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(rules)
    }
}

#[async_trait]
impl MatchCandidateStore for InMemoryStore {
    async fn upsert_if_higher(&self, record: MatchCandidateRecord) -> Result<(), InsertionError> {
        let key = (
            record.tenant_id,
            record.source_staged_entity_id,
            record.candidate_staged_entity_id,
        );
        match self.match_candidates.get(&key).map(|e| e.score) {
            Some(existing_score) if existing_score >= record.score => {}
            _ => {
                self.match_candidates.insert(key, record);
            }
        }
        Ok(())
    }

    async fn get(
        &self,
        tenant_id: TenantId,
        source_staged_entity_id: StagedEntityId,
        candidate_staged_entity_id: StagedEntityId,
    ) -> Result<Option<MatchCandidateRecord>, QueryError> {
        Ok(self
            .match_candidates
            .get(&(tenant_id, source_staged_entity_id, candidate_staged_entity_id))
            .map(|e| e.clone()))
    }
}

#[cfg(test)]
mod tests {
    use er_types::ids::MatchRuleId;

    use super::*;

    fn rule(tenant_id: TenantId, priority: i32, is_active: bool) -> MatchRule {
        MatchRule {
            id: MatchRuleId::new(),
            tenant_id,
            entity_type: "person".to_owned(),
            name: format!("rule-{priority}"),
            priority,
            is_active,
            score_weight: 1.0,
            conditions: Vec::new(),
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn active_rules_sorted_by_priority_descending_and_filtered() {
        let store = InMemoryStore::new();
        let tenant_id = TenantId::new();
        store.set_match_rules(
            tenant_id,
            "person",
            vec![rule(tenant_id, 1, true), rule(tenant_id, 5, true), rule(tenant_id, 3, false)],
        );
        let rules = store.active_rules(tenant_id, "person").await.unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].priority, 5);
        assert_eq!(rules[1].priority, 1);
    }
}
