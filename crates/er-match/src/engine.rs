//! Rule-based candidate discovery and scoring (spec §4.3).

use std::collections::BTreeMap;

use er_store::{MatchCandidateStore, MatchFieldStore, MatchRuleStore};
use er_types::error::MatchError;
use er_types::ids::{StagedEntityId, TenantId};
use er_types::match_types::{
    EntityMatchField, MatchCandidateRecord, MatchCandidateStatus, MatchCondition,
    MatchEngineConfig, MatchResult, MatchRule, MatchType, Normalizer,
};
use error_stack::{Result, ResultExt};
use time::OffsetDateTime;

use crate::similarity::similarity;

pub struct MatchEngine<'s, S> {
    store: &'s S,
    config: MatchEngineConfig,
}

impl<'s, S> MatchEngine<'s, S>
where
    S: MatchFieldStore + MatchRuleStore + MatchCandidateStore,
{
    #[must_use]
    pub fn new(store: &'s S, config: MatchEngineConfig) -> Self {
        Self { store, config }
    }

    /// Runs candidate discovery and scoring for `source_id`, persisting the
    /// resulting candidate pairs, and returns the ranked results (spec §4.3
    /// steps 1-8 plus the `match_candidates` side effect).
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn run(
        &self,
        tenant_id: TenantId,
        entity_type: &str,
        source_id: StagedEntityId,
    ) -> Result<Vec<MatchResult>, MatchError> {
        let source_fields = self
            .store
            .fields_for_entity(tenant_id, source_id)
            .await
            .change_context(MatchError)?;
        let source_index = index_fields(&source_fields);

        let mut rules = self
            .store
            .active_rules(tenant_id, entity_type)
            .await
            .change_context(MatchError)?;
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));

        let candidate_ids = self
            .generate_candidates(tenant_id, entity_type, source_id, &source_index, &rules)
            .await?;

        if candidate_ids.is_empty() {
            return Ok(Vec::new());
        }

        let candidate_fields = self
            .store
            .fields_for_entities(tenant_id, &candidate_ids)
            .await
            .change_context(MatchError)?;
        let mut by_candidate: BTreeMap<StagedEntityId, Vec<EntityMatchField>> = BTreeMap::new();
        for field in candidate_fields {
            by_candidate.entry(field.staged_entity_id).or_default().push(field);
        }

        let mut results = Vec::new();
        for candidate_id in &candidate_ids {
            let Some(fields) = by_candidate.get(candidate_id) else {
                continue;
            };
            let candidate_index = index_fields(fields);
            if let Some(result) = score_candidate(*candidate_id, &source_index, &candidate_index, &rules) {
                results.push(result);
            }
        }

        results.retain(|r| r.score >= self.config.min_match_score);
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(self.config.max_candidates);

        let now = OffsetDateTime::now_utc();
        for result in &mut results {
            result.auto_merge = result.score >= self.config.auto_merge_threshold && !result.no_merge;
            let status = if result.auto_merge {
                MatchCandidateStatus::AutoMerged
            } else {
                MatchCandidateStatus::Pending
            };
            self.store
                .upsert_if_higher(MatchCandidateRecord {
                    tenant_id,
                    source_staged_entity_id: source_id,
                    candidate_staged_entity_id: result.candidate_staged_entity_id,
                    score: result.score,
                    status,
                    rules_matched: result.rules_matched.clone(),
                    created_at: now,
                    updated_at: now,
                })
                .await
                .change_context(MatchError)?;
        }

        Ok(results)
    }

    async fn generate_candidates(
        &self,
        tenant_id: TenantId,
        entity_type: &str,
        source_id: StagedEntityId,
        source_index: &BTreeMap<(String, MatchType, Normalizer), &EntityMatchField>,
        rules: &[MatchRule],
    ) -> Result<Vec<StagedEntityId>, MatchError> {
        let mut conditions: Vec<&MatchCondition> = rules.iter().flat_map(|r| r.conditions.iter()).collect();
        conditions.sort_by(|a, b| {
            b.required
                .cmp(&a.required)
                .then_with(|| b.match_type.precedence().cmp(&a.match_type.precedence()))
        });

        let mut seen = std::collections::BTreeSet::new();
        let mut candidates = Vec::new();
        for condition in conditions {
            if candidates.len() >= self.config.candidate_hard_cap {
                break;
            }
            let Some(field) = source_index.get(&(condition.field.clone(), condition.match_type, condition.normalizer)) else {
                continue;
            };

            let limit = self.config.candidate_hard_cap - candidates.len();
            let found = match condition.match_type {
                MatchType::Exact | MatchType::Phonetic => {
                    let value = field
                        .value_text
                        .clone()
                        .or_else(|| field.token.clone())
                        .unwrap_or_default();
                    self.store
                        .candidate_ids_exact_or_phonetic(
                            tenant_id,
                            entity_type,
                            source_id,
                            &condition.field,
                            &value,
                            limit,
                        )
                        .await
                        .change_context(MatchError)?
                }
                MatchType::Numeric | MatchType::DateRange => {
                    let Some(value) = field.value_num else { continue };
                    let window = condition.date_range_days.map_or(0.0, |d| d as f64);
                    self.store
                        .candidate_ids_in_range(
                            tenant_id,
                            entity_type,
                            source_id,
                            &condition.field,
                            value - window,
                            value + window,
                            limit,
                        )
                        .await
                        .change_context(MatchError)?
                }
                MatchType::Fuzzy => self
                    .store
                    .candidate_ids_with_fuzzy_field(tenant_id, entity_type, source_id, &condition.field, limit)
                    .await
                    .change_context(MatchError)?,
            };

            for id in found {
                if seen.insert(id) {
                    candidates.push(id);
                }
            }

            let threshold = if condition.required {
                self.config.candidate_soft_cap_required
            } else {
                self.config.candidate_soft_cap_unrequired
            };
            if candidates.len() >= threshold {
                break;
            }
        }
        Ok(candidates)
    }
}

fn index_fields(fields: &[EntityMatchField]) -> BTreeMap<(String, MatchType, Normalizer), &EntityMatchField> {
    fields.iter().map(|f| (f.key(), f)).collect()
}

fn score_candidate(
    candidate_id: StagedEntityId,
    source_index: &BTreeMap<(String, MatchType, Normalizer), &EntityMatchField>,
    candidate_index: &BTreeMap<(String, MatchType, Normalizer), &EntityMatchField>,
    rules: &[MatchRule],
) -> Option<MatchResult> {
    let mut best_score = f64::MIN;
    let mut rules_matched = Vec::new();
    let mut no_merge = false;

    for rule in rules {
        let mut weight_sum = 0.0;
        let mut contribution_sum = 0.0;
        let mut required_failed = false;

        for condition in &rule.conditions {
            let key = (condition.field.clone(), condition.match_type, condition.normalizer);
            let Some(source_field) = source_index.get(&key) else {
                if condition.required {
                    required_failed = true;
                }
                continue;
            };
            let Some(candidate_field) = candidate_index.get(&key) else {
                if condition.required {
                    required_failed = true;
                }
                continue;
            };

            let (mut passed, contribution) = evaluate(condition, source_field, candidate_field);
            if condition.invert {
                passed = !passed;
            }
            if passed && condition.no_merge {
                no_merge = true;
            }
            if condition.required && !passed {
                required_failed = true;
            }
            weight_sum += condition.weight;
            if passed {
                contribution_sum += contribution;
            }
        }

        if required_failed || weight_sum == 0.0 {
            continue;
        }
        let rule_score = (contribution_sum / weight_sum) * rule.score_weight;
        if rule_score > best_score {
            best_score = rule_score;
        }
        rules_matched.push(rule.name.clone());
    }

    if rules_matched.is_empty() {
        return None;
    }

    Some(MatchResult {
        candidate_staged_entity_id: candidate_id,
        score: best_score.max(0.0),
        rules_matched,
        auto_merge: false,
        no_merge,
    })
}

/// Returns `(passed, contribution)` for one condition against one candidate.
fn evaluate(
    condition: &MatchCondition,
    source: &EntityMatchField,
    candidate: &EntityMatchField,
) -> (bool, f64) {
    match condition.match_type {
        MatchType::Exact => {
            let equal = source.value_text == candidate.value_text && source.value_text.is_some();
            (equal, if equal { condition.weight } else { 0.0 })
        }
        MatchType::Phonetic => {
            let equal = source.token == candidate.token && source.token.is_some();
            (equal, if equal { condition.weight } else { 0.0 })
        }
        MatchType::Fuzzy => {
            let (Some(a), Some(b)) = (&source.value_text, &candidate.value_text) else {
                return (false, 0.0);
            };
            let sim = similarity(a, b);
            let passed = sim >= condition.effective_threshold();
            (passed, if passed { sim * condition.weight } else { 0.0 })
        }
        MatchType::Numeric | MatchType::DateRange => {
            let (Some(a), Some(b)) = (source.value_num, candidate.value_num) else {
                return (false, 0.0);
            };
            let within = match condition.date_range_days {
                Some(days) => (a - b).abs() <= days as f64,
                None => (a - b).abs() < f64::EPSILON,
            };
            (within, if within { condition.weight } else { 0.0 })
        }
    }
}

#[cfg(test)]
mod tests {
    use er_types::ids::MatchRuleId;
    use er_types::match_types::{Normalizer, MatchCondition};

    use super::*;

    fn field(field: &str, match_type: MatchType, text: Option<&str>) -> EntityMatchField {
        EntityMatchField {
            tenant_id: TenantId::new(),
            entity_type: "person".to_owned(),
            staged_entity_id: StagedEntityId::new(),
            field: field.to_owned(),
            match_type,
            normalizer: Normalizer::Lowercase,
            value_text: text.map(str::to_owned),
            value_num: None,
            value_ts: None,
            token: None,
        }
    }

    fn fuzzy_rule(weight: f64, threshold: f64, score_weight: f64) -> MatchRule {
        MatchRule {
            id: MatchRuleId::new(),
            tenant_id: TenantId::new(),
            entity_type: "person".to_owned(),
            name: "last_name_fuzzy".to_owned(),
            priority: 1,
            is_active: true,
            score_weight,
            conditions: vec![MatchCondition {
                field: "last_name".to_owned(),
                match_type: MatchType::Fuzzy,
                weight,
                required: false,
                threshold: Some(threshold),
                case_sensitive: false,
                date_range_days: None,
                normalizer: Normalizer::Lowercase,
                no_merge: false,
                invert: false,
            }],
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn fuzzy_match_scores_by_similarity_above_threshold() {
        let smith = field("last_name", MatchType::Fuzzy, Some("smith"));
        let smyth = field("last_name", MatchType::Fuzzy, Some("smyth"));
        let source_index = index_fields(std::slice::from_ref(&smith));
        let candidate_index = index_fields(std::slice::from_ref(&smyth));
        let rules = vec![fuzzy_rule(1.0, 0.8, 1.0)];

        let result = score_candidate(smyth.staged_entity_id, &source_index, &candidate_index, &rules);
        let result = result.expect("expected a match above threshold");
        assert!((result.score - similarity("smith", "smyth")).abs() < 1e-9);
    }

    #[test]
    fn no_merge_condition_blocks_auto_merge_flag_but_not_match() {
        let a = field("ssn", MatchType::Exact, Some("123"));
        let b = field("ssn", MatchType::Exact, Some("123"));
        let source_index = index_fields(std::slice::from_ref(&a));
        let candidate_index = index_fields(std::slice::from_ref(&b));
        let mut rule = fuzzy_rule(1.0, 0.8, 1.0);
        rule.conditions = vec![MatchCondition {
            field: "ssn".to_owned(),
            match_type: MatchType::Exact,
            weight: 1.0,
            required: false,
            threshold: None,
            case_sensitive: true,
            date_range_days: None,
            normalizer: Normalizer::Raw,
            no_merge: true,
            invert: false,
        }];
        let result = score_candidate(b.staged_entity_id, &source_index, &candidate_index, &[rule]).unwrap();
        assert!(result.no_merge);
    }
}
