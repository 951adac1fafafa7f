use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::ids::{MatchRuleId, StagedEntityId, TenantId};
use crate::value::Value;

/// Normalizer applied to an extracted field value (spec §4.2 step 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalizer {
    Lowercase,
    Trim,
    NormalizePhone,
    NormalizeEmail,
    Raw,
}

impl Normalizer {
    #[must_use]
    pub fn apply(self, input: &str) -> String {
        match self {
            Self::Lowercase => input.to_lowercase(),
            Self::Trim => input.trim().to_owned(),
            Self::NormalizePhone => input.chars().filter(char::is_ascii_digit).collect(),
            Self::NormalizeEmail => input.trim().to_lowercase(),
            Self::Raw => input.to_owned(),
        }
    }
}

/// How an array-valued extraction is collapsed into indexable values (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrayHandling {
    First,
    Last,
    Join,
    Filter,
}

/// Tenant configuration describing how one field of an entity type is
/// extracted and indexed (spec §4.2 step 1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchFieldMapping {
    pub tenant_id: TenantId,
    pub entity_type: String,
    pub source_path: String,
    pub target_column: String,
    pub normalizer: Normalizer,
    pub array_handling: ArrayHandling,
    pub array_filter: Option<String>,
    pub include_phonetic: bool,
    pub include_trigram: bool,
}

/// The algorithm an indexed field/condition is evaluated with (spec §3,
/// `EntityMatchField.match_type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Exact,
    Fuzzy,
    Phonetic,
    Numeric,
    DateRange,
}

impl MatchType {
    /// Candidate-generation usefulness ordering (spec §4.3 step 3).
    #[must_use]
    pub const fn precedence(self) -> u32 {
        match self {
            Self::Exact => 500,
            Self::Phonetic => 400,
            Self::Numeric => 300,
            Self::DateRange => 200,
            Self::Fuzzy => 100,
        }
    }
}

/// One extracted, normalized value for a staged entity (spec §3,
/// `EntityMatchField`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityMatchField {
    pub tenant_id: TenantId,
    pub entity_type: String,
    pub staged_entity_id: StagedEntityId,
    pub field: String,
    pub match_type: MatchType,
    pub normalizer: Normalizer,
    pub value_text: Option<String>,
    pub value_num: Option<f64>,
    pub value_ts: Option<OffsetDateTime>,
    pub token: Option<String>,
}

impl EntityMatchField {
    #[must_use]
    pub fn key(&self) -> (String, MatchType, Normalizer) {
        (self.field.clone(), self.match_type, self.normalizer)
    }
}

/// One weighted, ordered condition inside a `MatchRule` (spec §3,
/// `MatchCondition`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCondition {
    pub field: String,
    pub match_type: MatchType,
    pub weight: f64,
    pub required: bool,
    pub threshold: Option<f64>,
    pub case_sensitive: bool,
    pub date_range_days: Option<i64>,
    pub normalizer: Normalizer,
    pub no_merge: bool,
    pub invert: bool,
}

impl MatchCondition {
    /// Default fuzzy/trigram acceptance threshold (spec §4.3 step 3, 6).
    pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.7;

    #[must_use]
    pub fn effective_threshold(&self) -> f64 {
        self.threshold.unwrap_or(Self::DEFAULT_FUZZY_THRESHOLD)
    }
}

/// Tenant-defined scoring rule for an entity type (spec §3, `MatchRule`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRule {
    pub id: MatchRuleId,
    pub tenant_id: TenantId,
    pub entity_type: String,
    pub name: String,
    pub priority: i32,
    pub is_active: bool,
    pub score_weight: f64,
    pub conditions: Vec<MatchCondition>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// A scored candidate pair, produced and persisted by the match engine
/// (spec §4.3 steps 6–8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    pub candidate_staged_entity_id: StagedEntityId,
    pub score: f64,
    pub rules_matched: Vec<String>,
    pub auto_merge: bool,
    pub no_merge: bool,
}

/// Persisted status of a `match_candidates` row (spec §4.3 side effect).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchCandidateStatus {
    Pending,
    AutoMerged,
    Approved,
    Rejected,
    Deferred,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCandidateRecord {
    pub tenant_id: TenantId,
    pub source_staged_entity_id: StagedEntityId,
    pub candidate_staged_entity_id: StagedEntityId,
    pub score: f64,
    pub status: MatchCandidateStatus,
    pub rules_matched: Vec<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Tunable thresholds for the match engine (spec §4.3), surfaced as tenant
/// configuration with the spec's documented defaults.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MatchEngineConfig {
    pub min_match_score: f64,
    pub auto_merge_threshold: f64,
    pub max_candidates: usize,
    pub candidate_soft_cap_required: usize,
    pub candidate_soft_cap_unrequired: usize,
    pub candidate_hard_cap: usize,
}

impl Default for MatchEngineConfig {
    fn default() -> Self {
        Self {
            min_match_score: 0.5,
            auto_merge_threshold: 0.95,
            max_candidates: 100,
            candidate_soft_cap_required: 50,
            candidate_soft_cap_unrequired: 500,
            candidate_hard_cap: 5000,
        }
    }
}
