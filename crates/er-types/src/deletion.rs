use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::ids::{DeletionStrategyId, PendingDeletionId, StagedEntityId, TenantId};

/// Which side of `entity_type XOR relationship_type` a `DeletionStrategy`
/// applies to (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DeletionScopeType {
    EntityType(String),
    RelationshipType(String),
}

/// Boolean combinator for `composite` strategies (spec §4.6 step 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositeOperator {
    And,
    Or,
}

/// Per-strategy-type configuration. This is the "discriminator form" the
/// open question in spec §9 asks us to pick; the legacy scalar schema
/// (`grace_period_hours`/`retention_days` as bare fields) is not implemented —
/// grace period lives inside `ExecutionBased` instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "strategy_type", rename_all = "snake_case")]
pub enum StrategyConfig {
    Explicit,
    ExecutionBased {
        #[serde(with = "time::serde::rfc3339::option")]
        grace_period: Option<OffsetDateTime>,
        grace_period_seconds: i64,
    },
    Staleness {
        check_field: String,
        max_age_days: i64,
    },
    Retention {
        check_field: String,
        retention_days: i64,
    },
    Composite {
        operator: CompositeOperator,
        strategies: Vec<StrategyConfig>,
    },
}

impl StrategyConfig {
    #[must_use]
    pub fn default_staleness() -> Self {
        Self::Staleness {
            check_field: "updated_at".to_owned(),
            max_age_days: 90,
        }
    }

    #[must_use]
    pub fn default_retention() -> Self {
        Self::Retention {
            check_field: "created_at".to_owned(),
            retention_days: 365,
        }
    }

    #[must_use]
    pub fn grace_period(&self) -> Duration {
        match self {
            Self::ExecutionBased {
                grace_period_seconds,
                ..
            } => Duration::seconds(*grace_period_seconds),
            _ => Duration::ZERO,
        }
    }
}

/// Tenant-configured deletion policy (spec §3, `DeletionStrategy`). Selection
/// is hierarchical: `(integration, source_key) > (integration, None) >
/// (None, None)`; within matches, higher `priority` wins, ties broken by
/// earliest `created_at` (spec §3, §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionStrategy {
    pub id: DeletionStrategyId,
    pub tenant_id: TenantId,
    pub scope: DeletionScopeType,
    pub integration: Option<String>,
    pub source_key: Option<String>,
    pub config: StrategyConfig,
    pub priority: i32,
    pub enabled: bool,
    pub created_at: OffsetDateTime,
}

impl DeletionStrategy {
    /// Specificity rank used by the hierarchical selection query (spec §9):
    /// `(integration, source_key)` is most specific, `(None, None)` least.
    #[must_use]
    pub fn specificity(&self) -> u8 {
        match (&self.integration, &self.source_key) {
            (Some(_), Some(_)) => 2,
            (Some(_), None) => 1,
            (None, _) => 0,
        }
    }

    #[must_use]
    pub fn matches(&self, integration: &str, source_key: &str) -> bool {
        let integration_ok = self
            .integration
            .as_deref()
            .map_or(true, |i| i == integration);
        let source_key_ok = self
            .source_key
            .as_deref()
            .map_or(true, |k| k == source_key);
        integration_ok && source_key_ok
    }
}

/// Scheduled soft-delete of a staged entity (spec §3, `PendingDeletion`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingDeletion {
    pub id: PendingDeletionId,
    pub tenant_id: TenantId,
    pub staged_entity_id: StagedEntityId,
    pub scheduled_for: OffsetDateTime,
    pub executed_at: Option<OffsetDateTime>,
    pub cancelled: bool,
    pub cancelled_reason: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl PendingDeletion {
    #[must_use]
    pub fn is_due(&self, now: OffsetDateTime) -> bool {
        !self.cancelled && self.executed_at.is_none() && self.scheduled_for <= now
    }
}

/// One observed `(tenant, plan, entity_type, execution_id)` (spec §3,
/// `ExecutionTracking`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionTracking {
    pub tenant_id: TenantId,
    pub plan_id: String,
    pub entity_type: String,
    pub execution_id: String,
    pub started_at: OffsetDateTime,
    pub completed_at: Option<OffsetDateTime>,
    pub entity_count: u64,
    pub processed_at: Option<OffsetDateTime>,
}

impl ExecutionTracking {
    #[must_use]
    pub fn is_unprocessed(&self) -> bool {
        self.completed_at.is_some() && self.processed_at.is_none()
    }
}
