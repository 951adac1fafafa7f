//! Hierarchical strategy selection (spec §4.6, §9): `(integration,
//! source_key) > (integration, None) > (None, None)`, ties broken by
//! `priority DESC, created_at ASC`.

use er_types::deletion::DeletionStrategy;

/// Picks the single most-specific applicable strategy for `(integration,
/// source_key)` out of every strategy configured for an entity/relationship
/// type. Pure so the ranking is unit-testable independent of any store.
#[must_use]
pub fn select<'s>(
    strategies: &'s [DeletionStrategy],
    integration: &str,
    source_key: &str,
) -> Option<&'s DeletionStrategy> {
    strategies
        .iter()
        .filter(|s| s.enabled && s.matches(integration, source_key))
        .max_by(|a, b| {
            a.specificity()
                .cmp(&b.specificity())
                .then(a.priority.cmp(&b.priority))
                .then(b.created_at.cmp(&a.created_at))
        })
}

#[cfg(test)]
mod tests {
    use er_types::deletion::{DeletionScopeType, StrategyConfig};
    use er_types::ids::{DeletionStrategyId, TenantId};
    use time::OffsetDateTime;

    use super::*;

    fn strategy(integration: Option<&str>, source_key: Option<&str>, priority: i32) -> DeletionStrategy {
        DeletionStrategy {
            id: DeletionStrategyId::new(),
            tenant_id: TenantId::new(),
            scope: DeletionScopeType::EntityType("person".into()),
            integration: integration.map(str::to_owned),
            source_key: source_key.map(str::to_owned),
            config: StrategyConfig::default_staleness(),
            priority,
            enabled: true,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn most_specific_tuple_wins_over_priority() {
        let strategies = vec![strategy(None, None, 100), strategy(Some("crm"), Some("contacts"), 0)];
        let selected = select(&strategies, "crm", "contacts").expect("a strategy applies");
        assert_eq!(selected.specificity(), 2);
    }

    #[test]
    fn falls_back_to_global_default_when_nothing_more_specific_matches() {
        let strategies = vec![strategy(None, None, 0), strategy(Some("erp"), None, 0)];
        let selected = select(&strategies, "crm", "contacts").expect("global default applies");
        assert_eq!(selected.specificity(), 0);
    }

    #[test]
    fn disabled_strategies_are_never_selected() {
        let mut disabled = strategy(Some("crm"), Some("contacts"), 100);
        disabled.enabled = false;
        let strategies = vec![disabled, strategy(None, None, 0)];
        let selected = select(&strategies, "crm", "contacts").expect("fallback applies");
        assert_eq!(selected.specificity(), 0);
    }
}
