//! Newtype identifiers, mirroring the teacher's `identifier::account::AccountId`
//! style: every ID is a distinct type wrapping a `Uuid` so the compiler rejects
//! swapped arguments between, say, a `StagedEntityId` and a `MergedEntityId`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

uuid_id!(TenantId);
uuid_id!(ConfigId);
uuid_id!(StagedEntityId);
uuid_id!(StagedRelationshipId);
uuid_id!(StagedRelationshipCriteriaId);
uuid_id!(MergedEntityId);
uuid_id!(MergedRelationshipId);
uuid_id!(MatchRuleId);
uuid_id!(DeletionStrategyId);
uuid_id!(PendingDeletionId);

/// Fixed namespace golden-edge IDs are derived from (spec §3, `MergedRelationship`).
/// A stable constant so `UUIDv5(ns, "tenant|type|from|to")` is reproducible across
/// processes and restarts.
pub const GOLDEN_RELATIONSHIP_NAMESPACE: Uuid =
    Uuid::from_bytes([
        0x6f, 0x2a, 0x21, 0x3e, 0x1b, 0x1e, 0x4b, 0x1a, 0x9e, 0x8d, 0x3a, 0x0c, 0x5e, 0x6f, 0x7a,
        0x01,
    ]);

/// Deterministic golden-edge ID (spec §4.5 step 3, §8 property).
#[must_use]
pub fn golden_relationship_id(
    tenant_id: TenantId,
    relationship_type: &str,
    from_merged_entity_id: MergedEntityId,
    to_merged_entity_id: MergedEntityId,
) -> MergedRelationshipId {
    let name = format!(
        "{}|{}|{}|{}",
        tenant_id.0, relationship_type, from_merged_entity_id.0, to_merged_entity_id.0
    );
    MergedRelationshipId(Uuid::new_v5(&GOLDEN_RELATIONSHIP_NAMESPACE, name.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn golden_edge_id_is_deterministic() {
        let tenant = TenantId::new();
        let from = MergedEntityId::new();
        let to = MergedEntityId::new();
        let id1 = golden_relationship_id(tenant, "works_at", from, to);
        let id2 = golden_relationship_id(tenant, "works_at", from, to);
        assert_eq!(id1, id2);

        let other_type = golden_relationship_id(tenant, "lives_in", from, to);
        assert_ne!(id1, other_type);
    }
}
