//! Storage contracts the resolution core is built against.
//!
//! Every sub-trait here names one narrow responsibility, mirroring the
//! teacher's split of `AccountStore` / `EntityStore` / `OntologyStore` on
//! `PostgresStore<C>`. A concrete backend (the in-memory reference store in
//! `er-memory-store`, or a real Postgres adapter) implements [`Store`], the
//! umbrella supertrait, once.

pub mod deletion;
pub mod match_index;
pub mod merge;
pub mod pool;
pub mod relationship;
pub mod staged;

pub use deletion::{DeletionStrategyStore, ExecutionTrackingStore, PendingDeletionStore};
pub use match_index::{MatchCandidateStore, MatchFieldStore, MatchRuleStore};
pub use merge::{EntityClusterStore, MergeAuditStore, MergeStrategyStore, MergedEntityStore};
pub use relationship::{ClusterLookup, MergedRelationshipStore, RelationshipClusterStore};
pub use staged::{
    EntityTypeSchemaStore, RelationshipCriteriaStore, StagedEntityStore, StagedRelationshipStore,
};

/// Everything a tenant-scoped resolution pipeline needs from a storage
/// backend. Implemented once per backend (see `er-memory-store::InMemoryStore`).
pub trait Store:
    StagedEntityStore
    + StagedRelationshipStore
    + RelationshipCriteriaStore
    + EntityTypeSchemaStore
    + MatchFieldStore
    + MatchRuleStore
    + MatchCandidateStore
    + MergedEntityStore
    + EntityClusterStore
    + MergeStrategyStore
    + MergeAuditStore
    + MergedRelationshipStore
    + RelationshipClusterStore
    + ClusterLookup
    + DeletionStrategyStore
    + PendingDeletionStore
    + ExecutionTrackingStore
{
}

impl<T> Store for T where
    T: StagedEntityStore
        + StagedRelationshipStore
        + RelationshipCriteriaStore
        + EntityTypeSchemaStore
        + MatchFieldStore
        + MatchRuleStore
        + MatchCandidateStore
        + MergedEntityStore
        + EntityClusterStore
        + MergeStrategyStore
        + MergeAuditStore
        + MergedRelationshipStore
        + RelationshipClusterStore
        + ClusterLookup
        + DeletionStrategyStore
        + PendingDeletionStore
        + ExecutionTrackingStore
{
}
