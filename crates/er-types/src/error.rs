//! Error taxonomy shared across the pipeline (spec §7), plus the zero-sized
//! `Context` marker types each component's `error_stack::Report` is built from.
//! This mirrors `apps/hash-graph/lib/graph/src/store/error.rs`: one marker
//! struct per failure shape, each carrying only a `Display` impl, with the
//! actual diagnostic payload attached to the `Report` via `attach_printable`.

use core::fmt;

use error_stack::Context;

/// The taxonomy from spec §7. Attached to a `Report` so callers can match on
/// "is this retryable" without losing the underlying context chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    ResourceExhausted,
    Transient,
    Permanent,
}

impl ErrorKind {
    /// Services never retry these three; `Transient` is always retried with
    /// backoff; `ResourceExhausted` is retried by the caller after the hint
    /// elapses; `Permanent` is dead-lettered, never retried in-line.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Transient)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::ResourceExhausted => "resource_exhausted",
            Self::Transient => "transient",
            Self::Permanent => "permanent",
        })
    }
}

macro_rules! context_marker {
    ($name:ident, $display:expr) => {
        #[derive(Debug)]
        #[must_use]
        pub struct $name;

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str($display)
            }
        }

        impl Context for $name {}
    };
}

context_marker!(StoreError, "the staged or golden store encountered an error");
context_marker!(InsertionError, "could not insert into the store");
context_marker!(QueryError, "could not query the store");
context_marker!(UpdateError, "could not update the store");
context_marker!(MatchError, "the match engine encountered an error");
context_marker!(MergeError, "the merge engine encountered an error");
context_marker!(
    RelationshipError,
    "the relationship resolver encountered an error"
);
context_marker!(DeletionError, "the deletion controller encountered an error");
context_marker!(EventPublishError, "could not publish an event");
context_marker!(PipelineError, "the pipeline orchestrator encountered an error");

/// Raised when a mutation would violate the `(tenant, entity_type, source_id,
/// integration)` identity uniqueness invariant (spec §3); normalized onto
/// `ErrorKind::Conflict`.
#[derive(Debug)]
#[must_use]
pub struct IdentityConflict;

impl fmt::Display for IdentityConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a record with this source identity already exists")
    }
}

impl Context for IdentityConflict {}

#[derive(Debug)]
#[must_use]
pub struct RecordNotFound;

impl fmt::Display for RecordNotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("the requested record does not exist")
    }
}

impl Context for RecordNotFound {}
