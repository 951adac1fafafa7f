//! Relationship resolver: direct and criteria paths, golden-edge
//! materialization (spec §4.5).

pub mod criteria;
pub mod resolver;

pub use resolver::RelationshipResolver;
