//! Core data model for the entity resolution pipeline.
//!
//! Every other crate in the workspace builds on these plain structs: the
//! tagged [`value::Value`] payload type, the staged/merged record shapes, and
//! the tenant-configurable match/merge/deletion rule schemas from spec §3.

pub mod deletion;
pub mod error;
pub mod events;
pub mod ids;
pub mod json_path;
pub mod match_types;
pub mod merged;
pub mod staged;
pub mod value;

pub use deletion::*;
pub use error::*;
pub use events::*;
pub use ids::*;
pub use match_types::*;
pub use merged::*;
pub use staged::*;
pub use value::Value;
