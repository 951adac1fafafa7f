//! Match-index writer and candidate matching engine (spec §4.2, §4.3).
//!
//! Candidate discovery and scoring are pure functions over whatever a
//! [`er_store::Store`] implementation returns; the in-process fuzzy
//! similarity ([`similarity`]) and phonetic encoding ([`phonetic`]) stand in
//! for the external trigram primitive the distilled source assumed was
//! always available.

pub mod engine;
pub mod index_writer;
pub mod phonetic;
pub mod similarity;

pub use engine::MatchEngine;
pub use index_writer::MatchIndexWriter;
