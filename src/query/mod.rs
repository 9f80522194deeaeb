//! Query compilation and execution across the primary and secondary stores

pub mod bitset;
pub mod compiler;
pub mod executor;
pub mod planner;

pub use bitset::StoreBitset;
pub use compiler::{CompiledPart, CompiledQuery, PostFilter, QueryCompiler, ScoringTerm};
pub use executor::{ResultAssembler, Selection};
pub use planner::{MatchPlanner, Whitelist};
