//! Document layout of the primary and secondary stores

pub mod builder;
pub mod fields;

pub use builder::{build, properties_of, rewrite};
