//! Domain layer types and rules.

pub mod filename;
pub mod masterlist;
pub mod roster;
