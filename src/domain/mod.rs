//! Domain layer types and invariants.

pub mod categories;
pub mod error;
pub mod geo;
pub mod ranking;
pub mod views;
