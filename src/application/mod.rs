//! Application services and the ports they depend on.

pub mod categories;
pub mod error;
pub mod repos;
pub mod search;
