//! Roamly category service.
//!
//! Serves the category hierarchy, per-user category recommendations and
//! location-scoped trending categories over HTTP, with a cache-aside layer in
//! front of every read.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
