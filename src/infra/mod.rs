//! Infrastructure adapters and runtime bootstrap.

pub mod db;
pub mod error;
pub mod http;
pub mod redis_cache;
pub mod search;
pub mod telemetry;
