//! PostgreSQL connectivity and row mappings.

pub mod models;
pub mod pool;

pub use pool::{create_pool, health_check, init_schema, DbPool};
