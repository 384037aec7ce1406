//! Configuration for the casework engine.
//!
//! Configuration is loaded from environment variables using the `envy`
//! crate for type-safe environment variable parsing.

mod app;
mod database;

pub use app::AppConfig;
pub use database::DatabaseConfig;
