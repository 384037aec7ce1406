//! Database connection pool management.

use crate::config::DatabaseConfig;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Type alias for the PostgreSQL connection pool.
pub type DbPool = PgPool;

/// Engine schema, applied by [`init_schema`].
pub const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Create a new database connection pool.
///
/// # Errors
///
/// Returns an error if the connection pool cannot be created.
pub async fn create_pool(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout())
        .connect_with(config.connect_options())
        .await?;

    tracing::info!(
        url = %config.redacted_url(),
        max_connections = config.max_connections,
        "Database connection pool created"
    );

    Ok(pool)
}

/// Create the engine tables if they do not exist.
pub async fn init_schema(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA_SQL).execute(pool).await?;
    tracing::info!("Database schema initialized");
    Ok(())
}

/// Check if the database connection is healthy.
pub async fn health_check(pool: &DbPool) -> bool {
    sqlx::query("SELECT 1").execute(pool).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_declares_engine_tables() {
        for table in [
            "workflow_definitions",
            "workflow_steps",
            "workflow_executions",
            "tasks",
            "inspections",
        ] {
            assert!(
                SCHEMA_SQL.contains(&format!("CREATE TABLE IF NOT EXISTS {} (", table)),
                "missing table {}",
                table
            );
        }
    }
}
