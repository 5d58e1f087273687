use sqlx::PgPool;

use crate::store::StoreError;

const SCHEMA: &str = include_str!("../sql/schema.sql");

/// Create the users and policy tables if they are missing.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .map_err(|e| StoreError::Database(format!("schema setup failed: {e}")))?;
    tracing::info!("database schema ensured");
    Ok(())
}
