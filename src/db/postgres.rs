use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

const MAX_CONNECTIONS: u32 = 10;

/// Creates a PostgreSQL connection pool
///
/// Acquiring a connection is bounded by `acquire_timeout` so a stalled store degrades
/// into a fast error instead of hanging the request.
pub async fn create_pool(database_url: &str, acquire_timeout: Duration) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .acquire_timeout(acquire_timeout)
        .connect(database_url)
        .await?;

    tracing::info!(max_connections = MAX_CONNECTIONS, "Connected to Postgres");

    Ok(pool)
}
