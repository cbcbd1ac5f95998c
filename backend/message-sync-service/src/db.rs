use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

pub async fn init_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, crate::error::AppError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .connect(database_url)
        .await?;

    MIGRATOR.run(&pool).await?;
    info!(max_connections, "database pool ready, migrations applied");
    Ok(pool)
}
