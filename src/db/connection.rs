use sqlx::{migrate::MigrateDatabase, sqlite::SqlitePoolOptions, Sqlite, SqlitePool};
use tracing::info;

use crate::db::INIT_SCHEMA;

pub async fn establish_connection(
    database_url: &str,
    max_connections: u32,
) -> Result<SqlitePool, sqlx::Error> {
    // Create database if it doesn't exist
    if !Sqlite::database_exists(database_url).await.unwrap_or(false) {
        Sqlite::create_database(database_url).await?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    // WAL lets the query path read while the poller writes
    sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;

    init_schema(&pool).await?;
    info!(database_url, "database ready");

    Ok(pool)
}

pub async fn init_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(INIT_SCHEMA).execute(pool).await?;
    Ok(())
}
