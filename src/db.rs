use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Sqlite, SqlitePool};

use crate::error::EngineResult;

/// Opens (creating if necessary) the SQLite database behind the persistent
/// node store and applies the session pragmas.
pub async fn connect(url: &str) -> EngineResult<SqlitePool> {
    crate::config::ensure_sqlite_parent_dir(url)?;
    if !Sqlite::database_exists(url).await.unwrap_or(false) {
        tracing::info!(url, "creating SQLite database");
        Sqlite::create_database(url).await?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(num_cpus::get().clamp(2, 16) as u32)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                let _ = sqlx::query("PRAGMA busy_timeout=10000;").execute(&mut *conn).await;
                let _ = sqlx::query("PRAGMA cache_size=-65536;").execute(&mut *conn).await; // ~64MB page cache
                let _ = sqlx::query("PRAGMA temp_store=MEMORY;").execute(&mut *conn).await;
                Ok(())
            })
        })
        .connect(url)
        .await?;

    init_pragmas(&pool).await;
    Ok(pool)
}

/// Durability/performance pragmas, best-effort with logged failures.
pub async fn init_pragmas(pool: &SqlitePool) {
    if let Err(e) = sqlx::query("PRAGMA journal_mode=WAL;").execute(pool).await {
        tracing::warn!("Failed to set WAL journal mode: {}", e);
    }
    if let Err(e) = sqlx::query("PRAGMA synchronous=NORMAL;").execute(pool).await {
        tracing::warn!("Failed to set synchronous mode: {}", e);
    }
    if let Err(e) = sqlx::query("PRAGMA mmap_size=268435456;").execute(pool).await {
        tracing::warn!("Failed to set mmap_size: {}", e);
    }
}
