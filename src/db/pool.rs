//! SQLite connection pool
//!
//! All persistent state lives in a single SQLite database. Foreign keys are
//! switched on for every pooled connection so cascade deletes behave the
//! same in production and in tests.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use crate::config::DatabaseConfig;

/// Pool handle shared by every repository
pub type DbPool = SqlitePool;

/// Normalize a configured database location into a sqlx connection URL.
///
/// Accepts a bare file path, a `sqlite:` URL, or `:memory:`.
fn connection_url(url: &str) -> String {
    if url == ":memory:" || url.starts_with("sqlite::memory:") {
        "sqlite::memory:".to_string()
    } else if url.starts_with("sqlite:") {
        if url.contains('?') {
            url.to_string()
        } else {
            format!("{}?mode=rwc", url)
        }
    } else {
        format!("sqlite:{}?mode=rwc", url)
    }
}

/// Make sure the parent directory of a file-backed database exists
fn ensure_parent_dir(url: &str) -> Result<()> {
    if url.contains(":memory:") {
        return Ok(());
    }

    let path = url.trim_start_matches("sqlite:");
    let path = path.split('?').next().unwrap_or(path);
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory: {:?}", parent))?;
        }
    }
    Ok(())
}

/// Create the connection pool described by the configuration
pub async fn create_pool(config: &DatabaseConfig) -> Result<DbPool> {
    ensure_parent_dir(&config.url)?;

    let options = SqliteConnectOptions::from_str(&connection_url(&config.url))
        .with_context(|| format!("Invalid SQLite URL: {}", config.url))?
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to connect to SQLite database: {}", config.url))?;

    tracing::info!("Connected to SQLite database at {}", config.url);
    Ok(pool)
}

/// Create an in-memory pool for tests.
///
/// An in-memory SQLite database lives only as long as its connection, so
/// the pool is pinned to a single connection that never idles out.
pub async fn create_test_pool() -> Result<DbPool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .context("Invalid in-memory SQLite URL")?
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .context("Failed to create in-memory SQLite pool")
}

/// Check the database is reachable
pub async fn ping(pool: &DbPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .context("Database ping failed")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_url_forms() {
        assert_eq!(connection_url(":memory:"), "sqlite::memory:");
        assert_eq!(connection_url("data/blog.db"), "sqlite:data/blog.db?mode=rwc");
        assert_eq!(connection_url("sqlite:data/blog.db"), "sqlite:data/blog.db?mode=rwc");
        assert_eq!(
            connection_url("sqlite:data/blog.db?mode=ro"),
            "sqlite:data/blog.db?mode=ro"
        );
    }

    #[tokio::test]
    async fn test_create_test_pool_pings() {
        let pool = create_test_pool().await.unwrap();
        ping(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn test_foreign_keys_enabled() {
        let pool = create_test_pool().await.unwrap();
        let enabled: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(enabled, 1);
    }

    #[tokio::test]
    async fn test_create_file_pool_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("blog.db");
        let config = DatabaseConfig {
            url: path.to_string_lossy().to_string(),
            max_connections: 2,
        };

        let pool = create_pool(&config).await.unwrap();
        ping(&pool).await.unwrap();
        assert!(path.exists());
        pool.close().await;
    }
}
