//! Settings repository
//!
//! Key/value site settings and the ordered list of social links.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::collections::HashMap;
use std::sync::Arc;

use crate::db::DbPool;
use crate::models::SocialLink;

/// Repository trait for settings operations
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Every stored key/value pair
    async fn get_all(&self) -> Result<HashMap<String, String>>;

    /// Insert or replace one setting
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Insert or replace several settings atomically
    async fn set_many(&self, settings: &HashMap<String, String>) -> Result<()>;

    /// Links ordered by `sort_order`, then id
    async fn list_social_links(&self) -> Result<Vec<SocialLink>>;

    async fn get_social_link(&self, id: i64) -> Result<Option<SocialLink>>;

    async fn create_social_link(&self, link: &SocialLink) -> Result<SocialLink>;

    async fn update_social_link(&self, link: &SocialLink) -> Result<SocialLink>;

    async fn delete_social_link(&self, id: i64) -> Result<()>;
}

/// SQLx-based settings repository
pub struct SqlxSettingsRepository {
    pool: DbPool,
}

impl SqlxSettingsRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DbPool) -> Arc<dyn SettingsRepository> {
        Arc::new(Self::new(pool))
    }
}

const UPSERT_SETTING: &str = r#"
    INSERT INTO site_settings (key, value, updated_at) VALUES (?, ?, ?)
    ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
"#;

#[async_trait]
impl SettingsRepository for SqlxSettingsRepository {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value = sqlx::query_scalar("SELECT value FROM site_settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get setting")?;
        Ok(value)
    }

    async fn get_all(&self) -> Result<HashMap<String, String>> {
        let rows = sqlx::query("SELECT key, value FROM site_settings")
            .fetch_all(&self.pool)
            .await
            .context("Failed to get settings")?;

        Ok(rows
            .iter()
            .map(|row| (row.get("key"), row.get("value")))
            .collect())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(UPSERT_SETTING)
            .bind(key)
            .bind(value)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .context("Failed to save setting")?;
        Ok(())
    }

    async fn set_many(&self, settings: &HashMap<String, String>) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let now = Utc::now();
        for (key, value) in settings {
            sqlx::query(UPSERT_SETTING)
                .bind(key)
                .bind(value)
                .bind(now)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to save setting {}", key))?;
        }
        tx.commit().await.context("Failed to commit settings")?;
        Ok(())
    }

    async fn list_social_links(&self) -> Result<Vec<SocialLink>> {
        let rows = sqlx::query(
            "SELECT id, platform, link, sort_order, created_at FROM social_links ORDER BY sort_order, id",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list social links")?;

        Ok(rows.iter().map(row_to_social_link).collect())
    }

    async fn get_social_link(&self, id: i64) -> Result<Option<SocialLink>> {
        let row = sqlx::query(
            "SELECT id, platform, link, sort_order, created_at FROM social_links WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get social link")?;

        Ok(row.as_ref().map(row_to_social_link))
    }

    async fn create_social_link(&self, link: &SocialLink) -> Result<SocialLink> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO social_links (platform, link, sort_order, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&link.platform)
        .bind(&link.link)
        .bind(link.sort_order)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to create social link")?;

        Ok(SocialLink {
            id: result.last_insert_rowid(),
            created_at: now,
            ..link.clone()
        })
    }

    async fn update_social_link(&self, link: &SocialLink) -> Result<SocialLink> {
        sqlx::query("UPDATE social_links SET platform = ?, link = ?, sort_order = ? WHERE id = ?")
            .bind(&link.platform)
            .bind(&link.link)
            .bind(link.sort_order)
            .bind(link.id)
            .execute(&self.pool)
            .await
            .context("Failed to update social link")?;

        self.get_social_link(link.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Social link not found after update"))
    }

    async fn delete_social_link(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM social_links WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete social link")?;
        Ok(())
    }
}

fn row_to_social_link(row: &sqlx::sqlite::SqliteRow) -> SocialLink {
    SocialLink {
        id: row.get("id"),
        platform: row.get("platform"),
        link: row.get("link"),
        sort_order: row.get("sort_order"),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup() -> SqlxSettingsRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxSettingsRepository::new(pool)
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let repo = setup().await;
        assert!(repo.get("site_name").await.unwrap().is_none());

        repo.set("site_name", "First").await.unwrap();
        repo.set("site_name", "Second").await.unwrap();
        assert_eq!(repo.get("site_name").await.unwrap().as_deref(), Some("Second"));
    }

    #[tokio::test]
    async fn test_set_many_and_get_all() {
        let repo = setup().await;
        let mut values = HashMap::new();
        values.insert("site_name".to_string(), "Blog".to_string());
        values.insert("footer_text".to_string(), "Bye".to_string());
        repo.set_many(&values).await.unwrap();

        assert_eq!(repo.get_all().await.unwrap(), values);
    }

    #[tokio::test]
    async fn test_social_links_ordering_and_crud() {
        let repo = setup().await;
        let make = |platform: &str, order: i64| SocialLink {
            id: 0,
            platform: platform.to_string(),
            link: format!("https://{}.com/me", platform),
            sort_order: order,
            created_at: Utc::now(),
        };
        let github = repo.create_social_link(&make("github", 2)).await.unwrap();
        repo.create_social_link(&make("mastodon", 1)).await.unwrap();

        let links = repo.list_social_links().await.unwrap();
        assert_eq!(links[0].platform, "mastodon");

        let mut changed = github.clone();
        changed.sort_order = 0;
        repo.update_social_link(&changed).await.unwrap();
        assert_eq!(repo.list_social_links().await.unwrap()[0].platform, "github");

        repo.delete_social_link(github.id).await.unwrap();
        assert_eq!(repo.list_social_links().await.unwrap().len(), 1);
    }
}
