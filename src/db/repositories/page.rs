//! Page repository

use crate::db::DbPool;
use crate::models::{Page, PublishStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::str::FromStr;
use std::sync::Arc;

/// Page repository trait
#[async_trait]
pub trait PageRepository: Send + Sync {
    async fn create(&self, page: &Page) -> Result<Page>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Page>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Page>>;

    /// All pages, or only those with `status`, by title
    async fn list(&self, status: Option<PublishStatus>) -> Result<Vec<Page>>;

    async fn update(&self, page: &Page) -> Result<Page>;

    /// Delete a page and its comment thread
    async fn delete(&self, id: i64) -> Result<()>;

    async fn count(&self) -> Result<i64>;

    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool>;
}

/// SQLx-based page repository implementation
pub struct SqlxPageRepository {
    pool: DbPool,
}

impl SqlxPageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DbPool) -> Arc<dyn PageRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl PageRepository for SqlxPageRepository {
    async fn create(&self, page: &Page) -> Result<Page> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO pages (title, slug, content, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&page.title)
        .bind(&page.slug)
        .bind(&page.content)
        .bind(page.status.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to create page")?;

        Ok(Page {
            id: result.last_insert_rowid(),
            created_at: now,
            updated_at: now,
            ..page.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Page>> {
        let row = sqlx::query(
            "SELECT id, title, slug, content, status, created_at, updated_at FROM pages WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get page by ID")?;

        row.as_ref().map(row_to_page).transpose()
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Page>> {
        let row = sqlx::query(
            "SELECT id, title, slug, content, status, created_at, updated_at FROM pages WHERE slug = ?",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get page by slug")?;

        row.as_ref().map(row_to_page).transpose()
    }

    async fn list(&self, status: Option<PublishStatus>) -> Result<Vec<Page>> {
        let rows = sqlx::query(
            r#"
            SELECT id, title, slug, content, status, created_at, updated_at
            FROM pages
            WHERE ? IS NULL OR status = ?
            ORDER BY title
            "#,
        )
        .bind(status.map(|s| s.as_str()))
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list pages")?;

        rows.iter().map(row_to_page).collect()
    }

    async fn update(&self, page: &Page) -> Result<Page> {
        sqlx::query(
            "UPDATE pages SET title = ?, slug = ?, content = ?, status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&page.title)
        .bind(&page.slug)
        .bind(&page.content)
        .bind(page.status.as_str())
        .bind(Utc::now())
        .bind(page.id)
        .execute(&self.pool)
        .await
        .context("Failed to update page")?;

        self.get_by_id(page.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Page not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query("DELETE FROM comments WHERE content_type = 'page' AND object_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete page comments")?;

        sqlx::query("DELETE FROM pages WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete page")?;

        tx.commit().await.context("Failed to commit page deletion")?;
        Ok(())
    }

    async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pages")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count pages")?;
        Ok(count)
    }

    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pages WHERE slug = ? AND id <> ?")
            .bind(slug)
            .bind(exclude_id.unwrap_or(0))
            .fetch_one(&self.pool)
            .await
            .context("Failed to check page slug")?;
        Ok(count > 0)
    }
}

fn row_to_page(row: &sqlx::sqlite::SqliteRow) -> Result<Page> {
    let status_str: String = row.get("status");
    let status = PublishStatus::from_str(&status_str)
        .with_context(|| format!("Invalid page status in database: {}", status_str))?;

    Ok(Page {
        id: row.get("id"),
        title: row.get("title"),
        slug: row.get("slug"),
        content: row.get("content"),
        status,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
