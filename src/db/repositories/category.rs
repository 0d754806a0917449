//! Category repository

use crate::db::DbPool;
use crate::models::{Category, CategoryWithCount};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::sync::Arc;

const CATEGORY_COLUMNS: &str =
    "id, category_name, slug, description, seo_title, seo_description, created_at, updated_at";

/// Category repository trait
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    async fn create(&self, category: &Category) -> Result<Category>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>>;

    async fn get_by_name(&self, name: &str) -> Result<Option<Category>>;

    /// All categories in creation order
    async fn list(&self) -> Result<Vec<Category>>;

    /// All categories with their published post counts
    async fn list_with_counts(&self) -> Result<Vec<CategoryWithCount>>;

    async fn update(&self, category: &Category) -> Result<Category>;

    async fn delete(&self, id: i64) -> Result<()>;

    async fn count(&self) -> Result<i64>;

    /// Posts of any status referencing the category
    async fn count_posts(&self, id: i64) -> Result<i64>;

    /// Whether a slug is taken by another category
    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool>;
}

/// SQLx-based category repository implementation
pub struct SqlxCategoryRepository {
    pool: DbPool,
}

impl SqlxCategoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DbPool) -> Arc<dyn CategoryRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CategoryRepository for SqlxCategoryRepository {
    async fn create(&self, category: &Category) -> Result<Category> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO categories (category_name, slug, description, seo_title, seo_description,
                                    created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&category.category_name)
        .bind(&category.slug)
        .bind(&category.description)
        .bind(&category.seo_title)
        .bind(&category.seo_description)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to create category")?;

        Ok(Category {
            id: result.last_insert_rowid(),
            created_at: now,
            updated_at: now,
            ..category.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>> {
        let sql = format!("SELECT {} FROM categories WHERE id = ?", CATEGORY_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get category by ID")?;

        Ok(row.as_ref().map(row_to_category))
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>> {
        let sql = format!("SELECT {} FROM categories WHERE slug = ?", CATEGORY_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get category by slug")?;

        Ok(row.as_ref().map(row_to_category))
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Category>> {
        let sql = format!(
            "SELECT {} FROM categories WHERE category_name = ? COLLATE NOCASE",
            CATEGORY_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get category by name")?;

        Ok(row.as_ref().map(row_to_category))
    }

    async fn list(&self) -> Result<Vec<Category>> {
        let sql = format!("SELECT {} FROM categories ORDER BY id", CATEGORY_COLUMNS);
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list categories")?;

        Ok(rows.iter().map(row_to_category).collect())
    }

    async fn list_with_counts(&self) -> Result<Vec<CategoryWithCount>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.category_name, c.slug, c.description, c.seo_title, c.seo_description,
                   c.created_at, c.updated_at,
                   (SELECT COUNT(*) FROM posts p
                    WHERE p.category_id = c.id AND p.status = 'published') AS post_count
            FROM categories c
            ORDER BY c.id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list categories with counts")?;

        Ok(rows
            .iter()
            .map(|row| CategoryWithCount {
                category: row_to_category(row),
                post_count: row.get("post_count"),
            })
            .collect())
    }

    async fn update(&self, category: &Category) -> Result<Category> {
        sqlx::query(
            r#"
            UPDATE categories
            SET category_name = ?, slug = ?, description = ?, seo_title = ?, seo_description = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&category.category_name)
        .bind(&category.slug)
        .bind(&category.description)
        .bind(&category.seo_title)
        .bind(&category.seo_description)
        .bind(Utc::now())
        .bind(category.id)
        .execute(&self.pool)
        .await
        .context("Failed to update category")?;

        self.get_by_id(category.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Category not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM categories WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete category")?;
        Ok(())
    }

    async fn count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM categories")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count categories")?;
        Ok(row.get("count"))
    }

    async fn count_posts(&self, id: i64) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM posts WHERE category_id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count category posts")?;
        Ok(row.get("count"))
    }

    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool> {
        let row = sqlx::query(
            "SELECT COUNT(*) as count FROM categories WHERE slug = ? AND id <> ?",
        )
        .bind(slug)
        .bind(exclude_id.unwrap_or(0))
        .fetch_one(&self.pool)
        .await
        .context("Failed to check category slug")?;
        Ok(row.get::<i64, _>("count") > 0)
    }
}

fn row_to_category(row: &SqliteRow) -> Category {
    Category {
        id: row.get("id"),
        category_name: row.get("category_name"),
        slug: row.get("slug"),
        description: row.get("description"),
        seo_title: row.get("seo_title"),
        seo_description: row.get("seo_description"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> (DbPool, SqlxCategoryRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxCategoryRepository::new(pool.clone());
        (pool, repo)
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let (_pool, repo) = setup_test_repo().await;
        let created = repo
            .create(&Category::new("Rust".into(), "rust".into()))
            .await
            .unwrap();
        assert!(created.id > 0);

        assert_eq!(repo.get_by_slug("rust").await.unwrap().unwrap().id, created.id);
        assert_eq!(repo.get_by_name("RUST").await.unwrap().unwrap().id, created.id);
        assert!(repo.get_by_slug("go").await.unwrap().is_none());
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_slug_exists_excludes_self() {
        let (_pool, repo) = setup_test_repo().await;
        let created = repo
            .create(&Category::new("Web".into(), "web".into()))
            .await
            .unwrap();

        assert!(repo.slug_exists("web", None).await.unwrap());
        assert!(!repo.slug_exists("web", Some(created.id)).await.unwrap());
        assert!(!repo.slug_exists("other", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_category() {
        let (_pool, repo) = setup_test_repo().await;
        let mut category = repo
            .create(&Category::new("Old".into(), "old".into()))
            .await
            .unwrap();
        category.category_name = "New".into();
        category.seo_title = "New things".into();

        let updated = repo.update(&category).await.unwrap();
        assert_eq!(updated.category_name, "New");
        assert_eq!(updated.seo_title, "New things");
        assert!(updated.updated_at >= updated.created_at);
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create(&Category::new("Dup".into(), "dup".into())).await.unwrap();
        assert!(repo
            .create(&Category::new("Dup".into(), "dup-2".into()))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_list_with_counts_counts_published_only() {
        let (pool, repo) = setup_test_repo().await;
        let category = repo
            .create(&Category::new("News".into(), "news".into()))
            .await
            .unwrap();
        let now = Utc::now();
        let user_id = sqlx::query("INSERT INTO users (username, date_joined) VALUES ('w', ?)")
            .bind(now)
            .execute(&pool)
            .await
            .unwrap()
            .last_insert_rowid();
        for (slug, status) in [("a", "published"), ("b", "draft")] {
            sqlx::query(
                "INSERT INTO posts (title, slug, category_id, author_id, short_description, blog_body, status, created_at, updated_at) VALUES (?, ?, ?, ?, 's', 'b', ?, ?, ?)",
            )
            .bind(slug)
            .bind(slug)
            .bind(category.id)
            .bind(user_id)
            .bind(status)
            .bind(now)
            .bind(now)
            .execute(&pool)
            .await
            .unwrap();
        }

        let listed = repo.list_with_counts().await.unwrap();
        assert_eq!(listed[0].post_count, 1);
        assert_eq!(repo.count_posts(category.id).await.unwrap(), 2);
    }
}
