//! Post repository
//!
//! Database operations for blog posts.
//!
//! This module provides:
//! - `PostRepository` trait defining the interface for post data access
//! - `SqlxPostRepository` implementing the trait on SQLite
//! - `PostQuery`, the filter used by every paginated post listing

use crate::db::DbPool;
use crate::models::{ListParams, Post, PostSummary, PublishStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

const POST_COLUMNS: &str = "p.id, p.title, p.slug, p.category_id, p.author_id, p.featured_image, \
     p.short_description, p.blog_body, p.status, p.is_featured, p.is_editors_pick, p.views, \
     p.seo_title, p.seo_description, p.seo_keywords, p.image_base_name, p.image_width, \
     p.image_height, p.published_at, p.created_at, p.updated_at";

const SUMMARY_JOIN: &str = r#"
    FROM posts p
    JOIN categories c ON c.id = p.category_id
    JOIN users u ON u.id = p.author_id
"#;

const SUMMARY_EXTRA: &str = "c.category_name AS category_name, c.slug AS category_slug, \
     COALESCE(NULLIF(TRIM(u.first_name || ' ' || u.last_name), ''), u.username) AS author_name";

/// Filter for paginated post listings
#[derive(Debug, Clone, Default)]
pub struct PostQuery {
    pub status: Option<PublishStatus>,
    pub category_id: Option<i64>,
    pub tag_id: Option<i64>,
    pub is_featured: Option<bool>,
    pub is_editors_pick: Option<bool>,
    /// Case-insensitive match on title, short description or body
    pub search: Option<String>,
}

impl PostQuery {
    pub fn published() -> Self {
        Self {
            status: Some(PublishStatus::Published),
            ..Self::default()
        }
    }

    pub fn with_category(mut self, category_id: i64) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn with_tag(mut self, tag_id: i64) -> Self {
        self.tag_id = Some(tag_id);
        self
    }

    pub fn with_featured(mut self, featured: bool) -> Self {
        self.is_featured = Some(featured);
        self
    }

    pub fn with_editors_pick(mut self, pick: bool) -> Self {
        self.is_editors_pick = Some(pick);
        self
    }

    pub fn with_search(mut self, q: &str) -> Self {
        self.search = Some(q.to_string());
        self
    }

    /// Render the WHERE clause and its bind values, in order
    fn where_clause(&self) -> (String, Vec<QueryArg>) {
        let mut conditions = vec!["1 = 1".to_string()];
        let mut args = Vec::new();

        if let Some(status) = self.status {
            conditions.push("p.status = ?".to_string());
            args.push(QueryArg::Text(status.as_str().to_string()));
        }
        if let Some(category_id) = self.category_id {
            conditions.push("p.category_id = ?".to_string());
            args.push(QueryArg::Int(category_id));
        }
        if let Some(tag_id) = self.tag_id {
            conditions
                .push("p.id IN (SELECT post_id FROM post_tags WHERE tag_id = ?)".to_string());
            args.push(QueryArg::Int(tag_id));
        }
        if let Some(featured) = self.is_featured {
            conditions.push("p.is_featured = ?".to_string());
            args.push(QueryArg::Bool(featured));
        }
        if let Some(pick) = self.is_editors_pick {
            conditions.push("p.is_editors_pick = ?".to_string());
            args.push(QueryArg::Bool(pick));
        }
        if let Some(q) = &self.search {
            conditions.push(
                "(p.title LIKE ? ESCAPE '\\' OR p.short_description LIKE ? ESCAPE '\\' \
                 OR p.blog_body LIKE ? ESCAPE '\\')"
                    .to_string(),
            );
            let pattern = format!("%{}%", escape_like(q));
            for _ in 0..3 {
                args.push(QueryArg::Text(pattern.clone()));
            }
        }

        (conditions.join(" AND "), args)
    }
}

#[derive(Debug, Clone)]
enum QueryArg {
    Text(String),
    Int(i64),
    Bool(bool),
}

fn bind_args<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    args: &'q [QueryArg],
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    for arg in args {
        query = match arg {
            QueryArg::Text(s) => query.bind(s.as_str()),
            QueryArg::Int(i) => query.bind(*i),
            QueryArg::Bool(b) => query.bind(*b),
        };
    }
    query
}

/// Escape LIKE wildcards so user input matches literally
fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Post repository trait
#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn create(&self, post: &Post) -> Result<Post>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Post>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Post>>;

    async fn get_summary(&self, id: i64) -> Result<Option<PostSummary>>;

    async fn update(&self, post: &Post) -> Result<Post>;

    /// Delete a post and its comment thread
    async fn delete(&self, id: i64) -> Result<()>;

    async fn increment_views(&self, id: i64) -> Result<()>;

    /// Newest first
    async fn list(&self, query: &PostQuery, params: &ListParams)
        -> Result<(Vec<PostSummary>, i64)>;

    async fn count(&self, status: Option<PublishStatus>) -> Result<i64>;

    /// Latest published featured post, or the latest published post when none is featured
    async fn featured(&self) -> Result<Option<PostSummary>>;

    /// Published posts with the most views
    async fn most_viewed(&self, limit: i64) -> Result<Vec<PostSummary>>;

    /// Published posts in the same category or sharing a tag, excluding the post itself
    async fn related(&self, post: &Post, limit: i64) -> Result<Vec<PostSummary>>;

    /// Every published post, most recently updated first
    async fn all_published(&self) -> Result<Vec<PostSummary>>;

    /// Latest `updated_at` of published posts, per category
    async fn latest_update_by_category(&self) -> Result<HashMap<i64, DateTime<Utc>>>;

    async fn set_flags(
        &self,
        id: i64,
        is_featured: Option<bool>,
        is_editors_pick: Option<bool>,
    ) -> Result<()>;

    async fn set_image_meta(&self, id: i64, base_name: &str, width: i64, height: i64)
        -> Result<()>;

    /// Posts that carry a featured image
    async fn with_images(&self) -> Result<Vec<Post>>;

    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool>;
}

/// SQLx-based post repository implementation
pub struct SqlxPostRepository {
    pool: DbPool,
}

impl SqlxPostRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DbPool) -> Arc<dyn PostRepository> {
        Arc::new(Self::new(pool))
    }

    async fn fetch_summaries(&self, tail: &str, binds: &[QueryArg]) -> Result<Vec<PostSummary>> {
        let sql = format!("SELECT {}, {} {} {}", POST_COLUMNS, SUMMARY_EXTRA, SUMMARY_JOIN, tail);
        let rows = bind_args(sqlx::query(&sql), binds)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list posts")?;

        rows.iter().map(row_to_summary).collect()
    }

    async fn fetch_post(&self, clause: &str, arg: QueryArg) -> Result<Option<Post>> {
        let sql = format!("SELECT {} FROM posts p WHERE {}", POST_COLUMNS, clause);
        let args = [arg];
        let row = bind_args(sqlx::query(&sql), &args)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get post")?;

        row.as_ref().map(row_to_post).transpose()
    }
}

#[async_trait]
impl PostRepository for SqlxPostRepository {
    async fn create(&self, post: &Post) -> Result<Post> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO posts (title, slug, category_id, author_id, featured_image,
                               short_description, blog_body, status, is_featured, is_editors_pick,
                               views, seo_title, seo_description, seo_keywords, image_base_name,
                               image_width, image_height, published_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.title)
        .bind(&post.slug)
        .bind(post.category_id)
        .bind(post.author_id)
        .bind(&post.featured_image)
        .bind(&post.short_description)
        .bind(&post.blog_body)
        .bind(post.status.as_str())
        .bind(post.is_featured)
        .bind(post.is_editors_pick)
        .bind(post.views)
        .bind(&post.seo_title)
        .bind(&post.seo_description)
        .bind(&post.seo_keywords)
        .bind(&post.image_base_name)
        .bind(post.image_width)
        .bind(post.image_height)
        .bind(post.published_at)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to create post")?;

        Ok(Post {
            id: result.last_insert_rowid(),
            created_at: now,
            updated_at: now,
            ..post.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Post>> {
        self.fetch_post("p.id = ?", QueryArg::Int(id)).await
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Post>> {
        self.fetch_post("p.slug = ?", QueryArg::Text(slug.to_string()))
            .await
    }

    async fn get_summary(&self, id: i64) -> Result<Option<PostSummary>> {
        let binds = [QueryArg::Int(id)];
        let mut found = self.fetch_summaries("WHERE p.id = ?", &binds).await?;
        Ok(found.pop())
    }

    async fn update(&self, post: &Post) -> Result<Post> {
        sqlx::query(
            r#"
            UPDATE posts
            SET title = ?, slug = ?, category_id = ?, featured_image = ?, short_description = ?,
                blog_body = ?, status = ?, is_featured = ?, is_editors_pick = ?, seo_title = ?,
                seo_description = ?, seo_keywords = ?, image_base_name = ?, image_width = ?,
                image_height = ?, published_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&post.title)
        .bind(&post.slug)
        .bind(post.category_id)
        .bind(&post.featured_image)
        .bind(&post.short_description)
        .bind(&post.blog_body)
        .bind(post.status.as_str())
        .bind(post.is_featured)
        .bind(post.is_editors_pick)
        .bind(&post.seo_title)
        .bind(&post.seo_description)
        .bind(&post.seo_keywords)
        .bind(&post.image_base_name)
        .bind(post.image_width)
        .bind(post.image_height)
        .bind(post.published_at)
        .bind(Utc::now())
        .bind(post.id)
        .execute(&self.pool)
        .await
        .context("Failed to update post")?;

        self.get_by_id(post.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Post not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        // Comments reference posts generically, so there is no FK to cascade
        sqlx::query("DELETE FROM comments WHERE content_type = 'post' AND object_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete post comments")?;

        sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete post")?;

        tx.commit().await.context("Failed to commit post deletion")?;
        Ok(())
    }

    async fn increment_views(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE posts SET views = views + 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to increment views")?;
        Ok(())
    }

    async fn list(
        &self,
        query: &PostQuery,
        params: &ListParams,
    ) -> Result<(Vec<PostSummary>, i64)> {
        let (clause, mut args) = query.where_clause();

        let count_sql = format!("SELECT COUNT(*) AS count FROM posts p WHERE {}", clause);
        let total: i64 = bind_args(sqlx::query(&count_sql), &args)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count posts")?
            .get("count");

        args.push(QueryArg::Int(params.limit()));
        args.push(QueryArg::Int(params.offset()));
        let tail = format!(
            "WHERE {} ORDER BY p.created_at DESC, p.id DESC LIMIT ? OFFSET ?",
            clause
        );
        let items = self.fetch_summaries(&tail, &args).await?;

        Ok((items, total))
    }

    async fn count(&self, status: Option<PublishStatus>) -> Result<i64> {
        let row = match status {
            Some(status) => {
                sqlx::query("SELECT COUNT(*) AS count FROM posts WHERE status = ?")
                    .bind(status.as_str())
                    .fetch_one(&self.pool)
                    .await
            }
            None => {
                sqlx::query("SELECT COUNT(*) AS count FROM posts")
                    .fetch_one(&self.pool)
                    .await
            }
        }
        .context("Failed to count posts")?;
        Ok(row.get("count"))
    }

    async fn featured(&self) -> Result<Option<PostSummary>> {
        let mut found = self
            .fetch_summaries(
                "WHERE p.status = 'published' \
                 ORDER BY p.is_featured DESC, p.created_at DESC, p.id DESC LIMIT 1",
                &[],
            )
            .await?;
        Ok(found.pop())
    }

    async fn most_viewed(&self, limit: i64) -> Result<Vec<PostSummary>> {
        let binds = [QueryArg::Int(limit)];
        self.fetch_summaries(
            "WHERE p.status = 'published' ORDER BY p.views DESC, p.created_at DESC LIMIT ?",
            &binds,
        )
        .await
    }

    async fn related(&self, post: &Post, limit: i64) -> Result<Vec<PostSummary>> {
        let binds = [
            QueryArg::Int(post.id),
            QueryArg::Int(post.category_id),
            QueryArg::Int(post.id),
            QueryArg::Int(limit),
        ];
        self.fetch_summaries(
            r#"
            WHERE p.status = 'published'
              AND p.id <> ?
              AND (p.category_id = ?
                   OR p.id IN (SELECT pt.post_id FROM post_tags pt
                               WHERE pt.tag_id IN (SELECT tag_id FROM post_tags WHERE post_id = ?)))
            ORDER BY p.created_at DESC, p.id DESC
            LIMIT ?
            "#,
            &binds,
        )
        .await
    }

    async fn all_published(&self) -> Result<Vec<PostSummary>> {
        self.fetch_summaries(
            "WHERE p.status = 'published' ORDER BY p.updated_at DESC, p.id DESC",
            &[],
        )
        .await
    }

    async fn latest_update_by_category(&self) -> Result<HashMap<i64, DateTime<Utc>>> {
        let rows = sqlx::query(
            r#"
            SELECT category_id, MAX(updated_at) AS last_updated
            FROM posts
            WHERE status = 'published'
            GROUP BY category_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to read category update times")?;

        let mut latest = HashMap::new();
        for row in rows {
            let raw: String = row.get("last_updated");
            let parsed = DateTime::parse_from_rfc3339(&raw)
                .map(|dt| dt.with_timezone(&Utc))
                .or_else(|_| {
                    chrono::NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S%.f%:z")
                        .map(|naive| naive.and_utc())
                })
                .with_context(|| format!("Invalid timestamp in posts.updated_at: {}", raw))?;
            latest.insert(row.get::<i64, _>("category_id"), parsed);
        }
        Ok(latest)
    }

    async fn set_flags(
        &self,
        id: i64,
        is_featured: Option<bool>,
        is_editors_pick: Option<bool>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE posts
            SET is_featured = COALESCE(?, is_featured),
                is_editors_pick = COALESCE(?, is_editors_pick),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(is_featured)
        .bind(is_editors_pick)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to update post flags")?;
        Ok(())
    }

    async fn set_image_meta(
        &self,
        id: i64,
        base_name: &str,
        width: i64,
        height: i64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE posts SET image_base_name = ?, image_width = ?, image_height = ? WHERE id = ?",
        )
        .bind(base_name)
        .bind(width)
        .bind(height)
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to store image metadata")?;
        Ok(())
    }

    async fn with_images(&self) -> Result<Vec<Post>> {
        let sql = format!(
            "SELECT {} FROM posts p WHERE p.featured_image IS NOT NULL AND p.featured_image <> '' ORDER BY p.id",
            POST_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list posts with images")?;

        rows.iter().map(row_to_post).collect()
    }

    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM posts WHERE slug = ? AND id <> ?")
            .bind(slug)
            .bind(exclude_id.unwrap_or(0))
            .fetch_one(&self.pool)
            .await
            .context("Failed to check post slug")?;
        Ok(row.get::<i64, _>("count") > 0)
    }
}

fn row_to_post(row: &SqliteRow) -> Result<Post> {
    let status_str: String = row.get("status");
    let status = PublishStatus::from_str(&status_str)
        .with_context(|| format!("Invalid status in database: {}", status_str))?;

    Ok(Post {
        id: row.get("id"),
        title: row.get("title"),
        slug: row.get("slug"),
        category_id: row.get("category_id"),
        author_id: row.get("author_id"),
        featured_image: row.get("featured_image"),
        short_description: row.get("short_description"),
        blog_body: row.get("blog_body"),
        status,
        is_featured: row.get("is_featured"),
        is_editors_pick: row.get("is_editors_pick"),
        views: row.get("views"),
        seo_title: row.get("seo_title"),
        seo_description: row.get("seo_description"),
        seo_keywords: row.get("seo_keywords"),
        image_base_name: row.get("image_base_name"),
        image_width: row.get("image_width"),
        image_height: row.get("image_height"),
        published_at: row.get("published_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_summary(row: &SqliteRow) -> Result<PostSummary> {
    Ok(PostSummary {
        post: row_to_post(row)?,
        category_name: row.get("category_name"),
        category_slug: row.get("category_slug"),
        author_name: row.get("author_name"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    struct Fixture {
        pool: DbPool,
        repo: SqlxPostRepository,
        category_id: i64,
        author_id: i64,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let now = Utc::now();
        let author_id = sqlx::query(
            "INSERT INTO users (username, first_name, last_name, date_joined) VALUES ('ann', 'Ann', 'Lee', ?)",
        )
        .bind(now)
        .execute(&pool)
        .await
        .unwrap()
        .last_insert_rowid();
        let category_id = sqlx::query(
            "INSERT INTO categories (category_name, slug, created_at, updated_at) VALUES ('Rust', 'rust', ?, ?)",
        )
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await
        .unwrap()
        .last_insert_rowid();

        Fixture {
            repo: SqlxPostRepository::new(pool.clone()),
            pool,
            category_id,
            author_id,
        }
    }

    fn post(fx: &Fixture, slug: &str, status: PublishStatus) -> Post {
        let mut post = Post::new(slug.to_uppercase(), slug.to_string(), fx.category_id, fx.author_id);
        post.short_description = format!("about {}", slug);
        post.blog_body = "body text".to_string();
        post.status = status;
        post
    }

    #[tokio::test]
    async fn test_create_and_summary() {
        let fx = setup().await;
        let created = fx
            .repo
            .create(&post(&fx, "hello", PublishStatus::Published))
            .await
            .unwrap();

        let summary = fx.repo.get_summary(created.id).await.unwrap().unwrap();
        assert_eq!(summary.category_slug, "rust");
        assert_eq!(summary.author_name, "Ann Lee");
        assert_eq!(summary.url(), "/rust/hello/");
    }

    #[tokio::test]
    async fn test_list_filters_status_and_search() {
        let fx = setup().await;
        fx.repo.create(&post(&fx, "one", PublishStatus::Published)).await.unwrap();
        fx.repo.create(&post(&fx, "two", PublishStatus::Draft)).await.unwrap();
        let mut three = post(&fx, "three", PublishStatus::Published);
        three.blog_body = "Talks about Tokio".to_string();
        fx.repo.create(&three).await.unwrap();

        let (items, total) = fx
            .repo
            .list(&PostQuery::published(), &ListParams::new(1, 10))
            .await
            .unwrap();
        assert_eq!(total, 2);
        assert_eq!(items.len(), 2);

        let (hits, total) = fx
            .repo
            .list(&PostQuery::published().with_search("tokio"), &ListParams::default())
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(hits[0].post.slug, "three");

        let (none, _) = fx
            .repo
            .list(&PostQuery::published().with_search("100%"), &ListParams::default())
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_featured_falls_back_to_latest() {
        let fx = setup().await;
        let first = fx.repo.create(&post(&fx, "first", PublishStatus::Published)).await.unwrap();
        let second = fx.repo.create(&post(&fx, "second", PublishStatus::Published)).await.unwrap();

        let featured = fx.repo.featured().await.unwrap().unwrap();
        assert_eq!(featured.post.id, second.id);

        fx.repo.set_flags(first.id, Some(true), None).await.unwrap();
        let featured = fx.repo.featured().await.unwrap().unwrap();
        assert_eq!(featured.post.id, first.id);
    }

    #[tokio::test]
    async fn test_delete_removes_comments() {
        let fx = setup().await;
        let created = fx.repo.create(&post(&fx, "gone", PublishStatus::Published)).await.unwrap();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO comments (content_type, object_id, user_id, comment, created_at, updated_at) VALUES ('post', ?, ?, 'soon to vanish', ?, ?)",
        )
        .bind(created.id)
        .bind(fx.author_id)
        .bind(now)
        .bind(now)
        .execute(&fx.pool)
        .await
        .unwrap();

        fx.repo.delete(created.id).await.unwrap();
        assert!(fx.repo.get_by_id(created.id).await.unwrap().is_none());
        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments")
            .fetch_one(&fx.pool)
            .await
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn test_views_and_most_viewed() {
        let fx = setup().await;
        let a = fx.repo.create(&post(&fx, "a", PublishStatus::Published)).await.unwrap();
        let b = fx.repo.create(&post(&fx, "b", PublishStatus::Published)).await.unwrap();
        for _ in 0..3 {
            fx.repo.increment_views(a.id).await.unwrap();
        }
        fx.repo.increment_views(b.id).await.unwrap();

        let top = fx.repo.most_viewed(2).await.unwrap();
        assert_eq!(top[0].post.id, a.id);
        assert_eq!(top[0].post.views, 3);
    }

    #[tokio::test]
    async fn test_related_excludes_self_and_drafts() {
        let fx = setup().await;
        let main = fx.repo.create(&post(&fx, "main", PublishStatus::Published)).await.unwrap();
        fx.repo.create(&post(&fx, "sibling", PublishStatus::Published)).await.unwrap();
        fx.repo.create(&post(&fx, "draft", PublishStatus::Draft)).await.unwrap();

        let related = fx.repo.related(&main, 5).await.unwrap();
        let slugs: Vec<_> = related.iter().map(|s| s.post.slug.as_str()).collect();
        assert_eq!(slugs, vec!["sibling"]);
    }

    #[tokio::test]
    async fn test_latest_update_by_category() {
        let fx = setup().await;
        fx.repo.create(&post(&fx, "p", PublishStatus::Published)).await.unwrap();
        let latest = fx.repo.latest_update_by_category().await.unwrap();
        assert!(latest.contains_key(&fx.category_id));
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }
}
