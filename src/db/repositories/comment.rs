//! Comment repository
//!
//! Comments, flags and likes, plus the aggregate queries behind
//! moderation and analytics.

use crate::db::DbPool;
use crate::models::{
    Comment, CommentAuthor, CommentFlag, CommentStats, CommentView, CommenterCount, ContentType,
    EngagementStats, FlagReason, FlagView, LikeToggle, ListParams, ModerationFilter,
    TrendingObject, UserCommentStats,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::str::FromStr;
use std::sync::Arc;

const COMMENT_COLUMNS: &str = "c.id, c.content_type, c.object_id, c.parent_id, c.user_id, \
     c.comment, c.is_edited, c.is_approved, c.is_flagged, c.created_at, c.updated_at";

const VIEW_EXTRA: &str = r#"
    u.username AS author_username,
    COALESCE(NULLIF(TRIM(u.first_name || ' ' || u.last_name), ''), u.username) AS author_name,
    pr.avatar AS author_avatar,
    (SELECT COUNT(*) FROM comment_likes l WHERE l.comment_id = c.id) AS like_count,
    (SELECT COUNT(*) FROM comment_flags f WHERE f.comment_id = c.id) AS flag_count
"#;

const VIEW_JOIN: &str = r#"
    FROM comments c
    JOIN users u ON u.id = c.user_id
    LEFT JOIN profiles pr ON pr.user_id = c.user_id
"#;

/// Comment repository trait
#[async_trait]
pub trait CommentRepository: Send + Sync {
    async fn create(&self, comment: &Comment) -> Result<Comment>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>>;

    async fn get_view(&self, id: i64) -> Result<Option<CommentView>>;

    /// Replace the text and mark the comment edited
    async fn update_text(&self, id: i64, text: &str) -> Result<Comment>;

    /// Delete a comment and, through the parent FK, its replies
    async fn delete(&self, id: i64) -> Result<()>;

    /// Number of ancestors of a comment
    async fn depth(&self, id: i64) -> Result<u32>;

    /// Every comment on an object, oldest first
    async fn list_for_object(
        &self,
        content_type: ContentType,
        object_id: i64,
        approved_only: bool,
    ) -> Result<Vec<CommentView>>;

    /// Approved top-level comments, newest first
    async fn list_top_level(
        &self,
        content_type: ContentType,
        object_id: i64,
        params: &ListParams,
    ) -> Result<(Vec<CommentView>, i64)>;

    /// Approved direct replies, oldest first
    async fn list_replies(&self, parent_id: i64) -> Result<Vec<CommentView>>;

    async fn list_by_user(&self, user_id: i64, params: &ListParams)
        -> Result<(Vec<CommentView>, i64)>;

    /// Approved comments containing `q`, newest first
    async fn search(&self, q: &str, limit: i64) -> Result<Vec<CommentView>>;

    async fn moderation_queue(&self, filter: ModerationFilter, limit: i64)
        -> Result<Vec<CommentView>>;

    /// Every comment, newest first, for export
    async fn list_all(&self) -> Result<Vec<CommentView>>;

    async fn set_approved(&self, id: i64, approved: bool, clear_flag: bool) -> Result<()>;

    async fn set_flagged(&self, id: i64, flagged: bool) -> Result<()>;

    async fn stats_for_object(&self, content_type: ContentType, object_id: i64)
        -> Result<CommentStats>;

    /// Site-wide totals for the dashboard: (all, pending, flagged)
    async fn counts(&self) -> Result<(i64, i64, i64)>;

    async fn like_count(&self, comment_id: i64) -> Result<i64>;

    /// Add the like if absent, remove it if present
    async fn toggle_like(&self, comment_id: i64, user_id: i64) -> Result<LikeToggle>;

    async fn create_flag(&self, flag: &CommentFlag) -> Result<CommentFlag>;

    async fn has_flagged(&self, comment_id: i64, user_id: i64) -> Result<bool>;

    async fn flag_count(&self, comment_id: i64) -> Result<i64>;

    async fn list_flags(&self, comment_id: i64) -> Result<Vec<FlagView>>;

    async fn get_flag(&self, id: i64) -> Result<Option<CommentFlag>>;

    async fn mark_flag_reviewed(&self, id: i64) -> Result<()>;

    async fn engagement(&self) -> Result<EngagementStats>;

    /// Objects with the most comments since `since`
    async fn trending_since(&self, since: DateTime<Utc>, limit: i64)
        -> Result<Vec<TrendingObject>>;

    async fn top_commenters(&self, limit: i64) -> Result<Vec<CommenterCount>>;

    async fn user_stats(&self, user_id: i64) -> Result<UserCommentStats>;
}

/// SQLx-based comment repository implementation
pub struct SqlxCommentRepository {
    pool: DbPool,
}

impl SqlxCommentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DbPool) -> Arc<dyn CommentRepository> {
        Arc::new(Self::new(pool))
    }

    fn view_sql(tail: &str) -> String {
        format!("SELECT {}, {} {} {}", COMMENT_COLUMNS, VIEW_EXTRA, VIEW_JOIN, tail)
    }

    async fn scalar(&self, sql: &str, id: i64, what: &str) -> Result<i64> {
        let value: i64 = sqlx::query_scalar(sql)
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("Failed to count {}", what))?;
        Ok(value)
    }
}

#[async_trait]
impl CommentRepository for SqlxCommentRepository {
    async fn create(&self, comment: &Comment) -> Result<Comment> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO comments (content_type, object_id, parent_id, user_id, comment,
                                  is_edited, is_approved, is_flagged, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(comment.content_type.as_str())
        .bind(comment.object_id)
        .bind(comment.parent_id)
        .bind(comment.user_id)
        .bind(&comment.comment)
        .bind(comment.is_edited)
        .bind(comment.is_approved)
        .bind(comment.is_flagged)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to create comment")?;

        Ok(Comment {
            id: result.last_insert_rowid(),
            created_at: now,
            updated_at: now,
            ..comment.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>> {
        let sql = format!("SELECT {} FROM comments c WHERE c.id = ?", COMMENT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get comment")?;

        row.as_ref().map(row_to_comment).transpose()
    }

    async fn get_view(&self, id: i64) -> Result<Option<CommentView>> {
        let row = sqlx::query(&Self::view_sql("WHERE c.id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get comment")?;

        row.as_ref().map(row_to_view).transpose()
    }

    async fn update_text(&self, id: i64, text: &str) -> Result<Comment> {
        sqlx::query("UPDATE comments SET comment = ?, is_edited = 1, updated_at = ? WHERE id = ?")
            .bind(text)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update comment")?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Comment not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM comments WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete comment")?;
        Ok(())
    }

    async fn depth(&self, id: i64) -> Result<u32> {
        let depth: i64 = sqlx::query_scalar(
            r#"
            WITH RECURSIVE ancestors(id, parent_id) AS (
                SELECT id, parent_id FROM comments WHERE id = ?
                UNION ALL
                SELECT c.id, c.parent_id FROM comments c
                JOIN ancestors a ON c.id = a.parent_id
            )
            SELECT COUNT(*) - 1 FROM ancestors
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to compute comment depth")?;

        Ok(depth.max(0) as u32)
    }

    async fn list_for_object(
        &self,
        content_type: ContentType,
        object_id: i64,
        approved_only: bool,
    ) -> Result<Vec<CommentView>> {
        let sql = Self::view_sql(
            "WHERE c.content_type = ? AND c.object_id = ? AND (c.is_approved = 1 OR ? = 0) \
             ORDER BY c.created_at, c.id",
        );
        let rows = sqlx::query(&sql)
            .bind(content_type.as_str())
            .bind(object_id)
            .bind(approved_only)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list comments")?;

        rows.iter().map(row_to_view).collect()
    }

    async fn list_top_level(
        &self,
        content_type: ContentType,
        object_id: i64,
        params: &ListParams,
    ) -> Result<(Vec<CommentView>, i64)> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM comments
            WHERE content_type = ? AND object_id = ? AND parent_id IS NULL AND is_approved = 1
            "#,
        )
        .bind(content_type.as_str())
        .bind(object_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to count comments")?;

        let sql = Self::view_sql(
            "WHERE c.content_type = ? AND c.object_id = ? AND c.parent_id IS NULL \
             AND c.is_approved = 1 \
             ORDER BY c.created_at DESC, c.id DESC LIMIT ? OFFSET ?",
        );
        let rows = sqlx::query(&sql)
            .bind(content_type.as_str())
            .bind(object_id)
            .bind(params.limit())
            .bind(params.offset())
            .fetch_all(&self.pool)
            .await
            .context("Failed to list comments")?;

        let items = rows.iter().map(row_to_view).collect::<Result<Vec<_>>>()?;
        Ok((items, total))
    }

    async fn list_replies(&self, parent_id: i64) -> Result<Vec<CommentView>> {
        let sql = Self::view_sql(
            "WHERE c.parent_id = ? AND c.is_approved = 1 ORDER BY c.created_at, c.id",
        );
        let rows = sqlx::query(&sql)
            .bind(parent_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list replies")?;

        rows.iter().map(row_to_view).collect()
    }

    async fn list_by_user(
        &self,
        user_id: i64,
        params: &ListParams,
    ) -> Result<(Vec<CommentView>, i64)> {
        let total = self
            .scalar("SELECT COUNT(*) FROM comments WHERE user_id = ?", user_id, "user comments")
            .await?;

        let sql = Self::view_sql(
            "WHERE c.user_id = ? ORDER BY c.created_at DESC, c.id DESC LIMIT ? OFFSET ?",
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(params.limit())
            .bind(params.offset())
            .fetch_all(&self.pool)
            .await
            .context("Failed to list user comments")?;

        let items = rows.iter().map(row_to_view).collect::<Result<Vec<_>>>()?;
        Ok((items, total))
    }

    async fn search(&self, q: &str, limit: i64) -> Result<Vec<CommentView>> {
        let escaped: String = q
            .chars()
            .flat_map(|c| match c {
                '%' | '_' | '\\' => vec!['\\', c],
                _ => vec![c],
            })
            .collect();
        let sql = Self::view_sql(
            "WHERE c.is_approved = 1 AND c.comment LIKE ? ESCAPE '\\' \
             ORDER BY c.created_at DESC, c.id DESC LIMIT ?",
        );
        let rows = sqlx::query(&sql)
            .bind(format!("%{}%", escaped))
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .context("Failed to search comments")?;

        rows.iter().map(row_to_view).collect()
    }

    async fn moderation_queue(
        &self,
        filter: ModerationFilter,
        limit: i64,
    ) -> Result<Vec<CommentView>> {
        let condition = match filter {
            ModerationFilter::Pending => "WHERE c.is_approved = 0",
            ModerationFilter::Flagged => "WHERE c.is_flagged = 1",
            ModerationFilter::All => "WHERE c.is_approved = 0 OR c.is_flagged = 1",
        };
        let sql = Self::view_sql(&format!(
            "{} ORDER BY c.created_at DESC, c.id DESC LIMIT ?",
            condition
        ));
        let rows = sqlx::query(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .context("Failed to load moderation queue")?;

        rows.iter().map(row_to_view).collect()
    }

    async fn list_all(&self) -> Result<Vec<CommentView>> {
        let rows = sqlx::query(&Self::view_sql("ORDER BY c.created_at DESC, c.id DESC"))
            .fetch_all(&self.pool)
            .await
            .context("Failed to list comments")?;

        rows.iter().map(row_to_view).collect()
    }

    async fn set_approved(&self, id: i64, approved: bool, clear_flag: bool) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE comments
            SET is_approved = ?, is_flagged = CASE WHEN ? THEN 0 ELSE is_flagged END
            WHERE id = ?
            "#,
        )
        .bind(approved)
        .bind(clear_flag)
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to moderate comment")?;
        Ok(())
    }

    async fn set_flagged(&self, id: i64, flagged: bool) -> Result<()> {
        sqlx::query("UPDATE comments SET is_flagged = ? WHERE id = ?")
            .bind(flagged)
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to flag comment")?;
        Ok(())
    }

    async fn stats_for_object(
        &self,
        content_type: ContentType,
        object_id: i64,
    ) -> Result<CommentStats> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total,
                   COALESCE(SUM(is_approved = 1), 0) AS approved,
                   COALESCE(SUM(is_approved = 0), 0) AS pending,
                   COALESCE(SUM(is_flagged = 1), 0) AS flagged,
                   COUNT(DISTINCT user_id) AS commenters
            FROM comments
            WHERE content_type = ? AND object_id = ?
            "#,
        )
        .bind(content_type.as_str())
        .bind(object_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to compute comment stats")?;

        Ok(CommentStats {
            total_comments: row.get("total"),
            approved_comments: row.get("approved"),
            pending_comments: row.get("pending"),
            flagged_comments: row.get("flagged"),
            unique_commenters: row.get("commenters"),
        })
    }

    async fn counts(&self) -> Result<(i64, i64, i64)> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total,
                   COALESCE(SUM(is_approved = 0), 0) AS pending,
                   COALESCE(SUM(is_flagged = 1), 0) AS flagged
            FROM comments
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to count comments")?;

        Ok((row.get("total"), row.get("pending"), row.get("flagged")))
    }

    async fn like_count(&self, comment_id: i64) -> Result<i64> {
        self.scalar(
            "SELECT COUNT(*) FROM comment_likes WHERE comment_id = ?",
            comment_id,
            "likes",
        )
        .await
    }

    async fn toggle_like(&self, comment_id: i64, user_id: i64) -> Result<LikeToggle> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let removed = sqlx::query("DELETE FROM comment_likes WHERE comment_id = ? AND user_id = ?")
            .bind(comment_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .context("Failed to remove like")?
            .rows_affected();

        if removed == 0 {
            sqlx::query(
                "INSERT INTO comment_likes (comment_id, user_id, created_at) VALUES (?, ?, ?)",
            )
            .bind(comment_id)
            .bind(user_id)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await
            .context("Failed to add like")?;
        }

        let like_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM comment_likes WHERE comment_id = ?")
                .bind(comment_id)
                .fetch_one(&mut *tx)
                .await
                .context("Failed to count likes")?;

        tx.commit().await.context("Failed to commit like")?;

        Ok(LikeToggle {
            liked: removed == 0,
            like_count,
        })
    }

    async fn create_flag(&self, flag: &CommentFlag) -> Result<CommentFlag> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO comment_flags (comment_id, user_id, reason, description, is_reviewed,
                                       created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(flag.comment_id)
        .bind(flag.user_id)
        .bind(flag.reason.as_str())
        .bind(&flag.description)
        .bind(flag.is_reviewed)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to create flag")?;

        Ok(CommentFlag {
            id: result.last_insert_rowid(),
            created_at: now,
            ..flag.clone()
        })
    }

    async fn has_flagged(&self, comment_id: i64, user_id: i64) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM comment_flags WHERE comment_id = ? AND user_id = ?",
        )
        .bind(comment_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to check flag")?;
        Ok(count > 0)
    }

    async fn flag_count(&self, comment_id: i64) -> Result<i64> {
        self.scalar(
            "SELECT COUNT(*) FROM comment_flags WHERE comment_id = ?",
            comment_id,
            "flags",
        )
        .await
    }

    async fn list_flags(&self, comment_id: i64) -> Result<Vec<FlagView>> {
        let rows = sqlx::query(
            r#"
            SELECT f.id, f.comment_id, f.user_id, f.reason, f.description, f.is_reviewed,
                   f.created_at, u.username AS reporter
            FROM comment_flags f
            JOIN users u ON u.id = f.user_id
            WHERE f.comment_id = ?
            ORDER BY f.created_at DESC, f.id DESC
            "#,
        )
        .bind(comment_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list flags")?;

        rows.iter()
            .map(|row| {
                Ok(FlagView {
                    flag: row_to_flag(row)?,
                    reporter: row.get("reporter"),
                })
            })
            .collect()
    }

    async fn get_flag(&self, id: i64) -> Result<Option<CommentFlag>> {
        let row = sqlx::query(
            r#"
            SELECT id, comment_id, user_id, reason, description, is_reviewed, created_at
            FROM comment_flags WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get flag")?;

        row.as_ref().map(row_to_flag).transpose()
    }

    async fn mark_flag_reviewed(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE comment_flags SET is_reviewed = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to review flag")?;
        Ok(())
    }

    async fn engagement(&self) -> Result<EngagementStats> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total,
                   COUNT(DISTINCT user_id) AS commenters,
                   COALESCE(SUM(parent_id IS NOT NULL), 0) AS replies
            FROM comments
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to compute engagement")?;

        let total: i64 = row.get("total");
        let commenters: i64 = row.get("commenters");
        let replies: i64 = row.get("replies");

        Ok(EngagementStats {
            total_comments: total,
            unique_commenters: commenters,
            avg_comments_per_user: total as f64 / commenters.max(1) as f64,
            reply_percentage: replies as f64 / total.max(1) as f64 * 100.0,
            most_active_commenter: self.top_commenters(1).await?.into_iter().next(),
        })
    }

    async fn trending_since(
        &self,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<TrendingObject>> {
        let rows = sqlx::query(
            r#"
            SELECT content_type, object_id, COUNT(*) AS comment_count
            FROM comments
            WHERE created_at >= ?
            GROUP BY content_type, object_id
            ORDER BY comment_count DESC, object_id
            LIMIT ?
            "#,
        )
        .bind(since)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to compute trending objects")?;

        rows.iter().map(row_to_trending).collect()
    }

    async fn top_commenters(&self, limit: i64) -> Result<Vec<CommenterCount>> {
        let rows = sqlx::query(
            r#"
            SELECT u.username AS username, COUNT(c.id) AS count
            FROM comments c
            JOIN users u ON u.id = c.user_id
            GROUP BY c.user_id, u.username
            ORDER BY count DESC, u.username
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list top commenters")?;

        Ok(rows
            .iter()
            .map(|row| CommenterCount {
                username: row.get("username"),
                count: row.get("count"),
            })
            .collect())
    }

    async fn user_stats(&self, user_id: i64) -> Result<UserCommentStats> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total,
                   COALESCE(SUM(parent_id IS NOT NULL), 0) AS replies,
                   COALESCE(AVG(LENGTH(comment)), 0.0) AS avg_length
            FROM comments
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to compute user comment stats")?;

        let received = self
            .scalar(
                r#"
                SELECT COUNT(*) FROM comments c
                JOIN comments parent ON parent.id = c.parent_id
                WHERE parent.user_id = ?
                "#,
                user_id,
                "received replies",
            )
            .await?;

        let most = sqlx::query(
            r#"
            SELECT content_type, object_id, COUNT(*) AS comment_count
            FROM comments
            WHERE user_id = ?
            GROUP BY content_type, object_id
            ORDER BY comment_count DESC, object_id
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to find most commented object")?;

        Ok(UserCommentStats {
            total_comments: row.get("total"),
            total_replies: row.get("replies"),
            comments_received: received,
            avg_comment_length: row.get("avg_length"),
            most_commented_object: most.as_ref().map(row_to_trending).transpose()?,
        })
    }
}

fn parse_content_type(row: &SqliteRow) -> Result<ContentType> {
    let raw: String = row.get("content_type");
    ContentType::from_str(&raw).with_context(|| format!("Invalid content type in database: {}", raw))
}

fn row_to_comment(row: &SqliteRow) -> Result<Comment> {
    Ok(Comment {
        id: row.get("id"),
        content_type: parse_content_type(row)?,
        object_id: row.get("object_id"),
        parent_id: row.get("parent_id"),
        user_id: row.get("user_id"),
        comment: row.get("comment"),
        is_edited: row.get("is_edited"),
        is_approved: row.get("is_approved"),
        is_flagged: row.get("is_flagged"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_view(row: &SqliteRow) -> Result<CommentView> {
    let comment = row_to_comment(row)?;
    Ok(CommentView {
        author: CommentAuthor {
            id: comment.user_id,
            username: row.get("author_username"),
            display_name: row.get("author_name"),
            avatar: row.get("author_avatar"),
        },
        like_count: row.get("like_count"),
        flag_count: row.get("flag_count"),
        comment,
    })
}

fn row_to_flag(row: &SqliteRow) -> Result<CommentFlag> {
    let reason: String = row.get("reason");
    Ok(CommentFlag {
        id: row.get("id"),
        comment_id: row.get("comment_id"),
        user_id: row.get("user_id"),
        reason: FlagReason::from_str(&reason)
            .with_context(|| format!("Invalid flag reason in database: {}", reason))?,
        description: row.get("description"),
        is_reviewed: row.get("is_reviewed"),
        created_at: row.get("created_at"),
    })
}

fn row_to_trending(row: &SqliteRow) -> Result<TrendingObject> {
    Ok(TrendingObject {
        content_type: parse_content_type(row)?,
        object_id: row.get("object_id"),
        comment_count: row.get("comment_count"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    struct Fixture {
        repo: SqlxCommentRepository,
        alice: i64,
        bob: i64,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let mut ids = Vec::new();
        for name in ["alice", "bob"] {
            let id = sqlx::query("INSERT INTO users (username, date_joined) VALUES (?, ?)")
                .bind(name)
                .bind(Utc::now())
                .execute(&pool)
                .await
                .unwrap()
                .last_insert_rowid();
            ids.push(id);
        }
        Fixture {
            repo: SqlxCommentRepository::new(pool),
            alice: ids[0],
            bob: ids[1],
        }
    }

    async fn add(fx: &Fixture, user: i64, parent: Option<i64>, text: &str) -> Comment {
        fx.repo
            .create(&Comment::new(ContentType::Post, 1, parent, user, text.to_string()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_depth_follows_parent_chain() {
        let fx = setup().await;
        let root = add(&fx, fx.alice, None, "root comment").await;
        let child = add(&fx, fx.bob, Some(root.id), "child comment").await;
        let grandchild = add(&fx, fx.alice, Some(child.id), "grandchild comment").await;

        assert_eq!(fx.repo.depth(root.id).await.unwrap(), 0);
        assert_eq!(fx.repo.depth(child.id).await.unwrap(), 1);
        assert_eq!(fx.repo.depth(grandchild.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_delete_cascades_to_replies() {
        let fx = setup().await;
        let root = add(&fx, fx.alice, None, "root comment").await;
        let child = add(&fx, fx.bob, Some(root.id), "child comment").await;

        fx.repo.delete(root.id).await.unwrap();
        assert!(fx.repo.get_by_id(child.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_toggle_like_is_per_user() {
        let fx = setup().await;
        let comment = add(&fx, fx.alice, None, "likeable comment").await;

        let first = fx.repo.toggle_like(comment.id, fx.bob).await.unwrap();
        assert_eq!(first, LikeToggle { liked: true, like_count: 1 });

        let other = fx.repo.toggle_like(comment.id, fx.alice).await.unwrap();
        assert_eq!(other.like_count, 2);

        let undo = fx.repo.toggle_like(comment.id, fx.bob).await.unwrap();
        assert_eq!(undo, LikeToggle { liked: false, like_count: 1 });
    }

    #[tokio::test]
    async fn test_flags_unique_per_user() {
        let fx = setup().await;
        let comment = add(&fx, fx.alice, None, "questionable").await;
        let flag = CommentFlag {
            id: 0,
            comment_id: comment.id,
            user_id: fx.bob,
            reason: FlagReason::Spam,
            description: String::new(),
            is_reviewed: false,
            created_at: Utc::now(),
        };

        fx.repo.create_flag(&flag).await.unwrap();
        assert!(fx.repo.has_flagged(comment.id, fx.bob).await.unwrap());
        assert!(fx.repo.create_flag(&flag).await.is_err());

        let flags = fx.repo.list_flags(comment.id).await.unwrap();
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].reporter, "bob");

        fx.repo.mark_flag_reviewed(flags[0].flag.id).await.unwrap();
        assert!(fx.repo.get_flag(flags[0].flag.id).await.unwrap().unwrap().is_reviewed);
    }

    #[tokio::test]
    async fn test_stats_and_moderation_queue() {
        let fx = setup().await;
        let a = add(&fx, fx.alice, None, "approved one").await;
        let b = add(&fx, fx.bob, None, "pending one").await;
        fx.repo.set_approved(b.id, false, false).await.unwrap();
        fx.repo.set_flagged(a.id, true).await.unwrap();

        let stats = fx.repo.stats_for_object(ContentType::Post, 1).await.unwrap();
        assert_eq!(
            stats,
            CommentStats {
                total_comments: 2,
                approved_comments: 1,
                pending_comments: 1,
                flagged_comments: 1,
                unique_commenters: 2,
            }
        );

        let pending = fx.repo.moderation_queue(ModerationFilter::Pending, 50).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].comment.id, b.id);
        let all = fx.repo.moderation_queue(ModerationFilter::All, 50).await.unwrap();
        assert_eq!(all.len(), 2);

        fx.repo.set_approved(a.id, true, true).await.unwrap();
        assert!(!fx.repo.get_by_id(a.id).await.unwrap().unwrap().is_flagged);
    }

    #[tokio::test]
    async fn test_listing_orders() {
        let fx = setup().await;
        let first = add(&fx, fx.alice, None, "first root").await;
        let second = add(&fx, fx.bob, None, "second root").await;
        let r1 = add(&fx, fx.bob, Some(first.id), "reply one").await;
        let r2 = add(&fx, fx.alice, Some(first.id), "reply two").await;

        let (top, total) = fx
            .repo
            .list_top_level(ContentType::Post, 1, &ListParams::new(1, 10))
            .await
            .unwrap();
        assert_eq!(total, 2);
        assert_eq!(top[0].comment.id, second.id);

        let replies = fx.repo.list_replies(first.id).await.unwrap();
        let ids: Vec<_> = replies.iter().map(|r| r.comment.id).collect();
        assert_eq!(ids, vec![r1.id, r2.id]);
        assert_eq!(replies[0].author.username, "bob");
    }

    #[tokio::test]
    async fn test_analytics_queries() {
        let fx = setup().await;
        let root = add(&fx, fx.alice, None, "alice talks").await;
        add(&fx, fx.bob, Some(root.id), "bob answers").await;
        add(&fx, fx.bob, None, "bob again").await;

        let engagement = fx.repo.engagement().await.unwrap();
        assert_eq!(engagement.total_comments, 3);
        assert_eq!(engagement.unique_commenters, 2);
        assert_eq!(
            engagement.most_active_commenter,
            Some(CommenterCount { username: "bob".into(), count: 2 })
        );

        let trending = fx
            .repo
            .trending_since(Utc::now() - chrono::Duration::days(1), 10)
            .await
            .unwrap();
        assert_eq!(trending[0].comment_count, 3);

        let alice = fx.repo.user_stats(fx.alice).await.unwrap();
        assert_eq!(alice.total_comments, 1);
        assert_eq!(alice.comments_received, 1);
        assert_eq!(alice.total_replies, 0);
    }

    #[tokio::test]
    async fn test_search_escapes_wildcards() {
        let fx = setup().await;
        add(&fx, fx.alice, None, "100% agree with this").await;
        add(&fx, fx.bob, None, "totally unrelated").await;

        assert_eq!(fx.repo.search("100%", 20).await.unwrap().len(), 1);
        assert_eq!(fx.repo.search("_", 20).await.unwrap().len(), 0);
    }
}
