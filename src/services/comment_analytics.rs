//! Comment analytics and CSV export

use crate::db::repositories::CommentRepository;
use crate::models::{CommentAnalyticsReport, UserCommentStats};
use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use std::sync::Arc;

const TRENDING_WINDOW_HOURS: i64 = 24;
const TRENDING_LIMIT: i64 = 10;
const TOP_COMMENTERS_LIMIT: i64 = 10;
const EXPORT_COMMENT_LENGTH: usize = 100;

pub struct CommentAnalyticsService {
    repo: Arc<dyn CommentRepository>,
}

impl CommentAnalyticsService {
    pub fn new(repo: Arc<dyn CommentRepository>) -> Self {
        Self { repo }
    }

    /// Site-wide engagement, the last day's busiest threads and top commenters
    pub async fn report(&self) -> Result<CommentAnalyticsReport> {
        let engagement = self
            .repo
            .engagement()
            .await
            .context("Failed to compute engagement")?;
        let since = Utc::now() - Duration::hours(TRENDING_WINDOW_HOURS);
        let trending = self
            .repo
            .trending_since(since, TRENDING_LIMIT)
            .await
            .context("Failed to load trending threads")?;
        let top_commenters = self
            .repo
            .top_commenters(TOP_COMMENTERS_LIMIT)
            .await
            .context("Failed to load top commenters")?;

        Ok(CommentAnalyticsReport {
            engagement,
            trending,
            top_commenters,
        })
    }

    pub async fn user_stats(&self, user_id: i64) -> Result<UserCommentStats> {
        self.repo
            .user_stats(user_id)
            .await
            .context("Failed to compute user comment stats")
    }

    /// Every comment as CSV: id, user, object, truncated text, created, is-reply
    pub async fn export_csv(&self) -> Result<String> {
        let comments = self
            .repo
            .list_all()
            .await
            .context("Failed to load comments for export")?;

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(["ID", "User", "Content Object", "Comment", "Created", "Is Reply"])?;
        for view in &comments {
            let c = &view.comment;
            writer.write_record([
                c.id.to_string(),
                view.author.username.clone(),
                format!("{}:{}", c.content_type, c.object_id),
                c.comment.chars().take(EXPORT_COMMENT_LENGTH).collect(),
                c.created_at.format("%Y-%m-%d %H:%M").to_string(),
                if c.is_reply() { "Yes" } else { "No" }.to_string(),
            ])?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to finish CSV: {}", e))?;
        String::from_utf8(bytes).context("CSV output was not UTF-8")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        CategoryRepository, PostRepository, SqlxCategoryRepository, SqlxCommentRepository,
        SqlxPostRepository, SqlxUserRepository, UserRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::{Category, Comment, ContentType, Post, User};

    async fn setup() -> (CommentAnalyticsService, Arc<dyn CommentRepository>, i64, i64, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let users = SqlxUserRepository::new(pool.clone());
        let ann = users
            .create(&User::new("ann".into(), "ann@example.com".into(), String::new()), false)
            .await
            .unwrap();
        let ben = users
            .create(&User::new("ben".into(), "ben@example.com".into(), String::new()), false)
            .await
            .unwrap();
        let category = SqlxCategoryRepository::new(pool.clone())
            .create(&Category::new("Misc".into(), "misc".into()))
            .await
            .unwrap();
        let post = SqlxPostRepository::new(pool.clone())
            .create(&Post::new("Post".into(), "post".into(), category.id, ann.id))
            .await
            .unwrap();

        let repo = SqlxCommentRepository::boxed(pool);
        (CommentAnalyticsService::new(repo.clone()), repo, post.id, ann.id, ben.id)
    }

    #[tokio::test]
    async fn test_report_and_user_stats() {
        let (service, repo, post_id, ann, ben) = setup().await;
        let root = repo
            .create(&Comment::new(ContentType::Post, post_id, None, ann, "first comment here".into()))
            .await
            .unwrap();
        repo.create(&Comment::new(ContentType::Post, post_id, Some(root.id), ben, "a reply to ann".into()))
            .await
            .unwrap();
        repo.create(&Comment::new(ContentType::Post, post_id, None, ben, "another from ben".into()))
            .await
            .unwrap();

        let report = service.report().await.unwrap();
        assert_eq!(report.engagement.total_comments, 3);
        assert_eq!(report.engagement.unique_commenters, 2);
        assert_eq!(report.trending.len(), 1);
        assert_eq!(report.trending[0].comment_count, 3);
        assert_eq!(report.top_commenters[0].username, "ben");

        let ann_stats = service.user_stats(ann).await.unwrap();
        assert_eq!(ann_stats.total_comments, 1);
        assert_eq!(ann_stats.comments_received, 1);
    }

    #[tokio::test]
    async fn test_export_csv() {
        let (service, repo, post_id, ann, _) = setup().await;
        let long = format!("needs, quoting {}", "x".repeat(150));
        repo.create(&Comment::new(ContentType::Post, post_id, None, ann, long))
            .await
            .unwrap();

        let csv = service.export_csv().await.unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("ID,User,Content Object,Comment,Created,Is Reply"));
        let row = lines.next().unwrap();
        assert!(row.contains("ann,post:"));
        assert!(row.contains("\"needs, quoting"));
        assert!(row.ends_with(",No"));
    }
}
