//! Newsletter dispatch
//!
//! When a post is first published, opted-in users get a plain-text notice.
//! Recipients are sent in BCC batches of 50, one message per batch, with
//! the site's own address in `To`. A failed batch is logged and skipped.

use std::sync::Arc;

use crate::db::repositories::UserRepository;
use crate::models::Post;
use crate::services::email::{Mailer, OutgoingEmail};
use anyhow::{Context, Result};
use serde::Serialize;

/// Recipients per message
pub const BATCH_SIZE: usize = 50;

/// Outcome of one newsletter run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    /// Batches attempted
    pub batches: usize,
    /// Recipients in batches that were accepted
    pub sent: usize,
    pub failed_batches: usize,
}

pub struct NewsletterService {
    user_repo: Arc<dyn UserRepository>,
    mailer: Option<Arc<dyn Mailer>>,
    site_url: String,
}

impl NewsletterService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        mailer: Option<Arc<dyn Mailer>>,
        site_url: &str,
    ) -> Self {
        Self {
            user_repo,
            mailer,
            site_url: site_url.trim_end_matches('/').to_string(),
        }
    }

    /// Announce `post` (in the category with slug `category_slug`) to subscribers
    pub async fn dispatch(&self, post: &Post, category_slug: &str) -> Result<DispatchReport> {
        let Some(mailer) = self.mailer.as_ref() else {
            tracing::debug!("SMTP not configured, skipping newsletter for post {}", post.id);
            return Ok(DispatchReport::default());
        };

        let recipients: Vec<String> = self
            .user_repo
            .newsletter_recipients()
            .await
            .context("Failed to load newsletter recipients")?
            .into_iter()
            .map(|user| user.email)
            .collect();

        if recipients.is_empty() {
            tracing::info!("No newsletter subscribers for post {}", post.id);
            return Ok(DispatchReport::default());
        }

        let subject = format!("New Post: {}", post.title);
        let body = self.body(post, category_slug);
        let mut report = DispatchReport::default();

        for batch in recipients.chunks(BATCH_SIZE) {
            report.batches += 1;
            let email = OutgoingEmail {
                to: vec![mailer.from_address().to_string()],
                bcc: batch.to_vec(),
                subject: subject.clone(),
                body: body.clone(),
            };

            match mailer.send(&email).await {
                Ok(()) => {
                    report.sent += batch.len();
                    tracing::info!("Newsletter sent to {} subscribers", batch.len());
                }
                Err(e) => {
                    report.failed_batches += 1;
                    tracing::warn!("Failed to send newsletter batch {}: {:#}", report.batches, e);
                }
            }
        }

        tracing::info!(
            "Newsletter for post {} finished: {} recipients, {} failed batches",
            post.id,
            report.sent,
            report.failed_batches
        );
        Ok(report)
    }

    fn body(&self, post: &Post, category_slug: &str) -> String {
        format!(
            "{title}\n\n{summary}\n\nRead the full post: {base}{path}\n\n--\nYou are receiving this because you subscribed to new posts.\nUnsubscribe: {base}/accounts/unsubscribe\n",
            title = post.title,
            summary = post.short_description.trim(),
            base = self.site_url,
            path = post.path(category_slug),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::SqlxUserRepository;
    use crate::db::{create_test_pool, migrations};
    use crate::models::User;
    use crate::services::email::RecordingMailer;

    async fn setup(subscribers: usize) -> Arc<dyn UserRepository> {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxUserRepository::boxed(pool);

        for i in 0..subscribers {
            let user = User::new(format!("reader{}", i), format!("reader{}@example.com", i), String::new());
            repo.create(&user, true).await.unwrap();
        }
        // Neither of these should receive anything
        repo.create(&User::new("quiet".into(), "quiet@example.com".into(), String::new()), false)
            .await
            .unwrap();
        repo.create(&User::new("noemail".into(), String::new(), String::new()), true)
            .await
            .unwrap();
        repo
    }

    fn post() -> Post {
        let mut post = Post::new("Hello Axum".to_string(), "hello-axum".to_string(), 1, 1);
        post.id = 9;
        post.short_description = "A first look.".to_string();
        post
    }

    #[tokio::test]
    async fn test_batches_of_fifty_in_bcc() {
        let repo = setup(120).await;
        let mailer = Arc::new(RecordingMailer::new());
        let service = NewsletterService::new(repo, Some(mailer.clone()), "https://blog.example/");

        let report = service.dispatch(&post(), "rust").await.unwrap();
        assert_eq!(
            report,
            DispatchReport {
                batches: 3,
                sent: 120,
                failed_batches: 0
            }
        );

        let sent = mailer.sent();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0].bcc.len(), 50);
        assert_eq!(sent[2].bcc.len(), 20);
        assert_eq!(sent[0].to, vec![mailer.from_address().to_string()]);
        assert_eq!(sent[0].subject, "New Post: Hello Axum");
        assert!(sent[0].body.contains("A first look."));
        assert!(sent[0].body.contains("https://blog.example/rust/hello-axum/"));
        assert!(sent[0].body.contains("https://blog.example/accounts/unsubscribe"));
        assert!(sent.iter().all(|m| !m.bcc.contains(&"quiet@example.com".to_string())));
    }

    #[tokio::test]
    async fn test_failed_batch_does_not_stop_the_run() {
        let repo = setup(60).await;
        let mailer = Arc::new(RecordingMailer::new());
        mailer.fail_next(1);
        let service = NewsletterService::new(repo, Some(mailer.clone()), "https://blog.example");

        let report = service.dispatch(&post(), "rust").await.unwrap();
        assert_eq!(report.batches, 2);
        assert_eq!(report.failed_batches, 1);
        assert_eq!(report.sent, 10);
        assert_eq!(mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_without_mailer_is_a_no_op() {
        let repo = setup(3).await;
        let service = NewsletterService::new(repo, None, "https://blog.example");
        assert_eq!(service.dispatch(&post(), "rust").await.unwrap(), DispatchReport::default());
    }
}
