//! Page service

use crate::db::repositories::PageRepository;
use crate::models::{CreatePageInput, Page, PublishStatus, UpdatePageInput};
use crate::services::markdown::MarkdownRenderer;
use crate::services::slug::{numbered_slug, slug_or};
use anyhow::Context;
use serde::Serialize;
use std::sync::Arc;

pub const MAX_PAGE_TITLE_LENGTH: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum PageServiceError {
    #[error("Page not found")]
    NotFound,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Page slug already exists: {0}")]
    DuplicateSlug(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// A published page with its rendered body
#[derive(Debug, Clone, Serialize)]
pub struct RenderedPage {
    pub page: Page,
    pub content_html: String,
}

pub struct PageService {
    repo: Arc<dyn PageRepository>,
    markdown: MarkdownRenderer,
}

impl PageService {
    pub fn new(repo: Arc<dyn PageRepository>) -> Self {
        Self {
            repo,
            markdown: MarkdownRenderer::new(),
        }
    }

    pub async fn create(&self, input: CreatePageInput) -> Result<Page, PageServiceError> {
        let title = input.title.trim().to_string();
        validate_title(&title)?;
        let slug = self.resolve_slug(&input.slug, &title, None).await?;

        let page = Page::new(title, slug, input.content, input.status);
        let created = self
            .repo
            .create(&page)
            .await
            .context("Failed to create page")?;
        tracing::info!("Created page {} ({})", created.id, created.slug);
        Ok(created)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Page, PageServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get page")?
            .ok_or(PageServiceError::NotFound)
    }

    /// Published page by slug, rendered
    pub async fn render_published(&self, slug: &str) -> Result<RenderedPage, PageServiceError> {
        let page = self
            .repo
            .get_by_slug(slug)
            .await
            .context("Failed to get page by slug")?
            .filter(Page::is_published)
            .ok_or(PageServiceError::NotFound)?;

        let content_html = self.markdown.render(&page.content);
        Ok(RenderedPage { page, content_html })
    }

    pub async fn list(&self, status: Option<PublishStatus>) -> Result<Vec<Page>, PageServiceError> {
        Ok(self.repo.list(status).await.context("Failed to list pages")?)
    }

    pub async fn update(&self, id: i64, input: UpdatePageInput) -> Result<Page, PageServiceError> {
        let mut page = self.get_by_id(id).await?;

        if let Some(title) = input.title {
            let title = title.trim().to_string();
            validate_title(&title)?;
            page.title = title;
        }
        if let Some(slug) = input.slug {
            page.slug = self.resolve_slug(&slug, &page.title, Some(id)).await?;
        }
        if let Some(content) = input.content {
            page.content = content;
        }
        if let Some(status) = input.status {
            page.status = status;
        }

        Ok(self
            .repo
            .update(&page)
            .await
            .context("Failed to update page")?)
    }

    pub async fn delete(&self, id: i64) -> Result<(), PageServiceError> {
        self.get_by_id(id).await?;
        self.repo.delete(id).await.context("Failed to delete page")?;
        tracing::info!("Deleted page {}", id);
        Ok(())
    }

    pub async fn count(&self) -> Result<i64, PageServiceError> {
        Ok(self.repo.count().await.context("Failed to count pages")?)
    }

    async fn resolve_slug(
        &self,
        requested: &str,
        title: &str,
        exclude_id: Option<i64>,
    ) -> Result<String, PageServiceError> {
        let requested = requested.trim();
        if !requested.is_empty() {
            let slug = slug_or(requested, "page");
            if self
                .repo
                .slug_exists(&slug, exclude_id)
                .await
                .context("Failed to check slug uniqueness")?
            {
                return Err(PageServiceError::DuplicateSlug(slug));
            }
            return Ok(slug);
        }

        let base = slug_or(title, "page");
        let mut n = 1;
        loop {
            let candidate = numbered_slug(&base, n);
            if !self
                .repo
                .slug_exists(&candidate, exclude_id)
                .await
                .context("Failed to check slug uniqueness")?
            {
                return Ok(candidate);
            }
            n += 1;
        }
    }
}

fn validate_title(title: &str) -> Result<(), PageServiceError> {
    if title.is_empty() {
        return Err(PageServiceError::ValidationError(
            "Title cannot be empty".to_string(),
        ));
    }
    if title.chars().count() > MAX_PAGE_TITLE_LENGTH {
        return Err(PageServiceError::ValidationError(format!(
            "Title must be at most {} characters",
            MAX_PAGE_TITLE_LENGTH
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::SqlxPageRepository;
    use crate::db::{create_test_pool, migrations};

    async fn setup() -> PageService {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        PageService::new(SqlxPageRepository::boxed(pool))
    }

    fn input(title: &str, status: PublishStatus) -> CreatePageInput {
        CreatePageInput {
            title: title.to_string(),
            slug: String::new(),
            content: "Some **bold** words".to_string(),
            status,
        }
    }

    #[tokio::test]
    async fn test_create_generates_unique_slugs() {
        let service = setup().await;
        let first = service.create(input("About Us", PublishStatus::Published)).await.unwrap();
        let second = service.create(input("About Us", PublishStatus::Draft)).await.unwrap();
        assert_eq!(first.slug, "about-us");
        assert_eq!(second.slug, "about-us-2");

        let mut explicit = input("Other", PublishStatus::Draft);
        explicit.slug = "about-us".into();
        assert!(matches!(
            service.create(explicit).await,
            Err(PageServiceError::DuplicateSlug(_))
        ));
    }

    #[tokio::test]
    async fn test_render_published_only() {
        let service = setup().await;
        service.create(input("Privacy", PublishStatus::Published)).await.unwrap();
        service.create(input("Secret", PublishStatus::Draft)).await.unwrap();

        let rendered = service.render_published("privacy").await.unwrap();
        assert!(rendered.content_html.contains("<strong>bold</strong>"));
        assert!(matches!(
            service.render_published("secret").await,
            Err(PageServiceError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let service = setup().await;
        let page = service.create(input("Contact", PublishStatus::Draft)).await.unwrap();

        let updated = service
            .update(
                page.id,
                UpdatePageInput {
                    status: Some(PublishStatus::Published),
                    slug: Some("contact-us".into()),
                    ..UpdatePageInput::default()
                },
            )
            .await
            .unwrap();
        assert!(updated.is_published());
        assert_eq!(updated.slug, "contact-us");

        assert!(matches!(
            service.update(page.id, UpdatePageInput {
                title: Some(" ".into()),
                ..UpdatePageInput::default()
            }).await,
            Err(PageServiceError::ValidationError(_))
        ));

        service.delete(page.id).await.unwrap();
        assert_eq!(service.count().await.unwrap(), 0);
        assert!(matches!(service.delete(page.id).await, Err(PageServiceError::NotFound)));
    }
}
