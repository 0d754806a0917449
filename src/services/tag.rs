//! Tag service
//!
//! Tags are created on demand from the names typed on a post and reused
//! case-insensitively afterwards.

use crate::db::repositories::TagRepository;
use crate::models::{Tag, TagWithCount};
use crate::services::slug::{numbered_slug, slug_or};
use anyhow::Context;
use std::sync::Arc;

/// Longest accepted tag name
pub const MAX_TAG_LENGTH: usize = 50;

/// Most suggestions returned for one prefix
pub const SUGGEST_LIMIT: i64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum TagServiceError {
    #[error("Tag not found")]
    NotFound,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct TagService {
    repo: Arc<dyn TagRepository>,
}

impl TagService {
    pub fn new(repo: Arc<dyn TagRepository>) -> Self {
        Self { repo }
    }

    /// Existing tag with this name (any case), or a new one
    pub async fn create_or_get(&self, name: &str) -> Result<Tag, TagServiceError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TagServiceError::ValidationError(
                "Tag name cannot be empty".to_string(),
            ));
        }
        if name.chars().count() > MAX_TAG_LENGTH {
            return Err(TagServiceError::ValidationError(format!(
                "Tag name must be at most {} characters",
                MAX_TAG_LENGTH
            )));
        }

        if let Some(tag) = self
            .repo
            .get_by_name(name)
            .await
            .context("Failed to look up tag")?
        {
            return Ok(tag);
        }

        let base = slug_or(name, "tag");
        let mut n = 1;
        let slug = loop {
            let candidate = numbered_slug(&base, n);
            if !self
                .repo
                .slug_exists(&candidate)
                .await
                .context("Failed to check tag slug")?
            {
                break candidate;
            }
            n += 1;
        };

        Ok(self
            .repo
            .create(&Tag::new(name.to_string(), slug))
            .await
            .context("Failed to create tag")?)
    }

    /// Replace the tags on a post with `names`, creating missing tags
    pub async fn set_post_tags(
        &self,
        post_id: i64,
        names: &[String],
    ) -> Result<Vec<Tag>, TagServiceError> {
        let mut tags: Vec<Tag> = Vec::new();
        for name in names.iter().filter(|n| !n.trim().is_empty()) {
            let tag = self.create_or_get(name).await?;
            if !tags.iter().any(|t| t.id == tag.id) {
                tags.push(tag);
            }
        }

        let ids: Vec<i64> = tags.iter().map(|t| t.id).collect();
        self.repo
            .set_post_tags(post_id, &ids)
            .await
            .context("Failed to set post tags")?;
        Ok(tags)
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Tag, TagServiceError> {
        self.repo
            .get_by_slug(slug)
            .await
            .context("Failed to get tag by slug")?
            .ok_or(TagServiceError::NotFound)
    }

    pub async fn for_post(&self, post_id: i64) -> Result<Vec<Tag>, TagServiceError> {
        Ok(self
            .repo
            .get_for_post(post_id)
            .await
            .context("Failed to get post tags")?)
    }

    /// Tags with published post counts
    pub async fn list_with_counts(&self) -> Result<Vec<TagWithCount>, TagServiceError> {
        Ok(self
            .repo
            .list_with_counts()
            .await
            .context("Failed to list tags")?)
    }

    /// Up to ten tag names starting with `prefix`
    pub async fn suggest(&self, prefix: &str) -> Result<Vec<String>, TagServiceError> {
        let prefix = prefix.trim();
        if prefix.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .repo
            .suggest(prefix, SUGGEST_LIMIT)
            .await
            .context("Failed to suggest tags")?)
    }
}
