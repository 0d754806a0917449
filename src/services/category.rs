//! Category service
//!
//! Category CRUD with slug generation, uniqueness checks and caching.
//! A category that still has posts cannot be deleted.

use crate::cache::{Cache, CacheLayer};
use crate::db::repositories::CategoryRepository;
use crate::models::{Category, CategoryWithCount, CreateCategoryInput, UpdateCategoryInput};
use crate::services::homepage::CATEGORY_POSTS_KEY;
use crate::services::slug::generate_slug;
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

/// Default cache TTL for categories (1 hour)
const CATEGORY_CACHE_TTL_SECS: u64 = 3600;

const CACHE_KEY_CATEGORY_BY_SLUG: &str = "category:slug:";
const CACHE_KEY_CATEGORY_LIST: &str = "category:list";
const CACHE_KEY_CATEGORY_COUNTS: &str = "category:counts";

pub const MAX_NAME_LENGTH: usize = 50;
pub const MAX_SEO_TITLE_LENGTH: usize = 70;
pub const MAX_SEO_DESCRIPTION_LENGTH: usize = 160;

/// Error types for category service operations
#[derive(Debug, thiserror::Error)]
pub enum CategoryServiceError {
    #[error("Category name already exists: {0}")]
    DuplicateName(String),

    #[error("Category slug already exists: {0}")]
    DuplicateSlug(String),

    #[error("Category not found")]
    NotFound,

    /// Posts still reference the category
    #[error("Category is used by {0} post(s)")]
    CategoryInUse(i64),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Category service for managing blog categories
pub struct CategoryService {
    repo: Arc<dyn CategoryRepository>,
    cache: Arc<Cache>,
    cache_ttl: Duration,
}

impl CategoryService {
    pub fn new(repo: Arc<dyn CategoryRepository>, cache: Arc<Cache>) -> Self {
        Self {
            repo,
            cache,
            cache_ttl: Duration::from_secs(CATEGORY_CACHE_TTL_SECS),
        }
    }

    /// Create a category. An empty slug is generated from the name.
    pub async fn create(
        &self,
        input: CreateCategoryInput,
    ) -> Result<Category, CategoryServiceError> {
        let name = input.category_name.trim().to_string();
        validate_name(&name)?;
        validate_seo(&input.seo_title, &input.seo_description)?;

        if self
            .repo
            .get_by_name(&name)
            .await
            .context("Failed to check name uniqueness")?
            .is_some()
        {
            return Err(CategoryServiceError::DuplicateName(name));
        }

        let slug = self.resolve_slug(&input.slug, &name)?;
        if self
            .repo
            .slug_exists(&slug, None)
            .await
            .context("Failed to check slug uniqueness")?
        {
            return Err(CategoryServiceError::DuplicateSlug(slug));
        }

        let mut category = Category::new(name, slug);
        category.description = input.description.trim().to_string();
        category.seo_title = input.seo_title.trim().to_string();
        category.seo_description = input.seo_description.trim().to_string();

        let created = self
            .repo
            .create(&category)
            .await
            .context("Failed to create category")?;

        self.invalidate_cache().await;
        tracing::info!("Created category {} ({})", created.category_name, created.slug);
        Ok(created)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Category, CategoryServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get category")?
            .ok_or(CategoryServiceError::NotFound)
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Category, CategoryServiceError> {
        let cache_key = format!("{}{}", CACHE_KEY_CATEGORY_BY_SLUG, slug);
        if let Some(category) = self.cache.get::<Category>(&cache_key).await.ok().flatten() {
            return Ok(category);
        }

        let category = self
            .repo
            .get_by_slug(slug)
            .await
            .context("Failed to get category by slug")?
            .ok_or(CategoryServiceError::NotFound)?;

        let _ = self.cache.set(&cache_key, &category, self.cache_ttl).await;
        Ok(category)
    }

    /// All categories in creation order
    pub async fn list(&self) -> Result<Vec<Category>, CategoryServiceError> {
        if let Some(list) = self
            .cache
            .get::<Vec<Category>>(CACHE_KEY_CATEGORY_LIST)
            .await
            .ok()
            .flatten()
        {
            return Ok(list);
        }

        let list = self.repo.list().await.context("Failed to list categories")?;
        let _ = self
            .cache
            .set(CACHE_KEY_CATEGORY_LIST, &list, self.cache_ttl)
            .await;
        Ok(list)
    }

    /// Categories with published post counts
    pub async fn list_with_counts(&self) -> Result<Vec<CategoryWithCount>, CategoryServiceError> {
        if let Some(list) = self
            .cache
            .get::<Vec<CategoryWithCount>>(CACHE_KEY_CATEGORY_COUNTS)
            .await
            .ok()
            .flatten()
        {
            return Ok(list);
        }

        let list = self
            .repo
            .list_with_counts()
            .await
            .context("Failed to list categories with counts")?;
        let _ = self
            .cache
            .set(CACHE_KEY_CATEGORY_COUNTS, &list, self.cache_ttl)
            .await;
        Ok(list)
    }

    pub async fn update(
        &self,
        id: i64,
        input: UpdateCategoryInput,
    ) -> Result<Category, CategoryServiceError> {
        let mut category = self.get_by_id(id).await?;

        if let Some(name) = input.category_name {
            let name = name.trim().to_string();
            validate_name(&name)?;
            if let Some(other) = self
                .repo
                .get_by_name(&name)
                .await
                .context("Failed to check name uniqueness")?
            {
                if other.id != id {
                    return Err(CategoryServiceError::DuplicateName(name));
                }
            }
            category.category_name = name;
        }

        if let Some(slug) = input.slug {
            let slug = self.resolve_slug(&slug, &category.category_name)?;
            if self
                .repo
                .slug_exists(&slug, Some(id))
                .await
                .context("Failed to check slug uniqueness")?
            {
                return Err(CategoryServiceError::DuplicateSlug(slug));
            }
            category.slug = slug;
        }

        if let Some(description) = input.description {
            category.description = description.trim().to_string();
        }
        if let Some(seo_title) = input.seo_title {
            category.seo_title = seo_title.trim().to_string();
        }
        if let Some(seo_description) = input.seo_description {
            category.seo_description = seo_description.trim().to_string();
        }
        validate_seo(&category.seo_title, &category.seo_description)?;

        let updated = self
            .repo
            .update(&category)
            .await
            .context("Failed to update category")?;

        self.invalidate_cache().await;
        Ok(updated)
    }

    /// Delete an unused category
    ///
    /// # Errors
    /// - `CategoryInUse` while any post (of any status) references it
    pub async fn delete(&self, id: i64) -> Result<(), CategoryServiceError> {
        self.get_by_id(id).await?;

        let posts = self
            .repo
            .count_posts(id)
            .await
            .context("Failed to count category posts")?;
        if posts > 0 {
            return Err(CategoryServiceError::CategoryInUse(posts));
        }

        self.repo
            .delete(id)
            .await
            .context("Failed to delete category")?;

        self.invalidate_cache().await;
        tracing::info!("Deleted category {}", id);
        Ok(())
    }

    pub async fn count(&self) -> Result<i64, CategoryServiceError> {
        Ok(self.repo.count().await.context("Failed to count categories")?)
    }

    /// Drop cached category data, including the homepage category blocks
    pub async fn invalidate_cache(&self) {
        let _ = self.cache.delete_pattern("category:*").await;
        let _ = self.cache.delete(CATEGORY_POSTS_KEY).await;
    }

    fn resolve_slug(&self, slug: &str, name: &str) -> Result<String, CategoryServiceError> {
        let slug = if slug.trim().is_empty() {
            generate_slug(name)
        } else {
            generate_slug(slug)
        };
        if slug.is_empty() {
            return Err(CategoryServiceError::ValidationError(
                "Slug cannot be empty; use letters or digits in the name".to_string(),
            ));
        }
        Ok(slug)
    }
}

fn validate_name(name: &str) -> Result<(), CategoryServiceError> {
    if name.is_empty() {
        return Err(CategoryServiceError::ValidationError(
            "Category name cannot be empty".to_string(),
        ));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(CategoryServiceError::ValidationError(format!(
            "Category name must be at most {} characters",
            MAX_NAME_LENGTH
        )));
    }
    Ok(())
}

fn validate_seo(title: &str, description: &str) -> Result<(), CategoryServiceError> {
    if title.trim().chars().count() > MAX_SEO_TITLE_LENGTH {
        return Err(CategoryServiceError::ValidationError(format!(
            "SEO title must be at most {} characters",
            MAX_SEO_TITLE_LENGTH
        )));
    }
    if description.trim().chars().count() > MAX_SEO_DESCRIPTION_LENGTH {
        return Err(CategoryServiceError::ValidationError(format!(
            "SEO description must be at most {} characters",
            MAX_SEO_DESCRIPTION_LENGTH
        )));
    }
    Ok(())
}
