//! Post service
//!
//! Implements business logic for blog posts:
//! - Create, update and delete with tag sync and unique slugs
//! - Featured image processing after a save
//! - Newsletter on the first publish
//! - Detail rendering with auto-links, related posts and SEO meta
//! - Public listings by category, tag and search

use crate::cache::{Cache, CacheLayer};
use crate::db::repositories::{CategoryRepository, PostQuery, PostRepository, UserRepository};
use crate::models::{
    thread_cache_key, Category, ContentType, CreatePostInput, ListParams, PagedResult, Post,
    PostDetail, PostFlagsInput, PostSummary, PublishStatus, SeoMeta, Tag, UpdatePostInput,
};
use crate::services::homepage::HomepageService;
use crate::services::image::ImageService;
use crate::services::markdown::{auto_link, LinkTarget, MarkdownRenderer};
use crate::services::newsletter::NewsletterService;
use crate::services::slug::{numbered_slug, slug_or};
use crate::services::tag::{TagService, TagServiceError};
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;

/// Posts per page on category, tag, search and home listings
pub const PUBLIC_PAGE_SIZE: u32 = 5;

pub const MAX_TITLE_LENGTH: usize = 100;
pub const MAX_SHORT_DESCRIPTION_LENGTH: usize = 500;
const MAX_SEO_TITLE_LENGTH: usize = 70;
const MAX_SEO_DESCRIPTION_LENGTH: usize = 160;

/// Related posts offered to the auto-linker
const RELATED_LIMIT: i64 = 8;

#[derive(Debug, thiserror::Error)]
pub enum PostServiceError {
    #[error("Post not found")]
    NotFound,

    #[error("Category not found")]
    CategoryNotFound,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Post slug already exists: {0}")]
    DuplicateSlug(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<TagServiceError> for PostServiceError {
    fn from(err: TagServiceError) -> Self {
        match err {
            TagServiceError::ValidationError(msg) => PostServiceError::ValidationError(msg),
            TagServiceError::NotFound => PostServiceError::ValidationError("Unknown tag".into()),
            TagServiceError::InternalError(e) => PostServiceError::InternalError(e),
        }
    }
}

pub struct PostService {
    repo: Arc<dyn PostRepository>,
    category_repo: Arc<dyn CategoryRepository>,
    user_repo: Arc<dyn UserRepository>,
    tags: Arc<TagService>,
    homepage: Arc<HomepageService>,
    newsletter: Arc<NewsletterService>,
    images: Option<Arc<ImageService>>,
    cache: Arc<Cache>,
    renderer: MarkdownRenderer,
    site_url: String,
}

impl PostService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repo: Arc<dyn PostRepository>,
        category_repo: Arc<dyn CategoryRepository>,
        user_repo: Arc<dyn UserRepository>,
        tags: Arc<TagService>,
        homepage: Arc<HomepageService>,
        newsletter: Arc<NewsletterService>,
        cache: Arc<Cache>,
        site_url: &str,
    ) -> Self {
        Self {
            repo,
            category_repo,
            user_repo,
            tags,
            homepage,
            newsletter,
            images: None,
            cache,
            renderer: MarkdownRenderer::new(),
            site_url: site_url.trim_end_matches('/').to_string(),
        }
    }

    /// Process featured images on save
    pub fn with_images(mut self, images: Arc<ImageService>) -> Self {
        self.images = Some(images);
        self
    }

    pub async fn create(
        &self,
        author_id: i64,
        input: CreatePostInput,
    ) -> Result<Post, PostServiceError> {
        let title = input.title.trim().to_string();
        validate_title(&title)?;
        validate_short_description(&input.short_description)?;
        validate_seo(&input.seo_title, &input.seo_description)?;
        let category = self.require_category(input.category_id).await?;

        let slug = self.resolve_slug(&input.slug, &title, None).await?;

        let mut post = Post::new(title, slug, category.id, author_id);
        post.featured_image = non_empty(input.featured_image);
        post.short_description = input.short_description.trim().to_string();
        post.blog_body = input.blog_body;
        post.status = input.status;
        post.is_featured = input.is_featured;
        post.is_editors_pick = input.is_editors_pick;
        post.seo_title = input.seo_title.trim().to_string();
        post.seo_description = input.seo_description.trim().to_string();
        post.seo_keywords = input.seo_keywords.trim().to_string();
        if post.is_published() {
            post.published_at = Some(Utc::now());
        }

        let mut post = self
            .repo
            .create(&post)
            .await
            .context("Failed to create post")?;
        self.tags.set_post_tags(post.id, &input.tags).await?;

        if let Some(image) = post.featured_image.clone() {
            post = self.process_image(post, &image).await;
        }

        self.after_save(&post, &category, false).await;
        tracing::info!("Created post {} ({})", post.id, post.slug);
        Ok(post)
    }

    pub async fn update(&self, id: i64, input: UpdatePostInput) -> Result<Post, PostServiceError> {
        let mut post = self.get_by_id(id).await?;
        if !input.has_changes() {
            return Ok(post);
        }
        let was_published = post.is_published();
        let old_image = post.featured_image.clone();

        if let Some(title) = input.title {
            let title = title.trim().to_string();
            validate_title(&title)?;
            post.title = title;
        }
        if let Some(slug) = input.slug {
            post.slug = self.resolve_slug(&slug, &post.title, Some(id)).await?;
        }
        if let Some(category_id) = input.category_id {
            post.category_id = category_id;
        }
        if let Some(image) = input.featured_image {
            post.featured_image = non_empty(Some(image));
            if post.featured_image.is_none() {
                post.image_base_name = None;
                post.image_width = None;
                post.image_height = None;
            }
        }
        if let Some(short) = input.short_description {
            validate_short_description(&short)?;
            post.short_description = short.trim().to_string();
        }
        if let Some(body) = input.blog_body {
            post.blog_body = body;
        }
        if let Some(status) = input.status {
            post.status = status;
        }
        if let Some(featured) = input.is_featured {
            post.is_featured = featured;
        }
        if let Some(pick) = input.is_editors_pick {
            post.is_editors_pick = pick;
        }
        if let Some(seo_title) = input.seo_title {
            post.seo_title = seo_title.trim().to_string();
        }
        if let Some(seo_description) = input.seo_description {
            post.seo_description = seo_description.trim().to_string();
        }
        if let Some(keywords) = input.seo_keywords {
            post.seo_keywords = keywords.trim().to_string();
        }
        validate_seo(&post.seo_title, &post.seo_description)?;
        let category = self.require_category(post.category_id).await?;

        let newly_published = !was_published && post.is_published();
        if newly_published && post.published_at.is_none() {
            post.published_at = Some(Utc::now());
        }

        let mut post = self
            .repo
            .update(&post)
            .await
            .context("Failed to update post")?;
        if let Some(names) = input.tags {
            self.tags.set_post_tags(post.id, &names).await?;
        }

        if post.featured_image != old_image {
            if let Some(image) = post.featured_image.clone() {
                post = self.process_image(post, &image).await;
            }
        }

        self.after_save(&post, &category, was_published).await;
        tracing::info!("Updated post {} ({})", post.id, post.slug);
        Ok(post)
    }

    pub async fn delete(&self, id: i64) -> Result<(), PostServiceError> {
        let post = self.get_by_id(id).await?;
        self.repo
            .delete(post.id)
            .await
            .context("Failed to delete post")?;

        self.clear_caches(post.id).await;
        tracing::info!("Deleted post {} ({})", post.id, post.slug);
        Ok(())
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Post, PostServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get post")?
            .ok_or(PostServiceError::NotFound)
    }

    /// Post with its joined names, for the dashboard
    pub async fn get_summary(&self, id: i64) -> Result<PostSummary, PostServiceError> {
        self.repo
            .get_summary(id)
            .await
            .context("Failed to get post")?
            .ok_or(PostServiceError::NotFound)
    }

    pub async fn tags_for(&self, post_id: i64) -> Result<Vec<Tag>, PostServiceError> {
        Ok(self.tags.for_post(post_id).await?)
    }

    /// Published post at `/{category_slug}/{slug}/`, counting the view
    pub async fn detail(
        &self,
        category_slug: &str,
        slug: &str,
    ) -> Result<PostDetail, PostServiceError> {
        let mut post = self
            .repo
            .get_by_slug(slug)
            .await
            .context("Failed to get post by slug")?
            .filter(|p| p.is_published())
            .ok_or(PostServiceError::NotFound)?;

        let category = self
            .category_repo
            .get_by_id(post.category_id)
            .await
            .context("Failed to get post category")?
            .filter(|c| c.slug == category_slug)
            .ok_or(PostServiceError::NotFound)?;

        let author = self
            .user_repo
            .get_by_id(post.author_id)
            .await
            .context("Failed to get post author")?
            .ok_or(PostServiceError::NotFound)?;

        self.repo
            .increment_views(post.id)
            .await
            .context("Failed to count view")?;
        post.views += 1;

        let related = self
            .repo
            .related(&post, RELATED_LIMIT)
            .await
            .context("Failed to load related posts")?;
        let targets: Vec<LinkTarget> = related
            .iter()
            .map(|r| LinkTarget {
                id: r.post.id,
                title: r.post.title.clone(),
                url: r.url(),
                keywords: r.post.seo_keywords.clone(),
            })
            .collect();

        let body_html = auto_link(&self.renderer.render(&post.blog_body), &targets).html;
        let short_description_html = self.renderer.render(&post.short_description);
        let tags = self.tags.for_post(post.id).await?;
        let seo = self.seo_for(&post, &category);

        Ok(PostDetail {
            post,
            category,
            author,
            body_html,
            short_description_html,
            tags,
            related,
            seo,
        })
    }

    /// Published posts, newest first
    pub async fn list_published(
        &self,
        params: ListParams,
    ) -> Result<PagedResult<PostSummary>, PostServiceError> {
        self.list(&PostQuery::published(), params).await
    }

    /// Published posts that are not featured, five per page
    pub async fn home_posts(&self, page: u32) -> Result<PagedResult<PostSummary>, PostServiceError> {
        self.list(
            &PostQuery::published().with_featured(false),
            ListParams::new(page, PUBLIC_PAGE_SIZE),
        )
        .await
    }

    /// Dashboard listing over every status
    pub async fn list_admin(
        &self,
        status: Option<PublishStatus>,
        params: ListParams,
    ) -> Result<PagedResult<PostSummary>, PostServiceError> {
        let query = PostQuery {
            status,
            ..PostQuery::default()
        };
        self.list(&query, params).await
    }

    pub async fn by_category(
        &self,
        slug: &str,
        page: u32,
    ) -> Result<(Category, PagedResult<PostSummary>), PostServiceError> {
        let category = self
            .category_repo
            .get_by_slug(slug)
            .await
            .context("Failed to get category")?
            .ok_or(PostServiceError::CategoryNotFound)?;

        let posts = self
            .list(
                &PostQuery::published().with_category(category.id),
                ListParams::new(page, PUBLIC_PAGE_SIZE),
            )
            .await?;
        Ok((category, posts))
    }

    pub async fn by_tag(
        &self,
        slug: &str,
        page: u32,
    ) -> Result<(Tag, PagedResult<PostSummary>), PostServiceError> {
        let tag = match self.tags.get_by_slug(slug).await {
            Ok(tag) => tag,
            Err(TagServiceError::NotFound) => return Err(PostServiceError::NotFound),
            Err(e) => return Err(e.into()),
        };

        let posts = self
            .list(
                &PostQuery::published().with_tag(tag.id),
                ListParams::new(page, PUBLIC_PAGE_SIZE),
            )
            .await?;
        Ok((tag, posts))
    }

    /// Published posts matching `q`; a blank query matches nothing
    pub async fn search(
        &self,
        q: &str,
        page: u32,
    ) -> Result<PagedResult<PostSummary>, PostServiceError> {
        let params = ListParams::new(page, PUBLIC_PAGE_SIZE);
        let q = q.trim();
        if q.is_empty() {
            return Ok(PagedResult::empty(&params));
        }
        self.list(&PostQuery::published().with_search(q), params).await
    }

    pub async fn set_flags(&self, id: i64, input: PostFlagsInput) -> Result<Post, PostServiceError> {
        self.get_by_id(id).await?;
        self.repo
            .set_flags(id, input.is_featured, input.is_editors_pick)
            .await
            .context("Failed to set post flags")?;
        self.clear_caches(id).await;
        self.get_by_id(id).await
    }

    pub async fn count(&self, status: Option<PublishStatus>) -> Result<i64, PostServiceError> {
        Ok(self
            .repo
            .count(status)
            .await
            .context("Failed to count posts")?)
    }

    /// Featured image paths of every post that has one
    pub async fn image_paths(&self) -> Result<Vec<String>, PostServiceError> {
        Ok(self
            .repo
            .with_images()
            .await
            .context("Failed to list post images")?
            .into_iter()
            .filter_map(|p| p.featured_image)
            .collect())
    }

    async fn list(
        &self,
        query: &PostQuery,
        params: ListParams,
    ) -> Result<PagedResult<PostSummary>, PostServiceError> {
        let (items, total) = self
            .repo
            .list(query, &params)
            .await
            .context("Failed to list posts")?;
        Ok(PagedResult::new(items, total, &params))
    }

    async fn require_category(&self, id: i64) -> Result<Category, PostServiceError> {
        self.category_repo
            .get_by_id(id)
            .await
            .context("Failed to get category")?
            .ok_or(PostServiceError::CategoryNotFound)
    }

    /// An explicit slug must be free; a generated one is numbered until it is
    async fn resolve_slug(
        &self,
        requested: &str,
        title: &str,
        exclude_id: Option<i64>,
    ) -> Result<String, PostServiceError> {
        let requested = requested.trim();
        if !requested.is_empty() {
            let slug = slug_or(requested, "post");
            if self
                .repo
                .slug_exists(&slug, exclude_id)
                .await
                .context("Failed to check slug uniqueness")?
            {
                return Err(PostServiceError::DuplicateSlug(slug));
            }
            return Ok(slug);
        }

        let base = slug_or(title, "post");
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

    /// Resize the image and record its metadata; failures leave the post as is
    async fn process_image(&self, post: Post, image: &str) -> Post {
        let Some(images) = self.images.as_ref() else {
            return post;
        };

        let meta = match images.process(image).await {
            Ok(meta) => meta,
            Err(e) => {
                tracing::warn!("Image processing failed for post {}: {:#}", post.id, e);
                return post;
            }
        };

        let width = i64::from(meta.width);
        let height = i64::from(meta.height);
        if let Err(e) = self
            .repo
            .set_image_meta(post.id, &meta.base_name, width, height)
            .await
        {
            tracing::warn!("Failed to store image metadata for post {}: {:#}", post.id, e);
            return post;
        }

        tracing::debug!(
            "Processed image {} for post {} ({} variants)",
            image,
            post.id,
            meta.variants.len()
        );
        Post {
            image_base_name: Some(meta.base_name),
            image_width: Some(width),
            image_height: Some(height),
            ..post
        }
    }

    async fn after_save(&self, post: &Post, category: &Category, was_published: bool) {
        self.clear_caches(post.id).await;

        if post.is_published() && !was_published {
            if let Err(e) = self.newsletter.dispatch(post, &category.slug).await {
                tracing::warn!("Newsletter for post {} failed: {:#}", post.id, e);
            }
        }
    }

    async fn clear_caches(&self, post_id: i64) {
        if let Err(e) = self.homepage.clear_homepage().await {
            tracing::warn!("Failed to clear homepage cache: {:#}", e);
        }
        let _ = self
            .cache
            .delete(&thread_cache_key(ContentType::Post, post_id))
            .await;
    }

    fn seo_for(&self, post: &Post, category: &Category) -> SeoMeta {
        let description = if post.seo_description.is_empty() {
            truncate_chars(post.short_description.trim(), MAX_SEO_DESCRIPTION_LENGTH)
        } else {
            post.seo_description.clone()
        };
        let keywords = if post.seo_keywords.is_empty() {
            category.category_name.clone()
        } else {
            post.keywords().join(", ")
        };

        SeoMeta {
            title: post.meta_title().to_string(),
            description,
            keywords,
            canonical_url: format!("{}{}", self.site_url, post.path(&category.slug)),
            image: post
                .featured_image
                .as_ref()
                .map(|path| format!("{}/media/{}", self.site_url, path)),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn validate_title(title: &str) -> Result<(), PostServiceError> {
    if title.is_empty() {
        return Err(PostServiceError::ValidationError(
            "Title cannot be empty".to_string(),
        ));
    }
    if title.chars().count() > MAX_TITLE_LENGTH {
        return Err(PostServiceError::ValidationError(format!(
            "Title must be at most {} characters",
            MAX_TITLE_LENGTH
        )));
    }
    Ok(())
}

fn validate_short_description(text: &str) -> Result<(), PostServiceError> {
    let len = text.trim().chars().count();
    if len == 0 {
        return Err(PostServiceError::ValidationError(
            "Short description cannot be empty".to_string(),
        ));
    }
    if len > MAX_SHORT_DESCRIPTION_LENGTH {
        return Err(PostServiceError::ValidationError(format!(
            "Short description must be at most {} characters",
            MAX_SHORT_DESCRIPTION_LENGTH
        )));
    }
    Ok(())
}

fn validate_seo(title: &str, description: &str) -> Result<(), PostServiceError> {
    if title.trim().chars().count() > MAX_SEO_TITLE_LENGTH {
        return Err(PostServiceError::ValidationError(format!(
            "SEO title must be at most {} characters",
            MAX_SEO_TITLE_LENGTH
        )));
    }
    if description.trim().chars().count() > MAX_SEO_DESCRIPTION_LENGTH {
        return Err(PostServiceError::ValidationError(format!(
            "SEO description must be at most {} characters",
            MAX_SEO_DESCRIPTION_LENGTH
        )));
    }
    Ok(())
}
