//! Post model
//!
//! This module provides:
//! - `Post` entity, the blog record
//! - `PublishStatus` shared by posts and pages
//! - Input types for creating and updating posts
//! - Pagination types for list queries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Category, Tag, User};

/// Publication state of a post or page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PublishStatus {
    /// Not visible to the public
    #[default]
    Draft,
    Published,
}

impl PublishStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishStatus::Draft => "draft",
            PublishStatus::Published => "published",
        }
    }
}

impl std::fmt::Display for PublishStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PublishStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(PublishStatus::Draft),
            "published" => Ok(PublishStatus::Published),
            _ => Err(anyhow::anyhow!("Invalid publish status: {}", s)),
        }
    }
}

/// Blog post
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub category_id: i64,
    pub author_id: i64,
    /// Path relative to the media root
    pub featured_image: Option<String>,
    /// Markdown teaser
    pub short_description: String,
    /// Markdown body
    pub blog_body: String,
    pub status: PublishStatus,
    pub is_featured: bool,
    pub is_editors_pick: bool,
    pub views: i64,
    pub seo_title: String,
    pub seo_description: String,
    /// Comma separated
    pub seo_keywords: String,
    /// Set by image optimization
    pub image_base_name: Option<String>,
    pub image_width: Option<i64>,
    pub image_height: Option<i64>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    pub fn new(title: String, slug: String, category_id: i64, author_id: i64) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            title,
            slug,
            category_id,
            author_id,
            featured_image: None,
            short_description: String::new(),
            blog_body: String::new(),
            status: PublishStatus::Draft,
            is_featured: false,
            is_editors_pick: false,
            views: 0,
            seo_title: String::new(),
            seo_description: String::new(),
            seo_keywords: String::new(),
            image_base_name: None,
            image_width: None,
            image_height: None,
            published_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_published(&self) -> bool {
        self.status == PublishStatus::Published
    }

    /// Public path, `/{category_slug}/{slug}/`
    pub fn path(&self, category_slug: &str) -> String {
        format!("/{}/{}/", category_slug, self.slug)
    }

    /// Title for `<title>`, falling back to the post title
    pub fn meta_title(&self) -> &str {
        if self.seo_title.is_empty() {
            &self.title
        } else {
            &self.seo_title
        }
    }

    pub fn keywords(&self) -> Vec<String> {
        self.seo_keywords
            .split(',')
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect()
    }
}

/// Post joined with what list pages need to render it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostSummary {
    #[serde(flatten)]
    pub post: Post,
    pub category_name: String,
    pub category_slug: String,
    pub author_name: String,
}

impl PostSummary {
    pub fn url(&self) -> String {
        self.post.path(&self.category_slug)
    }
}

/// Everything the post detail page shows
#[derive(Debug, Clone, Serialize)]
pub struct PostDetail {
    pub post: Post,
    pub category: Category,
    pub author: User,
    /// Rendered body with auto-links applied
    pub body_html: String,
    pub short_description_html: String,
    pub tags: Vec<Tag>,
    pub related: Vec<PostSummary>,
    pub seo: SeoMeta,
}

/// `<head>` metadata for a rendered page
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeoMeta {
    pub title: String,
    pub description: String,
    pub keywords: String,
    pub canonical_url: String,
    pub image: Option<String>,
}

/// Input for creating a post
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreatePostInput {
    pub title: String,
    /// Generated from the title when empty
    #[serde(default)]
    pub slug: String,
    pub category_id: i64,
    #[serde(default)]
    pub featured_image: Option<String>,
    pub short_description: String,
    #[serde(default)]
    pub blog_body: String,
    #[serde(default)]
    pub status: PublishStatus,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default)]
    pub is_editors_pick: bool,
    #[serde(default)]
    pub seo_title: String,
    #[serde(default)]
    pub seo_description: String,
    #[serde(default)]
    pub seo_keywords: String,
    /// Tag names; unknown tags are created
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Input for updating a post; `None` keeps the current value
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePostInput {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub category_id: Option<i64>,
    /// `Some("")` removes the image
    pub featured_image: Option<String>,
    pub short_description: Option<String>,
    pub blog_body: Option<String>,
    pub status: Option<PublishStatus>,
    pub is_featured: Option<bool>,
    pub is_editors_pick: Option<bool>,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
    pub seo_keywords: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl UpdatePostInput {
    pub fn has_changes(&self) -> bool {
        self.title.is_some()
            || self.slug.is_some()
            || self.category_id.is_some()
            || self.featured_image.is_some()
            || self.short_description.is_some()
            || self.blog_body.is_some()
            || self.status.is_some()
            || self.is_featured.is_some()
            || self.is_editors_pick.is_some()
            || self.seo_title.is_some()
            || self.seo_description.is_some()
            || self.seo_keywords.is_some()
            || self.tags.is_some()
    }
}

/// Dashboard toggle for the homepage flags
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostFlagsInput {
    pub is_featured: Option<bool>,
    pub is_editors_pick: Option<bool>,
}

/// Pagination parameters for list queries
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ListParams {
    /// 1-indexed
    pub page: u32,
    pub per_page: u32,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 10,
        }
    }
}

impl ListParams {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, 100),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page.saturating_sub(1) as i64) * self.per_page as i64
    }

    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }
}

/// One page of results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    /// Total across all pages
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
    pub has_next: bool,
    pub has_prev: bool,
}

impl<T> PagedResult<T> {
    pub fn new(items: Vec<T>, total: i64, params: &ListParams) -> Self {
        let per_page = params.per_page.max(1);
        let total_pages = (total.max(0) as u64).div_ceil(per_page as u64) as u32;
        Self {
            items,
            total,
            page: params.page,
            per_page,
            total_pages,
            has_next: params.page < total_pages,
            has_prev: params.page > 1,
        }
    }

    pub fn empty(params: &ListParams) -> Self {
        Self::new(Vec::new(), 0, params)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PagedResult<U> {
        PagedResult {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
            total_pages: self.total_pages,
            has_next: self.has_next,
            has_prev: self.has_prev,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_status_parse_and_display() {
        assert_eq!("Published".parse::<PublishStatus>().unwrap(), PublishStatus::Published);
        assert_eq!(PublishStatus::Draft.to_string(), "draft");
        assert!("archived".parse::<PublishStatus>().is_err());
        assert_eq!(PublishStatus::default(), PublishStatus::Draft);
    }

    #[test]
    fn test_post_path_and_meta() {
        let mut post = Post::new("Hello".into(), "hello".into(), 1, 1);
        assert_eq!(post.path("rust"), "/rust/hello/");
        assert_eq!(post.meta_title(), "Hello");
        post.seo_title = "Hello, SEO".into();
        assert_eq!(post.meta_title(), "Hello, SEO");
        post.seo_keywords = "rust, web ,, axum".into();
        assert_eq!(post.keywords(), vec!["rust", "web", "axum"]);
    }

    #[test]
    fn test_paged_result_navigation() {
        let params = ListParams::new(2, 5);
        let result = PagedResult::new(vec![1, 2, 3, 4, 5], 12, &params);
        assert_eq!(result.total_pages, 3);
        assert!(result.has_next);
        assert!(result.has_prev);

        let last = PagedResult::new(vec![1, 2], 12, &ListParams::new(3, 5));
        assert!(!last.has_next);

        let none: PagedResult<i32> = PagedResult::empty(&ListParams::default());
        assert_eq!(none.total_pages, 0);
        assert!(!none.has_next && !none.has_prev);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        #[test]
        fn prop_pages_cover_total(total in 0i64..500, per_page in 1u32..50) {
            let params = ListParams::new(1, per_page);
            let result: PagedResult<()> = PagedResult::new(Vec::new(), total, &params);
            let capacity = result.total_pages as i64 * per_page as i64;
            prop_assert!(capacity >= total);
            prop_assert!(capacity - total < per_page as i64);
        }
    }
}
