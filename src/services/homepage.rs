//! Homepage cache
//!
//! | key | content | TTL |
//! |---|---|---|
//! | `homepage_data` | featured post, trending, editor's picks | 15 min |
//! | `category_posts_homepage` | six latest posts per category | 30 min |
//!
//! Both are filled lazily on read, or eagerly by `warm-cache`. Any post
//! change clears them.

use crate::cache::{Cache, CacheLayer};
use crate::db::repositories::{CategoryRepository, PostQuery, PostRepository};
use crate::models::{CategoryPosts, ListParams, PostSummary};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub const HOMEPAGE_KEY: &str = "homepage_data";
pub const CATEGORY_POSTS_KEY: &str = "category_posts_homepage";

const HOMEPAGE_TTL: Duration = Duration::from_secs(900);
const CATEGORY_POSTS_TTL: Duration = Duration::from_secs(1800);

const TRENDING_COUNT: i64 = 2;
const EDITORS_PICKS_COUNT: u32 = 5;
const POSTS_PER_CATEGORY: u32 = 6;

/// Blocks at the top of the homepage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HomepageData {
    /// Latest featured post, or the latest post when none is featured
    pub featured_post: Option<PostSummary>,
    /// Most viewed posts
    pub trending: Vec<PostSummary>,
    /// Latest editor's picks, or the latest posts after the first when there are none
    pub editors_picks: Vec<PostSummary>,
}

/// Which cached entries `clear` removes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearScope {
    /// Everything in the cache
    All,
    /// The two homepage keys
    Homepage,
    /// Homepage keys plus cached post and category lookups
    Blog,
}

/// Result of a warm run; `false` means that key failed and was logged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WarmReport {
    pub homepage: bool,
    pub category_posts: bool,
    /// Categories included in the category block
    pub categories: usize,
}

pub struct HomepageService {
    post_repo: Arc<dyn PostRepository>,
    category_repo: Arc<dyn CategoryRepository>,
    cache: Arc<Cache>,
}

impl HomepageService {
    pub fn new(
        post_repo: Arc<dyn PostRepository>,
        category_repo: Arc<dyn CategoryRepository>,
        cache: Arc<Cache>,
    ) -> Self {
        Self {
            post_repo,
            category_repo,
            cache,
        }
    }

    /// Cached homepage blocks, built on a miss
    pub async fn homepage_data(&self) -> Result<HomepageData> {
        if let Some(data) = self.cache.get::<HomepageData>(HOMEPAGE_KEY).await.ok().flatten() {
            return Ok(data);
        }
        tracing::debug!("Cache miss for {}", HOMEPAGE_KEY);

        let data = self.build_homepage_data().await?;
        let _ = self.cache.set(HOMEPAGE_KEY, &data, HOMEPAGE_TTL).await;
        Ok(data)
    }

    /// Cached per-category blocks, built on a miss
    pub async fn category_posts(&self) -> Result<Vec<CategoryPosts>> {
        if let Some(blocks) = self
            .cache
            .get::<Vec<CategoryPosts>>(CATEGORY_POSTS_KEY)
            .await
            .ok()
            .flatten()
        {
            return Ok(blocks);
        }
        tracing::debug!("Cache miss for {}", CATEGORY_POSTS_KEY);

        let blocks = self.build_category_posts().await?;
        let _ = self.cache.set(CATEGORY_POSTS_KEY, &blocks, CATEGORY_POSTS_TTL).await;
        Ok(blocks)
    }

    /// Rebuild both keys, logging failures
    pub async fn warm(&self) -> WarmReport {
        let mut report = WarmReport {
            homepage: false,
            category_posts: false,
            categories: 0,
        };

        match self.build_homepage_data().await {
            Ok(data) => match self.cache.set(HOMEPAGE_KEY, &data, HOMEPAGE_TTL).await {
                Ok(()) => report.homepage = true,
                Err(e) => tracing::warn!("Failed to cache homepage data: {:#}", e),
            },
            Err(e) => tracing::warn!("Failed to build homepage data: {:#}", e),
        }

        match self.build_category_posts().await {
            Ok(blocks) => {
                report.categories = blocks.len();
                match self.cache.set(CATEGORY_POSTS_KEY, &blocks, CATEGORY_POSTS_TTL).await {
                    Ok(()) => report.category_posts = true,
                    Err(e) => tracing::warn!("Failed to cache category posts: {:#}", e),
                }
            }
            Err(e) => tracing::warn!("Failed to build category posts: {:#}", e),
        }

        tracing::info!(
            "Cache warm finished (homepage: {}, categories: {})",
            report.homepage,
            report.categories
        );
        report
    }

    pub async fn clear(&self, scope: ClearScope) -> Result<()> {
        match scope {
            ClearScope::All => self.cache.clear().await?,
            ClearScope::Homepage => self.clear_homepage().await?,
            ClearScope::Blog => {
                self.clear_homepage().await?;
                self.cache.delete_pattern("post:*").await?;
                self.cache.delete_pattern("category:*").await?;
            }
        }
        tracing::info!("Cleared cache ({:?})", scope);
        Ok(())
    }

    /// Drop both homepage keys; called after every post change
    pub async fn clear_homepage(&self) -> Result<()> {
        self.cache.delete(HOMEPAGE_KEY).await?;
        self.cache.delete(CATEGORY_POSTS_KEY).await?;
        Ok(())
    }

    async fn build_homepage_data(&self) -> Result<HomepageData> {
        let featured_post = self
            .post_repo
            .featured()
            .await
            .context("Failed to load featured post")?;

        let trending = self
            .post_repo
            .most_viewed(TRENDING_COUNT)
            .await
            .context("Failed to load trending posts")?;

        let (mut editors_picks, _) = self
            .post_repo
            .list(
                &PostQuery::published().with_editors_pick(true),
                &ListParams::new(1, EDITORS_PICKS_COUNT),
            )
            .await
            .context("Failed to load editor's picks")?;

        if editors_picks.is_empty() {
            let (latest, _) = self
                .post_repo
                .list(
                    &PostQuery::published(),
                    &ListParams::new(1, EDITORS_PICKS_COUNT + 1),
                )
                .await
                .context("Failed to load latest posts")?;
            editors_picks = latest.into_iter().skip(1).collect();
        }

        Ok(HomepageData {
            featured_post,
            trending,
            editors_picks,
        })
    }

    async fn build_category_posts(&self) -> Result<Vec<CategoryPosts>> {
        let categories = self
            .category_repo
            .list()
            .await
            .context("Failed to list categories")?;

        let mut blocks = Vec::new();
        for category in categories {
            let (posts, _) = self
                .post_repo
                .list(
                    &PostQuery::published().with_category(category.id),
                    &ListParams::new(1, POSTS_PER_CATEGORY),
                )
                .await
                .with_context(|| format!("Failed to load posts for category {}", category.id))?;

            if !posts.is_empty() {
                blocks.push(CategoryPosts { category, posts });
            }
        }
        Ok(blocks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::db::repositories::{
        SqlxCategoryRepository, SqlxPostRepository, SqlxUserRepository, UserRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::{Category, Post, PublishStatus, User};

    struct Fixture {
        service: HomepageService,
        posts: Arc<dyn PostRepository>,
        cache: Arc<Cache>,
        category_id: i64,
        author_id: i64,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let categories = SqlxCategoryRepository::boxed(pool.clone());
        categories
            .create(&Category::new("Empty".into(), "empty".into()))
            .await
            .unwrap();
        let category = categories
            .create(&Category::new("Rust".into(), "rust".into()))
            .await
            .unwrap();
        let author = SqlxUserRepository::new(pool.clone())
            .create(&User::new("author".into(), "author@example.com".into(), String::new()), false)
            .await
            .unwrap();

        let posts = SqlxPostRepository::boxed(pool.clone());
        let cache = Arc::new(Cache::Memory(MemoryCache::new()));
        Fixture {
            service: HomepageService::new(posts.clone(), categories, cache.clone()),
            posts,
            cache,
            category_id: category.id,
            author_id: author.id,
        }
    }

    async fn publish(f: &Fixture, slug: &str, views: i64, pick: bool) -> Post {
        let mut post = Post::new(slug.to_uppercase(), slug.to_string(), f.category_id, f.author_id);
        post.status = PublishStatus::Published;
        post.views = views;
        post.is_editors_pick = pick;
        f.posts.create(&post).await.unwrap()
    }

    #[tokio::test]
    async fn test_warm_fills_both_keys_and_clear_removes_them() {
        let f = setup().await;
        publish(&f, "one", 5, false).await;
        publish(&f, "two", 50, true).await;

        let report = f.service.warm().await;
        assert!(report.homepage && report.category_posts);
        assert_eq!(report.categories, 1);

        let data: HomepageData = f.cache.get(HOMEPAGE_KEY).await.unwrap().unwrap();
        assert_eq!(data.trending[0].post.slug, "two");
        assert_eq!(data.editors_picks.len(), 1);
        let blocks: Vec<CategoryPosts> = f.cache.get(CATEGORY_POSTS_KEY).await.unwrap().unwrap();
        assert_eq!(blocks[0].category.slug, "rust");
        assert_eq!(blocks[0].posts.len(), 2);

        f.service.clear(ClearScope::Homepage).await.unwrap();
        assert!(f.cache.get::<HomepageData>(HOMEPAGE_KEY).await.unwrap().is_none());
        assert!(f
            .cache
            .get::<Vec<CategoryPosts>>(CATEGORY_POSTS_KEY)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_editors_picks_fall_back_to_latest_after_first() {
        let f = setup().await;
        for slug in ["a", "b", "c"] {
            publish(&f, slug, 0, false).await;
        }

        let data = f.service.homepage_data().await.unwrap();
        assert!(data.featured_post.is_some());
        assert_eq!(data.editors_picks.len(), 2);
        let featured_id = data.featured_post.unwrap().post.id;
        assert!(data.editors_picks.iter().all(|p| p.post.id != featured_id));
    }

    #[tokio::test]
    async fn test_drafts_are_left_out() {
        let f = setup().await;
        let draft = Post::new("Draft".into(), "draft".into(), f.category_id, f.author_id);
        f.posts.create(&draft).await.unwrap();

        let data = f.service.homepage_data().await.unwrap();
        assert!(data.featured_post.is_none());
        assert!(data.trending.is_empty());
        assert!(f.service.category_posts().await.unwrap().is_empty());
    }
}
