//! Sitemap and robots.txt
//!
//! The sitemap lists the home page, every published post and every
//! category. A category's `lastmod` is its newest published post's
//! `updated_at`, or its own when it has none.

use crate::db::repositories::{CategoryRepository, PostRepository};
use crate::services::markdown::html_escape;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One `<url>` element
#[derive(Debug, Clone, PartialEq)]
pub struct SitemapEntry {
    pub loc: String,
    pub lastmod: Option<DateTime<Utc>>,
    pub changefreq: &'static str,
    pub priority: f32,
}

pub struct SitemapService {
    post_repo: Arc<dyn PostRepository>,
    category_repo: Arc<dyn CategoryRepository>,
    site_url: String,
}

impl SitemapService {
    pub fn new(
        post_repo: Arc<dyn PostRepository>,
        category_repo: Arc<dyn CategoryRepository>,
        site_url: &str,
    ) -> Self {
        Self {
            post_repo,
            category_repo,
            site_url: site_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn entries(&self) -> Result<Vec<SitemapEntry>> {
        let mut entries = vec![SitemapEntry {
            loc: format!("{}/", self.site_url),
            lastmod: None,
            changefreq: "monthly",
            priority: 0.5,
        }];

        let posts = self
            .post_repo
            .all_published()
            .await
            .context("Failed to load published posts")?;
        entries.extend(posts.iter().map(|summary| SitemapEntry {
            loc: format!("{}{}", self.site_url, summary.url()),
            lastmod: Some(summary.post.updated_at),
            changefreq: "weekly",
            priority: 0.8,
        }));

        let latest = self
            .post_repo
            .latest_update_by_category()
            .await
            .context("Failed to load category update times")?;
        let categories = self
            .category_repo
            .list()
            .await
            .context("Failed to load categories")?;
        entries.extend(categories.iter().map(|category| SitemapEntry {
            loc: format!("{}{}", self.site_url, category.path()),
            lastmod: Some(latest.get(&category.id).copied().unwrap_or(category.updated_at)),
            changefreq: "monthly",
            priority: 0.6,
        }));

        Ok(entries)
    }

    pub async fn render_xml(&self) -> Result<String> {
        let entries = self.entries().await?;

        let mut xml = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n",
        );
        for entry in &entries {
            xml.push_str("  <url>\n");
            xml.push_str(&format!("    <loc>{}</loc>\n", html_escape(&entry.loc)));
            if let Some(lastmod) = entry.lastmod {
                xml.push_str(&format!("    <lastmod>{}</lastmod>\n", lastmod.format("%Y-%m-%d")));
            }
            xml.push_str(&format!("    <changefreq>{}</changefreq>\n", entry.changefreq));
            xml.push_str(&format!("    <priority>{:.1}</priority>\n", entry.priority));
            xml.push_str("  </url>\n");
        }
        xml.push_str("</urlset>\n");
        Ok(xml)
    }

    pub fn robots_txt(&self) -> String {
        format!(
            "User-agent: *\nAllow: /\nDisallow: /dashboard\nDisallow: /api/\nDisallow: /accounts/\n\nSitemap: {}/sitemap.xml\n",
            self.site_url
        )
    }

    /// Write `sitemap.xml` into `dir`, creating it if needed
    pub async fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        let xml = self.render_xml().await?;
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let path = dir.join("sitemap.xml");
        tokio::fs::write(&path, xml)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!("Wrote sitemap to {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        SqlxCategoryRepository, SqlxPostRepository, SqlxUserRepository, UserRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::{Category, Post, PublishStatus, User};

    async fn setup() -> SitemapService {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let author = SqlxUserRepository::new(pool.clone())
            .create(&User::new("a".into(), "a@example.com".into(), String::new()), false)
            .await
            .unwrap();
        let categories = SqlxCategoryRepository::boxed(pool.clone());
        let rust = categories
            .create(&Category::new("Rust".into(), "rust".into()))
            .await
            .unwrap();
        categories
            .create(&Category::new("Empty".into(), "empty".into()))
            .await
            .unwrap();

        let posts = SqlxPostRepository::boxed(pool);
        let mut live = Post::new("Live".into(), "live".into(), rust.id, author.id);
        live.status = PublishStatus::Published;
        posts.create(&live).await.unwrap();
        posts
            .create(&Post::new("Draft".into(), "draft".into(), rust.id, author.id))
            .await
            .unwrap();

        SitemapService::new(posts, categories, "https://blog.example/")
    }

    #[tokio::test]
    async fn test_sitemap_lists_published_posts_only() {
        let service = setup().await;
        let xml = service.render_xml().await.unwrap();

        assert!(xml.contains("<loc>https://blog.example/</loc>"));
        assert!(xml.contains("<loc>https://blog.example/rust/live/</loc>"));
        assert!(!xml.contains("draft"));
        assert!(xml.contains("<loc>https://blog.example/category/rust</loc>"));
        assert!(xml.contains("<loc>https://blog.example/category/empty</loc>"));
        assert!(xml.contains("<priority>0.8</priority>"));

        let entries = service.entries().await.unwrap();
        assert_eq!(entries.len(), 4);
        assert!(entries.iter().skip(1).all(|e| e.lastmod.is_some()));
    }

    #[tokio::test]
    async fn test_robots_and_write() {
        let service = setup().await;
        let robots = service.robots_txt();
        assert!(robots.contains("Disallow: /dashboard"));
        assert!(robots.ends_with("Sitemap: https://blog.example/sitemap.xml\n"));

        let dir = tempfile::tempdir().unwrap();
        let path = service.write_to(&dir.path().join("out")).await.unwrap();
        let written = std::fs::read_to_string(path).unwrap();
        assert!(written.starts_with("<?xml"));
    }
}
