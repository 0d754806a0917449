//! Static page model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PublishStatus;

/// CMS page such as "About" or "Privacy"
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub id: i64,
    pub title: String,
    pub slug: String,
    /// Markdown
    pub content: String,
    pub status: PublishStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Page {
    pub fn new(title: String, slug: String, content: String, status: PublishStatus) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            title,
            slug,
            content,
            status,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_published(&self) -> bool {
        self.status == PublishStatus::Published
    }

    pub fn path(&self) -> String {
        format!("/page/{}", self.slug)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePageInput {
    pub title: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub status: PublishStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePageInput {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub content: Option<String>,
    pub status: Option<PublishStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_new() {
        let page = Page::new(
            "About".to_string(),
            "about".to_string(),
            "# About".to_string(),
            PublishStatus::Published,
        );
        assert_eq!(page.id, 0);
        assert!(page.is_published());
        assert_eq!(page.path(), "/page/about");
    }
}
