//! Category model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PostSummary;

/// Flat post category
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub id: i64,
    pub category_name: String,
    pub slug: String,
    pub description: String,
    /// At most 70 chars
    pub seo_title: String,
    /// At most 160 chars
    pub seo_description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Category {
    pub fn new(category_name: String, slug: String) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            category_name,
            slug,
            description: String::new(),
            seo_title: String::new(),
            seo_description: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn path(&self) -> String {
        format!("/category/{}", self.slug)
    }
}

/// Category with its published post count, for navigation and the dashboard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryWithCount {
    #[serde(flatten)]
    pub category: Category,
    pub post_count: i64,
}

/// Homepage block: a category and its latest posts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryPosts {
    pub category: Category,
    pub posts: Vec<PostSummary>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateCategoryInput {
    pub category_name: String,
    /// Generated from the name when empty
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub seo_title: String,
    #[serde(default)]
    pub seo_description: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCategoryInput {
    pub category_name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_new() {
        let category = Category::new("Rust".to_string(), "rust".to_string());
        assert_eq!(category.id, 0);
        assert_eq!(category.path(), "/category/rust");
        assert!(category.description.is_empty());
    }
}
