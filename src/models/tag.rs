//! Tag model

use serde::{Deserialize, Serialize};

/// Free-form label attached to posts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tag {
    pub id: i64,
    /// Unique ignoring case
    pub name: String,
    pub slug: String,
}

impl Tag {
    pub fn new(name: String, slug: String) -> Self {
        Self { id: 0, name, slug }
    }

    pub fn path(&self) -> String {
        format!("/tag/{}", self.slug)
    }
}

/// Tag with the number of published posts carrying it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagWithCount {
    #[serde(flatten)]
    pub tag: Tag,
    pub post_count: i64,
}
