//! Common API query types

use serde::Deserialize;

use crate::models::PublishStatus;

/// Default page number (1-indexed)
pub fn default_page() -> u32 {
    1
}

/// Default page size for dashboard listings
pub fn default_per_page() -> u32 {
    20
}

/// `?page=`
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: u32,
}

/// `?page=&per_page=` for dashboard listings
#[derive(Debug, Deserialize)]
pub struct AdminPaginationQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    pub status: Option<PublishStatus>,
}

/// `?q=&page=`
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    #[serde(default = "default_page")]
    pub page: u32,
}
