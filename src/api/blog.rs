//! Public blog endpoints
//!
//! - GET /api/v1/home - Homepage blocks plus the paged post list
//! - GET /api/v1/posts - Published posts
//! - GET /api/v1/posts/{category_slug}/{slug} - Post detail
//! - GET /api/v1/categories, /api/v1/categories/{slug}/posts
//! - GET /api/v1/tags, /api/v1/tags/{slug}/posts, /api/v1/tags/suggest
//! - GET /api/v1/search

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::common::{PageQuery, SearchQuery};
use crate::api::middleware::{ApiError, AppState};
use crate::models::{
    Category, CategoryWithCount, ListParams, PagedResult, PostDetail, PostSummary, Tag,
    TagWithCount,
};
use crate::services::homepage::HomepageData;
use crate::services::post::PUBLIC_PAGE_SIZE;
use crate::services::PostServiceError;

#[derive(Debug, Serialize)]
pub struct HomeResponse {
    #[serde(flatten)]
    pub blocks: HomepageData,
    pub posts: PagedResult<PostSummary>,
}

#[derive(Debug, Serialize)]
pub struct CategoryPostsResponse {
    pub category: Category,
    pub posts: PagedResult<PostSummary>,
}

#[derive(Debug, Serialize)]
pub struct TagPostsResponse {
    pub tag: Tag,
    pub posts: PagedResult<PostSummary>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub posts: PagedResult<PostSummary>,
}

#[derive(Debug, Deserialize)]
pub struct SuggestQuery {
    #[serde(default)]
    pub q: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/home", get(home))
        .route("/posts", get(list_posts))
        .route("/posts/{category_slug}/{slug}", get(post_detail))
        .route("/categories", get(list_categories))
        .route("/categories/{slug}/posts", get(category_posts))
        .route("/tags", get(list_tags))
        .route("/tags/suggest", get(suggest_tags))
        .route("/tags/{slug}/posts", get(tag_posts))
        .route("/search", get(search))
}

/// GET /api/v1/home
async fn home(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<HomeResponse>, ApiError> {
    let blocks = state.homepage_service.homepage_data().await?;
    let posts = state.post_service.home_posts(query.page).await?;
    Ok(Json(HomeResponse { blocks, posts }))
}

/// GET /api/v1/posts
async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PagedResult<PostSummary>>, ApiError> {
    let posts = state
        .post_service
        .list_published(ListParams::new(query.page, PUBLIC_PAGE_SIZE))
        .await?;
    Ok(Json(posts))
}

/// GET /api/v1/posts/{category_slug}/{slug}
///
/// Counts a view on every hit.
async fn post_detail(
    State(state): State<AppState>,
    Path((category_slug, slug)): Path<(String, String)>,
) -> Result<Json<PostDetail>, ApiError> {
    Ok(Json(state.post_service.detail(&category_slug, &slug).await?))
}

/// GET /api/v1/categories
async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<Vec<CategoryWithCount>>, ApiError> {
    Ok(Json(state.category_service.list_with_counts().await?))
}

/// GET /api/v1/categories/{slug}/posts
async fn category_posts(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<CategoryPostsResponse>, ApiError> {
    let (category, posts) = state
        .post_service
        .by_category(&slug, query.page)
        .await
        .map_err(|e| match e {
            PostServiceError::CategoryNotFound => ApiError::not_found("Category not found"),
            other => other.into(),
        })?;
    Ok(Json(CategoryPostsResponse { category, posts }))
}

/// GET /api/v1/tags
async fn list_tags(State(state): State<AppState>) -> Result<Json<Vec<TagWithCount>>, ApiError> {
    Ok(Json(state.tag_service.list_with_counts().await?))
}

/// GET /api/v1/tags/suggest?q=
async fn suggest_tags(
    State(state): State<AppState>,
    Query(query): Query<SuggestQuery>,
) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.tag_service.suggest(&query.q).await?))
}

/// GET /api/v1/tags/{slug}/posts
async fn tag_posts(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<TagPostsResponse>, ApiError> {
    let (tag, posts) = state
        .post_service
        .by_tag(&slug, query.page)
        .await
        .map_err(|e| match e {
            PostServiceError::NotFound => ApiError::not_found("Tag not found"),
            other => other.into(),
        })?;
    Ok(Json(TagPostsResponse { tag, posts }))
}

/// GET /api/v1/search?q=&page=
async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchResponse>, ApiError> {
    let posts = state.post_service.search(&query.q, query.page).await?;
    Ok(Json(SearchResponse {
        query: query.q,
        posts,
    }))
}
