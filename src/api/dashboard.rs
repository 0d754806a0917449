//! Admin dashboard API
//!
//! Everything under `/api/v1/dashboard` is wrapped in `require_admin` and
//! `no_cache_headers` by the router.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::common::AdminPaginationQuery;
use crate::api::middleware::{AdminUser, ApiError, AppState};
use crate::api::responses::MessageResponse;
use crate::api::upload;
use crate::models::{
    Category, CategoryWithCount, CreateCategoryInput, CreatePageInput, CreatePostInput,
    CreateSocialLinkInput, ListParams, Page, PagedResult, Post, PostFlagsInput, PostSummary,
    Profile, PublishStatus, SiteSettings, SocialLink, Tag, UpdateCategoryInput, UpdatePageInput,
    UpdatePostInput, UpdateSettingsInput, UpdateSocialLinkInput, UpdateUserInput, User,
};
use crate::services::{ClearScope, WarmReport};

#[derive(Debug, Serialize)]
pub struct PostCounts {
    pub total: i64,
    pub published: i64,
    pub draft: i64,
}

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub posts: PostCounts,
    pub categories: i64,
    pub users: i64,
    pub pages: i64,
    pub comments: i64,
    pub pending_comments: i64,
    pub flagged_comments: i64,
}

/// Post with its tag names, for the edit form
#[derive(Debug, Serialize)]
pub struct PostWithTags {
    #[serde(flatten)]
    pub post: Post,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Serialize)]
pub struct UserDetail {
    pub user: User,
    pub profile: Profile,
}

#[derive(Debug, Deserialize)]
pub struct PageListQuery {
    pub status: Option<PublishStatus>,
}

#[derive(Debug, Deserialize)]
pub struct CommentBanRequest {
    /// `null` lifts the ban
    pub until: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct ModeratorRequest {
    pub enabled: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheScope {
    All,
    #[default]
    Homepage,
    Blog,
}

impl From<CacheScope> for ClearScope {
    fn from(scope: CacheScope) -> Self {
        match scope {
            CacheScope::All => ClearScope::All,
            CacheScope::Homepage => ClearScope::Homepage,
            CacheScope::Blog => ClearScope::Blog,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ClearCacheRequest {
    #[serde(default)]
    pub scope: CacheScope,
}

pub fn router(max_upload_size: u64) -> Router<AppState> {
    Router::new()
        .route("/", get(stats))
        // Categories
        .route("/categories", get(list_categories).post(create_category))
        .route(
            "/categories/{id}",
            get(get_category).put(update_category).delete(delete_category),
        )
        // Posts
        .route("/posts", get(list_posts).post(create_post))
        .route("/posts/{id}", get(get_post).put(update_post).delete(delete_post))
        .route("/posts/{id}/flags", put(set_post_flags))
        // Users
        .route("/users", get(list_users))
        .route("/users/{id}", get(get_user).put(update_user).delete(delete_user))
        .route("/users/{id}/comment-ban", post(set_comment_ban))
        .route("/users/{id}/comment-moderator", post(set_comment_moderator))
        // Pages
        .route("/pages", get(list_pages).post(create_page))
        .route("/pages/{id}", get(get_page).put(update_page).delete(delete_page))
        // Settings
        .route("/settings", get(get_settings).put(update_settings))
        .route("/social-links", get(list_social_links).post(create_social_link))
        .route(
            "/social-links/{id}",
            put(update_social_link).delete(delete_social_link),
        )
        // Cache
        .route("/cache/clear", post(clear_cache))
        .route("/cache/warm", post(warm_cache))
        .nest("/uploads", upload::router(max_upload_size))
}

/// GET /api/v1/dashboard
async fn stats(State(state): State<AppState>) -> Result<Json<DashboardStats>, ApiError> {
    let posts = PostCounts {
        total: state.post_service.count(None).await?,
        published: state
            .post_service
            .count(Some(PublishStatus::Published))
            .await?,
        draft: state.post_service.count(Some(PublishStatus::Draft)).await?,
    };
    let (comments, pending_comments, flagged_comments) = state.comment_service.counts().await?;

    Ok(Json(DashboardStats {
        posts,
        categories: state.category_service.count().await?,
        users: state.user_service.count().await?,
        pages: state.page_service.count().await?,
        comments,
        pending_comments,
        flagged_comments,
    }))
}

// ============================================================================
// Categories
// ============================================================================

async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<Vec<CategoryWithCount>>, ApiError> {
    Ok(Json(state.category_service.list_with_counts().await?))
}

async fn create_category(
    State(state): State<AppState>,
    Json(body): Json<CreateCategoryInput>,
) -> Result<impl IntoResponse, ApiError> {
    let category = state.category_service.create(body).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Category>, ApiError> {
    Ok(Json(state.category_service.get_by_id(id).await?))
}

async fn update_category(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateCategoryInput>,
) -> Result<Json<Category>, ApiError> {
    Ok(Json(state.category_service.update(id, body).await?))
}

/// 409 `CATEGORY_IN_USE` while posts reference the category
async fn delete_category(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.category_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Posts
// ============================================================================

async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<AdminPaginationQuery>,
) -> Result<Json<PagedResult<PostSummary>>, ApiError> {
    let posts = state
        .post_service
        .list_admin(query.status, ListParams::new(query.page, query.per_page))
        .await?;
    Ok(Json(posts))
}

async fn create_post(
    State(state): State<AppState>,
    AdminUser(user): AdminUser,
    Json(body): Json<CreatePostInput>,
) -> Result<impl IntoResponse, ApiError> {
    let post = state.post_service.create(user.id, body).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<PostWithTags>, ApiError> {
    let post = state.post_service.get_by_id(id).await?;
    let tags = state.post_service.tags_for(id).await?;
    Ok(Json(PostWithTags { post, tags }))
}

/// Publishing a draft here triggers the newsletter
async fn update_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdatePostInput>,
) -> Result<Json<Post>, ApiError> {
    Ok(Json(state.post_service.update(id, body).await?))
}

async fn delete_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.post_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_post_flags(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<PostFlagsInput>,
) -> Result<Json<Post>, ApiError> {
    Ok(Json(state.post_service.set_flags(id, body).await?))
}

// ============================================================================
// Users
// ============================================================================

async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<AdminPaginationQuery>,
) -> Result<Json<PagedResult<User>>, ApiError> {
    let users = state
        .user_service
        .list_users(ListParams::new(query.page, query.per_page))
        .await?;
    Ok(Json(users))
}

async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<UserDetail>, ApiError> {
    let user = state
        .user_service
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    let profile = state.user_service.get_profile(id).await?;
    Ok(Json(UserDetail { user, profile }))
}

async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateUserInput>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.user_service.admin_update(id, body).await?))
}

async fn delete_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.user_service.delete_user(admin.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/dashboard/users/{id}/comment-ban `{until|null}`
async fn set_comment_ban(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<CommentBanRequest>,
) -> Result<Json<Profile>, ApiError> {
    Ok(Json(state.user_service.set_comment_ban(id, body.until).await?))
}

async fn set_comment_moderator(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<ModeratorRequest>,
) -> Result<Json<Profile>, ApiError> {
    let profile = state
        .user_service
        .set_comment_moderator(id, body.enabled)
        .await?;
    Ok(Json(profile))
}

// ============================================================================
// Pages
// ============================================================================

async fn list_pages(
    State(state): State<AppState>,
    Query(query): Query<PageListQuery>,
) -> Result<Json<Vec<Page>>, ApiError> {
    Ok(Json(state.page_service.list(query.status).await?))
}

async fn create_page(
    State(state): State<AppState>,
    Json(body): Json<CreatePageInput>,
) -> Result<impl IntoResponse, ApiError> {
    let page = state.page_service.create(body).await?;
    Ok((StatusCode::CREATED, Json(page)))
}

async fn get_page(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Page>, ApiError> {
    Ok(Json(state.page_service.get_by_id(id).await?))
}

async fn update_page(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdatePageInput>,
) -> Result<Json<Page>, ApiError> {
    Ok(Json(state.page_service.update(id, body).await?))
}

async fn delete_page(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.page_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Settings
// ============================================================================

async fn get_settings(State(state): State<AppState>) -> Result<Json<SiteSettings>, ApiError> {
    Ok(Json(state.settings_service.site_settings().await?))
}

async fn update_settings(
    State(state): State<AppState>,
    Json(body): Json<UpdateSettingsInput>,
) -> Result<Json<SiteSettings>, ApiError> {
    Ok(Json(state.settings_service.update(body).await?))
}

async fn list_social_links(
    State(state): State<AppState>,
) -> Result<Json<Vec<SocialLink>>, ApiError> {
    Ok(Json(state.settings_service.social_links().await?))
}

async fn create_social_link(
    State(state): State<AppState>,
    Json(body): Json<CreateSocialLinkInput>,
) -> Result<impl IntoResponse, ApiError> {
    let link = state.settings_service.create_social_link(body).await?;
    Ok((StatusCode::CREATED, Json(link)))
}

async fn update_social_link(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateSocialLinkInput>,
) -> Result<Json<SocialLink>, ApiError> {
    Ok(Json(state.settings_service.update_social_link(id, body).await?))
}

async fn delete_social_link(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.settings_service.delete_social_link(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Cache
// ============================================================================

/// POST /api/v1/dashboard/cache/clear `{scope: all|homepage|blog}`
///
/// An empty body clears the homepage keys.
async fn clear_cache(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<MessageResponse>, ApiError> {
    let request: ClearCacheRequest = if body.is_empty() {
        ClearCacheRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::validation_error(format!("Invalid request body: {}", e)))?
    };
    state.homepage_service.clear(request.scope.into()).await?;
    Ok(Json(MessageResponse::new("Cache cleared")))
}

/// POST /api/v1/dashboard/cache/warm
async fn warm_cache(State(state): State<AppState>) -> Json<WarmReport> {
    Json(state.homepage_service.warm().await)
}
