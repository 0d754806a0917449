//! Comment API endpoints
//!
//! Reading threads is public. Writing needs a session, moderation needs an
//! admin or a profile moderator, analytics need an admin.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::PageQuery;
use crate::api::middleware::{AdminUser, ApiError, AppState, AuthenticatedUser, ModeratorUser};
use crate::api::responses::MessageResponse;
use crate::models::{
    CommentAnalyticsReport, CommentNode, CommentSearchHit, CommentStats, CommentView,
    ContentType, CreateCommentInput, FlagCommentInput, FlagView, LikeToggle, ModerationAction,
    ModerationFilter, PagedResult, UpdateCommentInput, UserCommentStats,
};
use crate::services::FlagOutcome;

#[derive(Debug, Deserialize)]
pub struct CommentSearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Deserialize)]
pub struct ModerationQuery {
    #[serde(default)]
    pub filter: ModerationFilter,
}

#[derive(Debug, Deserialize)]
pub struct ModerateRequest {
    pub action: ModerationAction,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/add", post(create_comment))
        .route("/search", get(search_comments))
        .route("/mine", get(my_comments))
        .route("/moderate", get(moderation_queue))
        .route("/analytics", get(analytics))
        .route("/analytics/users/{id}", get(user_analytics))
        .route("/export.csv", get(export_csv))
        .route("/for/{content_type}/{object_id}", get(thread))
        .route("/for/{content_type}/{object_id}/more", get(more))
        .route("/stats/{content_type}/{object_id}", get(stats))
        .route("/flags/{id}/review", post(review_flag))
        .route("/{id}", put(update_comment).delete(delete_comment))
        .route("/{id}/flag", post(flag_comment))
        .route("/{id}/like", post(toggle_like))
        .route("/{id}/replies", get(replies))
        .route("/{id}/moderate", post(moderate))
        .route("/{id}/flags", get(list_flags))
}

fn parse_content_type(raw: &str) -> Result<ContentType, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::validation_error(format!("Invalid content type: {}", raw)))
}

// ============================================================================
// Writing
// ============================================================================

/// POST /api/v1/comments/add
async fn create_comment(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(body): Json<CreateCommentInput>,
) -> Result<impl IntoResponse, ApiError> {
    let view = state.comment_service.create(&user, body).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// PUT /api/v1/comments/{id}
async fn update_comment(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateCommentInput>,
) -> Result<Json<CommentView>, ApiError> {
    Ok(Json(state.comment_service.update(&user, id, body).await?))
}

/// DELETE /api/v1/comments/{id}
///
/// Replies go with it.
async fn delete_comment(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.comment_service.delete(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/comments/{id}/flag
async fn flag_comment(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<FlagCommentInput>,
) -> Result<Json<FlagOutcome>, ApiError> {
    Ok(Json(state.comment_service.flag(&user, id, body).await?))
}

/// POST /api/v1/comments/{id}/like
async fn toggle_like(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<LikeToggle>, ApiError> {
    Ok(Json(state.comment_service.toggle_like(&user, id).await?))
}

// ============================================================================
// Reading
// ============================================================================

/// GET /api/v1/comments/for/{content_type}/{object_id}
async fn thread(
    State(state): State<AppState>,
    Path((content_type, object_id)): Path<(String, i64)>,
) -> Result<Json<Vec<CommentNode>>, ApiError> {
    let content_type = parse_content_type(&content_type)?;
    Ok(Json(state.comment_service.thread(content_type, object_id).await?))
}

/// GET /api/v1/comments/for/{content_type}/{object_id}/more?page=
async fn more(
    State(state): State<AppState>,
    Path((content_type, object_id)): Path<(String, i64)>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PagedResult<CommentView>>, ApiError> {
    let content_type = parse_content_type(&content_type)?;
    let page = state
        .comment_service
        .more(content_type, object_id, query.page)
        .await?;
    Ok(Json(page))
}

/// GET /api/v1/comments/{id}/replies
async fn replies(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<CommentView>>, ApiError> {
    Ok(Json(state.comment_service.replies(id).await?))
}

/// GET /api/v1/comments/search?q=
async fn search_comments(
    State(state): State<AppState>,
    Query(query): Query<CommentSearchQuery>,
) -> Result<Json<Vec<CommentSearchHit>>, ApiError> {
    Ok(Json(state.comment_service.search(&query.q).await?))
}

/// GET /api/v1/comments/stats/{content_type}/{object_id}
async fn stats(
    State(state): State<AppState>,
    Path((content_type, object_id)): Path<(String, i64)>,
) -> Result<Json<CommentStats>, ApiError> {
    let content_type = parse_content_type(&content_type)?;
    Ok(Json(state.comment_service.stats(content_type, object_id).await?))
}

/// GET /api/v1/comments/mine?page=
async fn my_comments(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<PagedResult<CommentView>>, ApiError> {
    Ok(Json(state.comment_service.mine(user.id, query.page).await?))
}

// ============================================================================
// Moderation
// ============================================================================

/// GET /api/v1/comments/moderate?filter=pending|flagged|all
async fn moderation_queue(
    State(state): State<AppState>,
    _moderator: ModeratorUser,
    Query(query): Query<ModerationQuery>,
) -> Result<Json<Vec<CommentView>>, ApiError> {
    Ok(Json(state.comment_service.moderation_queue(query.filter).await?))
}

/// POST /api/v1/comments/{id}/moderate
async fn moderate(
    State(state): State<AppState>,
    ModeratorUser(moderator): ModeratorUser,
    Path(id): Path<i64>,
    Json(body): Json<ModerateRequest>,
) -> Result<Json<CommentView>, ApiError> {
    let view = state
        .comment_service
        .moderate(&moderator, id, body.action)
        .await?;
    Ok(Json(view))
}

/// GET /api/v1/comments/{id}/flags
async fn list_flags(
    State(state): State<AppState>,
    _moderator: ModeratorUser,
    Path(id): Path<i64>,
) -> Result<Json<Vec<FlagView>>, ApiError> {
    Ok(Json(state.comment_service.flags(id).await?))
}

/// POST /api/v1/comments/flags/{id}/review
async fn review_flag(
    State(state): State<AppState>,
    _moderator: ModeratorUser,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.comment_service.review_flag(id).await?;
    Ok(Json(MessageResponse::new("Flag reviewed")))
}

// ============================================================================
// Analytics
// ============================================================================

/// GET /api/v1/comments/analytics
async fn analytics(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<CommentAnalyticsReport>, ApiError> {
    Ok(Json(state.comment_analytics.report().await?))
}

/// GET /api/v1/comments/analytics/users/{id}
async fn user_analytics(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<i64>,
) -> Result<Json<UserCommentStats>, ApiError> {
    state
        .user_service
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(state.comment_analytics.user_stats(id).await?))
}

/// GET /api/v1/comments/export.csv
async fn export_csv(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<impl IntoResponse, ApiError> {
    let body = state.comment_analytics.export_csv().await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"comments.csv\"",
            ),
        ],
        body,
    ))
}
