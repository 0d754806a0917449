//! Shared API response types and error mapping
//!
//! Every service error converts into an [`ApiError`], so handlers can use
//! `?` on service calls directly.

use serde::Serialize;

use crate::api::middleware::ApiError;
use crate::models::{Profile, User};
use crate::services::{
    CategoryServiceError, CommentServiceError, ImageServiceError, PageServiceError,
    PostServiceError, SettingsServiceError, SocialAuthError, TagServiceError, UserServiceError,
};

/// Signed-in user with the redirect the client should follow
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
    pub redirect: &'static str,
}

/// Account plus its profile preferences
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: User,
    pub profile: Profile,
    pub is_admin: bool,
    pub is_moderator: bool,
}

/// `{"message": ...}` acknowledgement
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// ============================================================================
// Service error conversions
// ============================================================================

impl From<UserServiceError> for ApiError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::AuthenticationError(msg) => ApiError::unauthorized(msg),
            UserServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            UserServiceError::UserExists(msg) => ApiError::conflict(msg),
            UserServiceError::NotFound => ApiError::not_found("User not found"),
            UserServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            UserServiceError::InternalError(e) => ApiError::internal(format!("{:#}", e)),
        }
    }
}

impl From<CategoryServiceError> for ApiError {
    fn from(err: CategoryServiceError) -> Self {
        match err {
            CategoryServiceError::NotFound => ApiError::not_found("Category not found"),
            e @ (CategoryServiceError::DuplicateName(_) | CategoryServiceError::DuplicateSlug(_)) => {
                ApiError::conflict(e.to_string())
            }
            e @ CategoryServiceError::CategoryInUse(count) => ApiError::with_details(
                "CATEGORY_IN_USE",
                e.to_string(),
                serde_json::json!({ "post_count": count }),
            ),
            CategoryServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            CategoryServiceError::InternalError(e) => ApiError::internal(format!("{:#}", e)),
        }
    }
}

impl From<PostServiceError> for ApiError {
    fn from(err: PostServiceError) -> Self {
        match err {
            PostServiceError::NotFound => ApiError::not_found("Post not found"),
            PostServiceError::CategoryNotFound => {
                ApiError::validation_error("Category does not exist")
            }
            PostServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            e @ PostServiceError::DuplicateSlug(_) => ApiError::conflict(e.to_string()),
            PostServiceError::InternalError(e) => ApiError::internal(format!("{:#}", e)),
        }
    }
}

impl From<TagServiceError> for ApiError {
    fn from(err: TagServiceError) -> Self {
        match err {
            TagServiceError::NotFound => ApiError::not_found("Tag not found"),
            TagServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            TagServiceError::InternalError(e) => ApiError::internal(format!("{:#}", e)),
        }
    }
}

impl From<PageServiceError> for ApiError {
    fn from(err: PageServiceError) -> Self {
        match err {
            PageServiceError::NotFound => ApiError::not_found("Page not found"),
            PageServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            e @ PageServiceError::DuplicateSlug(_) => ApiError::conflict(e.to_string()),
            PageServiceError::InternalError(e) => ApiError::internal(format!("{:#}", e)),
        }
    }
}

impl From<CommentServiceError> for ApiError {
    fn from(err: CommentServiceError) -> Self {
        match err {
            CommentServiceError::NotFound => ApiError::not_found("Comment not found"),
            CommentServiceError::TargetNotFound => {
                ApiError::not_found("The commented object does not exist")
            }
            CommentServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            CommentServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            CommentServiceError::Banned(until) => ApiError::with_details(
                "FORBIDDEN",
                "You are banned from commenting",
                serde_json::json!({ "until": until.to_rfc3339() }),
            ),
            CommentServiceError::RateLimited(retry_after) => ApiError::rate_limited(
                "Please wait before posting another comment",
                retry_after,
            ),
            CommentServiceError::AlreadyFlagged => {
                ApiError::conflict("You have already flagged this comment")
            }
            CommentServiceError::InternalError(e) => ApiError::internal(format!("{:#}", e)),
        }
    }
}

impl From<SettingsServiceError> for ApiError {
    fn from(err: SettingsServiceError) -> Self {
        match err {
            SettingsServiceError::NotFound => ApiError::not_found("Social link not found"),
            SettingsServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            SettingsServiceError::InternalError(e) => ApiError::internal(format!("{:#}", e)),
        }
    }
}

impl From<ImageServiceError> for ApiError {
    fn from(err: ImageServiceError) -> Self {
        match err {
            ImageServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            ImageServiceError::InternalError(e) => ApiError::internal(format!("{:#}", e)),
        }
    }
}

impl From<SocialAuthError> for ApiError {
    fn from(err: SocialAuthError) -> Self {
        match err {
            SocialAuthError::UnknownProvider(name) => {
                ApiError::not_found(format!("Unknown login provider: {}", name))
            }
            SocialAuthError::ProviderError(msg) => {
                tracing::warn!("Social login failed: {}", msg);
                ApiError::unauthorized("Could not sign in with this provider")
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::internal(format!("{:#}", err))
    }
}
