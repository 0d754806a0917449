//! Account self-service endpoints
//!
//! - GET/PUT /api/v1/accounts/profile
//! - POST /api/v1/accounts/social-optin
//! - POST /api/v1/accounts/unsubscribe
//! - GET /api/v1/accounts/toggle-theme

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Redirect},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::{cookie_value, ApiError, AppState, AuthenticatedUser};
use crate::api::responses::MessageResponse;
use crate::models::{Profile, UpdateProfileInput};
use crate::theme::{PageContext, THEME_COOKIE};

const THEME_COOKIE_MAX_AGE: u64 = 365 * 24 * 60 * 60;

#[derive(Debug, Deserialize)]
pub struct SocialOptInRequest {
    pub newsletter_opt_in: bool,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/profile", get(get_profile).put(update_profile))
        .route("/social-optin", post(social_optin))
        .route("/unsubscribe", post(unsubscribe))
        .route("/toggle-theme", get(toggle_theme))
}

/// GET /api/v1/accounts/profile
async fn get_profile(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<Profile>, ApiError> {
    Ok(Json(state.user_service.get_profile(user.id).await?))
}

/// PUT /api/v1/accounts/profile
async fn update_profile(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(body): Json<UpdateProfileInput>,
) -> Result<Json<Profile>, ApiError> {
    Ok(Json(state.user_service.update_profile(user.id, body).await?))
}

/// POST /api/v1/accounts/social-optin
///
/// Answer to the newsletter question asked after a social signup.
async fn social_optin(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(body): Json<SocialOptInRequest>,
) -> Result<Json<Profile>, ApiError> {
    let profile = state
        .user_service
        .set_newsletter_opt_in(user.id, body.newsletter_opt_in)
        .await?;
    Ok(Json(profile))
}

/// POST /api/v1/accounts/unsubscribe
async fn unsubscribe(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<MessageResponse>, ApiError> {
    state.user_service.set_newsletter_opt_in(user.id, false).await?;
    tracing::info!("User {} unsubscribed from the newsletter", user.id);
    Ok(Json(MessageResponse::new("You have been unsubscribed")))
}

/// GET /api/v1/accounts/toggle-theme
///
/// Flips between light and dark, then sends the browser back where it came from.
async fn toggle_theme(headers: HeaderMap) -> Result<impl IntoResponse, ApiError> {
    let current = PageContext::color_scheme(cookie_value(&headers, THEME_COOKIE).as_deref());
    let next = if current == "dark" { "light" } else { "dark" };

    let cookie = HeaderValue::from_str(&format!(
        "{}={}; Path=/; SameSite=Lax; Max-Age={}",
        THEME_COOKIE, next, THEME_COOKIE_MAX_AGE
    ))
    .map_err(ApiError::internal)?;

    let back = headers
        .get(header::REFERER)
        .and_then(|h| h.to_str().ok())
        .filter(|r| !r.is_empty())
        .unwrap_or("/")
        .to_string();

    Ok(([(header::SET_COOKIE, cookie)], Redirect::to(&back)))
}
