//! Authentication API endpoints
//!
//! - POST /api/v1/auth/register - Password registration
//! - POST /api/v1/auth/login - Login by username or email
//! - POST /api/v1/auth/logout - End the current session
//! - GET /api/v1/auth/me - Current user and profile
//! - GET /api/v1/auth/social/{provider}/login - Start an OAuth login
//! - GET /api/v1/auth/social/{provider}/callback - Finish an OAuth login

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{AppendHeaders, IntoResponse, Redirect},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::{
    clear_session_cookie, cookie_value, extract_session_token, session_cookie, ApiError, AppState,
    AuthenticatedUser, ClientIp,
};
use crate::api::responses::{AuthResponse, MeResponse};
use crate::models::CreateUserInput;
use crate::services::{LoginInput, SocialAuthService, UserService, UserServiceError};

/// Cookie holding the OAuth `state` between login and callback
pub const OAUTH_STATE_COOKIE: &str = "oauth_state";

/// Seconds a user has to finish the provider's consent screen
const OAUTH_STATE_MAX_AGE: u64 = 600;

/// Retry hints for the two login limits
const IP_RETRY_AFTER: u64 = 60;
const USERNAME_RETRY_AFTER: u64 = 15 * 60;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username_or_email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    /// Set by providers when the user declines
    pub error: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/me", get(me))
        .route("/social/{provider}/login", get(social_login))
        .route("/social/{provider}/callback", get(social_callback))
}

/// POST /api/v1/auth/register
///
/// The first account becomes a superuser. A session is opened right away.
async fn register(
    State(state): State<AppState>,
    Json(body): Json<CreateUserInput>,
) -> Result<impl IntoResponse, ApiError> {
    let password = body.password.clone();
    let user = state.user_service.register(body).await?;

    let (user, session) = state
        .user_service
        .login(LoginInput::new(&user.username, password))
        .await?;

    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, session_cookie(&session))],
        Json(AuthResponse {
            redirect: UserService::login_redirect(&user),
            token: session.id,
            user,
        }),
    ))
}

/// POST /api/v1/auth/login
///
/// Limited to 10 requests per IP per minute and 5 failures per username
/// per 15 minutes.
async fn login(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let limiter = &state.login_limiter;
    let username = body.username_or_email.trim().to_lowercase();

    if let Some(ip) = ip {
        if limiter.is_ip_limited(ip).await {
            tracing::warn!("Login rate limit hit for {}", ip);
            return Err(ApiError::rate_limited(
                "Too many requests, please try again later",
                IP_RETRY_AFTER,
            ));
        }
        limiter.record_ip_request(ip).await;
    }

    if limiter.is_username_limited(&username).await {
        return Err(ApiError::rate_limited(
            "Too many failed attempts, please try again in 15 minutes",
            USERNAME_RETRY_AFTER,
        ));
    }

    let (user, session) = match state
        .user_service
        .login(LoginInput::new(body.username_or_email, body.password))
        .await
    {
        Ok(pair) => pair,
        Err(e @ UserServiceError::AuthenticationError(_)) => {
            limiter.record_failed_attempt(&username).await;
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };
    limiter.clear_username_attempts(&username).await;
    tracing::info!("User {} logged in", user.username);

    Ok((
        [(header::SET_COOKIE, session_cookie(&session))],
        Json(AuthResponse {
            redirect: UserService::login_redirect(&user),
            token: session.id,
            user,
        }),
    ))
}

/// POST /api/v1/auth/logout
async fn logout(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let token = extract_session_token(&headers)
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;
    state.user_service.logout(&token).await?;

    Ok((
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, clear_session_cookie())],
    ))
}

/// GET /api/v1/auth/me
async fn me(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<MeResponse>, ApiError> {
    let profile = state.user_service.get_profile(user.id).await?;
    let is_moderator = state.user_service.is_moderator(&user).await?;
    Ok(Json(MeResponse {
        is_admin: user.is_admin(),
        is_moderator,
        profile,
        user,
    }))
}

/// GET /api/v1/auth/social/{provider}/login
async fn social_login(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let oauth_state = SocialAuthService::new_state();
    let url = state.social_auth.authorize_url(&provider, &oauth_state)?;

    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        OAUTH_STATE_COOKIE, oauth_state, OAUTH_STATE_MAX_AGE
    );
    let cookie = HeaderValue::from_str(&cookie).map_err(ApiError::internal)?;
    Ok(([(header::SET_COOKIE, cookie)], Redirect::to(&url)))
}

/// GET /api/v1/auth/social/{provider}/callback
///
/// New accounts land on the newsletter opt-in page, known ones on `/`.
async fn social_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(error) = query.error {
        tracing::info!("Provider {} returned error: {}", provider, error);
        return Err(ApiError::unauthorized("Sign-in was cancelled"));
    }

    let expected = cookie_value(&headers, OAUTH_STATE_COOKIE).filter(|s| !s.is_empty());
    match (expected, query.state) {
        (Some(expected), Some(given)) if expected == given => {}
        _ => return Err(ApiError::forbidden("Invalid OAuth state")),
    }
    let code = query
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::validation_error("Missing authorization code"))?;

    let identity = state.social_auth.exchange(&provider, &code).await?;
    let outcome = state.user_service.social_login(identity).await?;
    tracing::info!(
        "User {} signed in with {} (new: {})",
        outcome.user.username,
        provider,
        outcome.is_new
    );

    let target = if outcome.is_new {
        "/accounts/social-optin"
    } else {
        "/"
    };
    let clear_state =
        HeaderValue::from_static("oauth_state=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    Ok((
        AppendHeaders([
            (header::SET_COOKIE, session_cookie(&outcome.session)),
            (header::SET_COOKIE, clear_state),
        ]),
        Redirect::to(target),
    ))
}
