//! Server-rendered pages
//!
//! HTML routes render through the active theme. Every page receives the
//! site settings, category menu, social links, color scheme and the signed-in
//! user. Failures render the theme's error page with the matching status.
//!
//! Also serves `/sitemap.xml` and `/robots.txt`.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode, Uri},
    middleware,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use tera::Context as TeraContext;

use crate::api::common::{PageQuery, SearchQuery};
use crate::api::middleware::{cookie_value, no_cache_headers, ApiError, AppState, MaybeUser};
use crate::models::{ContentType, User};
use crate::services::UserService;
use crate::theme::{CurrentUser, PageContext, THEME_COOKIE};

#[derive(Debug, Deserialize)]
pub struct NextQuery {
    pub next: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(home))
        .route("/category/{slug}", get(category))
        .route("/tag/{slug}", get(tag))
        .route("/search", get(search))
        .route("/page/{slug}", get(static_page))
        .route("/login", get(login))
        .route("/register", get(register))
        .route("/accounts/social-optin", get(social_optin))
        .route(
            "/dashboard",
            get(dashboard).layer(middleware::from_fn(no_cache_headers)),
        )
        .route("/sitemap.xml", get(sitemap_xml))
        .route("/robots.txt", get(robots_txt))
        .route("/{category_slug}/{slug}/", get(post_detail))
}

// ============================================================================
// Rendering helpers
// ============================================================================

/// A page being rendered: shared context plus access to the theme
struct View<'a> {
    state: &'a AppState,
    page: PageContext,
}

impl<'a> View<'a> {
    /// Gather the values every template needs. Lookup failures degrade to
    /// defaults so a broken sidebar never takes the page down.
    async fn new(state: &'a AppState, user: Option<&User>, headers: &HeaderMap, uri: &Uri) -> Self {
        let site = state
            .settings_service
            .site_settings()
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to load site settings: {}", e);
                Default::default()
            });
        let categories = state.category_service.list().await.unwrap_or_else(|e| {
            tracing::warn!("Failed to load categories: {}", e);
            Vec::new()
        });
        let social_links = state
            .settings_service
            .social_links()
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to load social links: {}", e);
                Vec::new()
            });

        let page = PageContext {
            site,
            categories,
            social_links,
            theme: PageContext::color_scheme(cookie_value(headers, THEME_COOKIE).as_deref())
                .to_string(),
            current_user: user.map(CurrentUser::from),
            request_path: uri.path().to_string(),
        };
        Self { state, page }
    }

    fn render(&self, template: &str, context: &TeraContext) -> Response {
        let engine = &self.state.theme_engine;
        match engine.render_page(template, context, &self.page) {
            Ok(html) => Html(html).into_response(),
            Err(e) => {
                tracing::error!("{:#}", e);
                let html = engine.render_error(
                    500,
                    "Something went wrong while rendering this page.",
                    &self.page,
                );
                (StatusCode::INTERNAL_SERVER_ERROR, Html(html)).into_response()
            }
        }
    }

    fn error(&self, status: StatusCode, message: &str) -> Response {
        let html = self
            .state
            .theme_engine
            .render_error(status.as_u16(), message, &self.page);
        (status, Html(html)).into_response()
    }

    /// Themed error page for any service failure
    fn fail(&self, err: impl Into<ApiError>) -> Response {
        let err = err.into();
        self.error(err.status(), &err.error.message)
    }
}

// ============================================================================
// Blog pages
// ============================================================================

/// GET /
async fn home(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    headers: HeaderMap,
    uri: Uri,
    Query(query): Query<PageQuery>,
) -> Result<Response, Response> {
    let view = View::new(&state, user.as_ref(), &headers, &uri).await;

    let blocks = state
        .homepage_service
        .homepage_data()
        .await
        .map_err(|e| view.fail(e))?;
    let category_posts = state
        .homepage_service
        .category_posts()
        .await
        .map_err(|e| view.fail(e))?;
    let posts = state
        .post_service
        .home_posts(query.page)
        .await
        .map_err(|e| view.fail(e))?;

    let mut context = TeraContext::new();
    context.insert("featured_post", &blocks.featured_post);
    context.insert("trending", &blocks.trending);
    context.insert("editors_picks", &blocks.editors_picks);
    context.insert("category_posts", &category_posts);
    context.insert("posts", &posts);
    Ok(view.render("index.html", &context))
}

/// GET /category/{slug}
async fn category(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    headers: HeaderMap,
    uri: Uri,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Response, Response> {
    let view = View::new(&state, user.as_ref(), &headers, &uri).await;
    let (category, posts) = state
        .post_service
        .by_category(&slug, query.page)
        .await
        .map_err(|e| match e {
            crate::services::PostServiceError::CategoryNotFound => {
                view.error(StatusCode::NOT_FOUND, "Category not found")
            }
            other => view.fail(other),
        })?;

    let mut context = TeraContext::new();
    context.insert("category", &category);
    context.insert("posts", &posts);
    Ok(view.render("category.html", &context))
}

/// GET /tag/{slug}
async fn tag(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    headers: HeaderMap,
    uri: Uri,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Response, Response> {
    let view = View::new(&state, user.as_ref(), &headers, &uri).await;
    let (tag, posts) = state
        .post_service
        .by_tag(&slug, query.page)
        .await
        .map_err(|e| match e {
            crate::services::PostServiceError::NotFound => {
                view.error(StatusCode::NOT_FOUND, "Tag not found")
            }
            other => view.fail(other),
        })?;

    let mut context = TeraContext::new();
    context.insert("tag", &tag);
    context.insert("posts", &posts);
    Ok(view.render("tag.html", &context))
}

/// GET /search?q=
async fn search(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    headers: HeaderMap,
    uri: Uri,
    Query(query): Query<SearchQuery>,
) -> Result<Response, Response> {
    let view = View::new(&state, user.as_ref(), &headers, &uri).await;
    let posts = state
        .post_service
        .search(&query.q, query.page)
        .await
        .map_err(|e| view.fail(e))?;

    let mut context = TeraContext::new();
    context.insert("query", query.q.trim());
    context.insert("posts", &posts);
    Ok(view.render("search.html", &context))
}

/// GET /{category_slug}/{slug}/
async fn post_detail(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    headers: HeaderMap,
    uri: Uri,
    Path((category_slug, slug)): Path<(String, String)>,
) -> Result<Response, Response> {
    let view = View::new(&state, user.as_ref(), &headers, &uri).await;
    let detail = state
        .post_service
        .detail(&category_slug, &slug)
        .await
        .map_err(|e| view.fail(e))?;
    let comments = state
        .comment_service
        .thread(ContentType::Post, detail.post.id)
        .await
        .map_err(|e| view.fail(e))?;
    let comment_stats = state
        .comment_service
        .stats(ContentType::Post, detail.post.id)
        .await
        .map_err(|e| view.fail(e))?;

    let mut context = TeraContext::new();
    context.insert("detail", &detail);
    context.insert("comments", &comments);
    context.insert("comment_stats", &comment_stats);
    context.insert("comment_max_depth", &state.config.comments.max_depth);
    Ok(view.render("post.html", &context))
}

/// GET /page/{slug}
async fn static_page(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    headers: HeaderMap,
    uri: Uri,
    Path(slug): Path<String>,
) -> Result<Response, Response> {
    let view = View::new(&state, user.as_ref(), &headers, &uri).await;
    let rendered = state
        .page_service
        .render_published(&slug)
        .await
        .map_err(|e| view.fail(e))?;
    let comments = state
        .comment_service
        .thread(ContentType::Page, rendered.page.id)
        .await
        .map_err(|e| view.fail(e))?;

    let mut context = TeraContext::new();
    context.insert("page", &rendered.page);
    context.insert("content_html", &rendered.content_html);
    context.insert("comments", &comments);
    context.insert("comment_max_depth", &state.config.comments.max_depth);
    Ok(view.render("page.html", &context))
}

// ============================================================================
// Account pages
// ============================================================================

/// GET /login
async fn login(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    headers: HeaderMap,
    uri: Uri,
    Query(query): Query<NextQuery>,
) -> Response {
    if let Some(user) = &user {
        return Redirect::to(UserService::login_redirect(user)).into_response();
    }
    let view = View::new(&state, None, &headers, &uri).await;

    let mut context = TeraContext::new();
    context.insert("providers", &state.social_auth.providers());
    context.insert("next", &safe_next(query.next.as_deref()));
    view.render("login.html", &context)
}

/// GET /register
async fn register(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    if user.is_some() {
        return Redirect::to("/").into_response();
    }
    let view = View::new(&state, None, &headers, &uri).await;

    let mut context = TeraContext::new();
    context.insert("providers", &state.social_auth.providers());
    view.render("register.html", &context)
}

/// GET /accounts/social-optin
async fn social_optin(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Response, Response> {
    let Some(user) = user else {
        return Ok(Redirect::to("/login").into_response());
    };
    let view = View::new(&state, Some(&user), &headers, &uri).await;
    let profile = state
        .user_service
        .get_profile(user.id)
        .await
        .map_err(|e| view.fail(e))?;

    let mut context = TeraContext::new();
    context.insert("profile", &profile);
    Ok(view.render("social_optin.html", &context))
}

/// GET /dashboard
///
/// Shell page; the dashboard itself talks to `/api/v1/dashboard`.
async fn dashboard(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    let Some(user) = user else {
        return Redirect::to("/login?next=/dashboard").into_response();
    };
    let view = View::new(&state, Some(&user), &headers, &uri).await;
    if !user.is_admin() {
        return view.error(StatusCode::FORBIDDEN, "Admin privileges required");
    }
    view.render("dashboard.html", &TeraContext::new())
}

/// Fallback for unmatched paths: JSON under `/api/`, the themed 404 elsewhere
pub async fn not_found(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    if uri.path().starts_with("/api/") {
        return ApiError::not_found("No such endpoint").into_response();
    }
    let view = View::new(&state, user.as_ref(), &headers, &uri).await;
    view.error(StatusCode::NOT_FOUND, "The page you are looking for does not exist.")
}

/// Only same-site paths are accepted as a post-login target
fn safe_next(next: Option<&str>) -> Option<&str> {
    next.filter(|n| n.starts_with('/') && !n.starts_with("//"))
}

// ============================================================================
// Sitemap & robots
// ============================================================================

/// GET /sitemap.xml
async fn sitemap_xml(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let xml = state.sitemap_service.render_xml().await?;
    Ok(([(header::CONTENT_TYPE, "application/xml; charset=utf-8")], xml))
}

/// GET /robots.txt
async fn robots_txt(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.sitemap_service.robots_txt(),
    )
}
