//! API layer - HTTP handlers and routing
//!
//! - JSON endpoints under `/api/v1` (auth, accounts, blog, comments, dashboard)
//! - server-rendered theme pages, sitemap and robots.txt
//! - `/media` and `/static` file serving

pub mod accounts;
pub mod auth;
pub mod blog;
pub mod comments;
pub mod common;
pub mod dashboard;
pub mod middleware;
pub mod responses;
pub mod site;
pub mod upload;

use anyhow::Result;
use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware, Router,
};
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, services::ServeDir, trace::TraceLayer,
};

use crate::cache::Cache;
use crate::config::Config;
use crate::db::repositories::{
    SqlxCategoryRepository, SqlxCommentRepository, SqlxPageRepository, SqlxPostRepository,
    SqlxSessionRepository, SqlxSettingsRepository, SqlxTagRepository, SqlxUserRepository,
};
use crate::db::DbPool;
use crate::services::{
    CategoryService, CommentAnalyticsService, CommentService, HomepageService, ImageService,
    LoginRateLimiter, Mailer, NewsletterService, PageService, PostService, SettingsService,
    SitemapService, SocialAuthService, TagService, UserService,
};
use crate::theme::ThemeEngine;

pub use middleware::{ApiError, AppState};

impl AppState {
    /// Wire repositories and services over one pool and cache
    pub fn new(
        pool: DbPool,
        cache: Arc<Cache>,
        config: Config,
        mailer: Option<Arc<dyn Mailer>>,
    ) -> Result<Self> {
        let site_url = config.server.base_url().to_string();

        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let post_repo = SqlxPostRepository::boxed(pool.clone());
        let category_repo = SqlxCategoryRepository::boxed(pool.clone());
        let page_repo = SqlxPageRepository::boxed(pool.clone());
        let comment_repo = SqlxCommentRepository::boxed(pool.clone());

        let theme_engine = ThemeEngine::new(
            &config.theme.path,
            &config.theme.active,
            &config.media.responsive_widths,
        )?;
        let theme = theme_engine.info();
        tracing::info!("Theme loaded: {} v{}", theme.display_name, theme.version);

        let image_service = Arc::new(ImageService::new(config.media.clone()));
        let tag_service = Arc::new(TagService::new(SqlxTagRepository::boxed(pool.clone())));
        let homepage_service = Arc::new(HomepageService::new(
            post_repo.clone(),
            category_repo.clone(),
            cache.clone(),
        ));
        let newsletter = Arc::new(NewsletterService::new(
            user_repo.clone(),
            mailer.clone(),
            &site_url,
        ));
        let post_service = PostService::new(
            post_repo.clone(),
            category_repo.clone(),
            user_repo.clone(),
            tag_service.clone(),
            homepage_service.clone(),
            newsletter,
            cache.clone(),
            &site_url,
        )
        .with_images(image_service.clone());

        let comment_service = CommentService::new(
            comment_repo.clone(),
            user_repo.clone(),
            post_repo.clone(),
            page_repo.clone(),
            cache.clone(),
            mailer,
            config.comments.clone(),
            &site_url,
        );

        Ok(Self {
            user_service: Arc::new(
                UserService::new(user_repo, SqlxSessionRepository::boxed(pool.clone()))
                    .with_cache(cache.clone()),
            ),
            post_service: Arc::new(post_service),
            category_service: Arc::new(CategoryService::new(category_repo.clone(), cache.clone())),
            tag_service,
            page_service: Arc::new(PageService::new(page_repo)),
            comment_service: Arc::new(comment_service),
            comment_analytics: Arc::new(CommentAnalyticsService::new(comment_repo)),
            settings_service: Arc::new(SettingsService::new(
                SqlxSettingsRepository::boxed(pool.clone()),
                cache.clone(),
            )),
            homepage_service,
            sitemap_service: Arc::new(SitemapService::new(post_repo, category_repo, &site_url)),
            social_auth: Arc::new(SocialAuthService::new(config.social.clone(), &site_url)),
            image_service,
            login_limiter: Arc::new(LoginRateLimiter::new()),
            theme_engine: Arc::new(theme_engine),
            config: Arc::new(config),
            cache,
            pool,
        })
    }
}

/// Build the `/api/v1` router
pub fn build_api_router(state: &AppState) -> Router<AppState> {
    let dashboard_routes = dashboard::router(state.config.media.max_file_size)
        .route_layer(axum_middleware::from_fn(middleware::require_admin))
        .layer(axum_middleware::from_fn(middleware::no_cache_headers));

    Router::new()
        .nest("/auth", auth::router())
        .nest("/accounts", accounts::router())
        .nest("/comments", comments::router())
        .nest("/dashboard", dashboard_routes)
        .merge(blog::router())
}

/// Build the complete application router with middleware
pub fn build_router(state: AppState) -> Router {
    // Cookie auth needs an exact origin with credentials
    let mut cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
        .allow_credentials(true);
    match state.config.server.cors_origin.parse::<HeaderValue>() {
        Ok(origin) => cors = cors.allow_origin(origin),
        Err(_) => tracing::warn!(
            "Ignoring invalid CORS origin: {}",
            state.config.server.cors_origin
        ),
    }

    let static_dir = state.theme_engine.static_dir();

    Router::new()
        .nest("/api/v1", build_api_router(&state))
        .merge(site::router())
        .nest_service("/media", ServeDir::new(state.image_service.media_root()))
        .nest_service("/static", ServeDir::new(static_dir))
        .fallback(site::not_found)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::load_user,
        ))
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests;
