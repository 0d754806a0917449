//! Quillpress - blogging and CMS server

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quillpress::{
    api::{self, AppState},
    cache::create_cache,
    config::Config,
    db,
    services::{create_mailer, ClearScope, OptimizeOptions},
};

/// Session and login-limiter sweep interval
const CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

#[derive(Parser)]
#[command(name = "quillpress")]
#[command(about = "Blogging and CMS server with threaded comments and newsletters")]
#[command(version)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, default_value = "config.yml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Apply database migrations and exit
    Migrate,
    /// Create a profile row for every user that lacks one
    CreateProfiles,
    /// Drop cached blog data; --homepage limits it to the homepage keys, --all clears everything
    ClearCache {
        #[arg(long, conflicts_with = "homepage")]
        all: bool,
        #[arg(long)]
        homepage: bool,
    },
    /// Rebuild the homepage and category blocks in the cache
    WarmCache,
    /// Recompress large featured images
    OptimizeImages {
        /// JPEG quality, 1-100
        #[arg(long, default_value_t = 85, value_parser = clap::value_parser!(u8).range(1..=100))]
        quality: u8,
        #[arg(long, default_value_t = 1200)]
        max_width: u32,
        /// Skip files smaller than this many kilobytes
        #[arg(long, default_value_t = 100)]
        min_size: u64,
        #[arg(long)]
        dry_run: bool,
    },
    /// Write sitemap.xml into a directory
    GenerateSitemaps {
        #[arg(long, default_value = ".")]
        output: PathBuf,
    },
    /// Create a superuser, or promote an existing username
    CreateAdmin {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quillpress=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = Config::load_with_env(&cli.config)?;
    tracing::info!("Configuration loaded from {}", cli.config.display());

    let pool = db::create_pool(&config.database).await?;
    db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database ready: {}", config.database.url);

    if let Some(Command::Migrate) = cli.command {
        tracing::info!("Migrations complete");
        return Ok(());
    }

    let cache = create_cache(&config.cache).await?;
    let mailer = create_mailer(config.smtp.as_ref())?;
    let state = AppState::new(pool, cache, config, mailer)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(state).await,
        Command::Migrate => Ok(()),
        Command::CreateProfiles => {
            let created = state.user_service.create_missing_profiles().await?;
            tracing::info!("Created {} missing profiles", created);
            Ok(())
        }
        Command::ClearCache { all, homepage } => {
            state.homepage_service.clear(clear_scope(all, homepage)).await
        }
        Command::WarmCache => {
            let report = state.homepage_service.warm().await;
            tracing::info!(
                homepage = report.homepage,
                category_posts = report.category_posts,
                categories = report.categories,
                "Cache warmed"
            );
            Ok(())
        }
        Command::OptimizeImages {
            quality,
            max_width,
            min_size,
            dry_run,
        } => {
            let options = OptimizeOptions {
                quality,
                max_width,
                min_size: min_size * 1024,
                dry_run,
            };
            let paths = state.post_service.image_paths().await?;
            let report = state.image_service.optimize_all(&paths, options).await;
            tracing::info!(
                examined = report.examined,
                optimized = report.optimized,
                skipped = report.skipped,
                failed = report.failed,
                bytes_saved = report.bytes_saved,
                dry_run,
                "Image optimization finished"
            );
            Ok(())
        }
        Command::GenerateSitemaps { output } => {
            let path = state.sitemap_service.write_to(&output).await?;
            tracing::info!("Sitemap written to {}", path.display());
            Ok(())
        }
        Command::CreateAdmin {
            username,
            email,
            password,
        } => {
            let user = state
                .user_service
                .create_admin(&username, &email, &password)
                .await?;
            tracing::info!("Superuser '{}' ready (id {})", user.username, user.id);
            Ok(())
        }
    }
}

fn clear_scope(all: bool, homepage: bool) -> ClearScope {
    if all {
        ClearScope::All
    } else if homepage {
        ClearScope::Homepage
    } else {
        ClearScope::Blog
    }
}

async fn serve(state: AppState) -> Result<()> {
    spawn_cleanup(&state);

    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let app = api::build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Hourly sweep of expired sessions and stale login-limiter entries
fn spawn_cleanup(state: &AppState) {
    let user_service = Arc::clone(&state.user_service);
    let limiter = Arc::clone(&state.login_limiter);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            match user_service.cleanup_expired_sessions().await {
                Ok(0) => {}
                Ok(n) => tracing::info!("Removed {} expired sessions", n),
                Err(e) => tracing::warn!("Session cleanup failed: {}", e),
            }
            limiter.cleanup().await;
        }
    });
}
