//! Database layer
//!
//! SQLite through sqlx. Schema changes are embedded migrations
//! ([`migrations`]); data access goes through the repository traits in
//! [`repositories`], each with a sqlx-backed implementation.
//!
//! ```ignore
//! use quillpress::config::DatabaseConfig;
//! use quillpress::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{create_pool, create_test_pool, ping, DbPool};
