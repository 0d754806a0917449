//! Quillpress - blogging and CMS web application
//!
//! Posts grouped by category and tag, static pages, threaded comments with
//! moderation, newsletter email on publish, and server-rendered themes.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod theme;
