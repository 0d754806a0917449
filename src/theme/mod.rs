//! Theme engine
//!
//! Server-side rendering with Tera. A theme is a directory under the themes
//! path:
//!
//! ```text
//! themes/<name>/theme.toml        optional metadata
//! themes/<name>/templates/*.html  Tera templates (base.html first)
//! themes/<name>/static/           served under /static
//! ```
//!
//! Every page is rendered with the shared [`PageContext`] merged into its
//! own context.

use anyhow::{Context, Result};
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fs;
use std::path::{Path, PathBuf};
use tera::{Context as TeraContext, Tera};

use crate::models::{Category, SiteSettings, SocialLink, User};

mod error;
pub mod filters;

pub use error::ThemeError;

/// Name of the cookie holding the light/dark preference
pub const THEME_COOKIE: &str = "theme";

/// Template rendered for error pages when the theme has one
const ERROR_TEMPLATE: &str = "error.html";

/// Tera engine bound to one theme
pub struct ThemeEngine {
    tera: Tera,
    themes_path: PathBuf,
    current_theme: String,
    responsive_widths: Vec<u32>,
    info: ThemeInfo,
}

/// Theme metadata from `theme.toml`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThemeInfo {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub author: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ThemeToml {
    theme: ThemeInfo,
}

fn default_version() -> String {
    "0.0.0".to_string()
}

/// Signed-in user as templates see it
#[derive(Debug, Clone, Serialize)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub is_admin: bool,
}

impl From<&User> for CurrentUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            display_name: user.display_name(),
            is_admin: user.is_admin(),
        }
    }
}

/// Values every template receives
#[derive(Debug, Clone, Default, Serialize)]
pub struct PageContext {
    pub site: SiteSettings,
    pub categories: Vec<Category>,
    pub social_links: Vec<SocialLink>,
    /// `light` or `dark`, from the theme cookie
    pub theme: String,
    pub current_user: Option<CurrentUser>,
    pub request_path: String,
}

impl PageContext {
    /// Normalize a theme cookie value; anything but `dark` is light
    pub fn color_scheme(cookie: Option<&str>) -> &'static str {
        match cookie {
            Some("dark") => "dark",
            _ => "light",
        }
    }

    fn apply(&self, context: &mut TeraContext) {
        context.insert("site", &self.site);
        context.insert("categories", &self.categories);
        context.insert("social_links", &self.social_links);
        context.insert("theme", &self.theme);
        context.insert("current_user", &self.current_user);
        context.insert("request_path", &self.request_path);
        context.insert("year", &chrono::Utc::now().year());
    }
}

impl ThemeEngine {
    /// Load `theme_name` from `themes_path`.
    ///
    /// Fails with [`ThemeError::NotFound`] when the theme directory is
    /// missing, or [`ThemeError::TemplateError`] when a template does not
    /// parse.
    pub fn new(themes_path: &Path, theme_name: &str, responsive_widths: &[u32]) -> Result<Self> {
        let mut engine = Self {
            tera: Tera::default(),
            themes_path: themes_path.to_path_buf(),
            current_theme: theme_name.to_string(),
            responsive_widths: responsive_widths.to_vec(),
            info: ThemeInfo {
                name: theme_name.to_string(),
                display_name: theme_name.to_string(),
                description: None,
                version: default_version(),
                author: None,
            },
        };
        engine.load_theme(theme_name)?;
        Ok(engine)
    }

    fn load_theme(&mut self, theme_name: &str) -> Result<()> {
        let theme_path = self.themes_path.join(theme_name);
        if !theme_path.is_dir() {
            return Err(ThemeError::NotFound(theme_name.to_string()).into());
        }

        let info = self.load_metadata(theme_name)?;
        let tera = self.build_tera(&theme_path.join("templates"))?;

        self.tera = tera;
        self.info = info;
        self.current_theme = theme_name.to_string();
        tracing::info!(
            "Loaded theme '{}' ({} templates)",
            theme_name,
            self.tera.get_template_names().count()
        );
        Ok(())
    }

    fn build_tera(&self, template_path: &Path) -> Result<Tera> {
        let mut templates: Vec<(String, String)> = Vec::new();
        collect_templates(template_path, template_path, &mut templates)?;

        // Parents must be registered before their children
        templates.sort_by(|a, b| {
            let a_is_base = a.0 == "base.html" || a.0.ends_with("/base.html");
            let b_is_base = b.0 == "base.html" || b.0.ends_with("/base.html");
            b_is_base.cmp(&a_is_base).then_with(|| a.0.cmp(&b.0))
        });

        let mut tera = Tera::default();
        filters::register(&mut tera, &self.responsive_widths);
        tera.add_raw_templates(templates).map_err(|e| {
            ThemeError::TemplateError(format!("Failed to load templates: {}", error_chain(&e)))
        })?;
        Ok(tera)
    }

    fn load_metadata(&self, theme_name: &str) -> Result<ThemeInfo> {
        let path = self.themes_path.join(theme_name).join("theme.toml");
        if !path.exists() {
            return Ok(ThemeInfo {
                name: theme_name.to_string(),
                display_name: theme_name.to_string(),
                description: None,
                version: default_version(),
                author: None,
            });
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let parsed: ThemeToml = toml::from_str(&content)
            .map_err(|e| ThemeError::InvalidMetadata(format!("theme '{}': {}", theme_name, e)))?;
        let mut info = parsed.theme;
        if info.display_name.is_empty() {
            info.display_name = info.name.clone();
        }
        Ok(info)
    }

    /// Render `template`, reporting the whole Tera cause chain on failure
    pub fn render(&self, template: &str, context: &TeraContext) -> Result<String> {
        self.tera.render(template, context).map_err(|e| {
            ThemeError::TemplateError(format!("Failed to render '{}': {}", template, error_chain(&e)))
                .into()
        })
    }

    /// Render a page with the shared values merged in
    pub fn render_page(
        &self,
        template: &str,
        context: &TeraContext,
        page: &PageContext,
    ) -> Result<String> {
        let mut full = context.clone();
        page.apply(&mut full);
        self.render(template, &full)
    }

    /// Render the theme's error page, or a minimal built-in one
    pub fn render_error(&self, status: u16, message: &str, page: &PageContext) -> String {
        if self.has_template(ERROR_TEMPLATE) {
            let mut context = TeraContext::new();
            context.insert("status", &status);
            context.insert("message", message);
            match self.render_page(ERROR_TEMPLATE, &context, page) {
                Ok(html) => return html,
                Err(e) => tracing::error!("{:#}", e),
            }
        }
        simple_error_page(status, message)
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.tera.get_template_names().any(|n| n == name)
    }

    pub fn info(&self) -> &ThemeInfo {
        &self.info
    }

    /// Directory served under `/static`
    pub fn static_dir(&self) -> PathBuf {
        self.themes_path.join(&self.current_theme).join("static")
    }
}

fn collect_templates(
    base_path: &Path,
    current_path: &Path,
    templates: &mut Vec<(String, String)>,
) -> Result<()> {
    if !current_path.exists() {
        return Ok(());
    }

    for entry in fs::read_dir(current_path)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_templates(base_path, &path, templates)?;
        } else if path.extension().map_or(false, |ext| ext == "html") {
            let relative = path
                .strip_prefix(base_path)
                .map_err(|_| ThemeError::TemplateError("Failed to get relative path".to_string()))?;
            let name = relative.to_string_lossy().replace('\\', "/");
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read template: {}", path.display()))?;
            templates.push((name, content));
        }
    }
    Ok(())
}

fn error_chain(e: &tera::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(s) = source {
        message.push_str(&format!("\n  Caused by: {}", s));
        source = s.source();
    }
    message
}

/// Last-resort error page that needs no templates
fn simple_error_page(status: u16, message: &str) -> String {
    let title = match status {
        404 => "Page not found",
        403 => "Forbidden",
        _ => "Server error",
    };
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8"><title>{status} {title}</title></head>
<body>
<main style="max-width:40rem;margin:4rem auto;font-family:sans-serif">
<h1>{status} {title}</h1>
<p>{message}</p>
<p><a href="/">Back to the home page</a></p>
</main>
</body>
</html>"#,
        status = status,
        title = title,
        message = crate::services::markdown::html_escape(message),
    )
}
