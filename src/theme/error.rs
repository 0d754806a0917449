use thiserror::Error;

#[derive(Debug, Error)]
pub enum ThemeError {
    /// No `<themes_path>/<name>` directory
    #[error("Theme '{0}' is not installed")]
    NotFound(String),

    /// Template parse or render failure, with the full cause chain
    #[error("Template error: {0}")]
    TemplateError(String),

    #[error("Invalid theme.toml for {0}")]
    InvalidMetadata(String),
}
