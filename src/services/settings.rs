//! Settings service
//!
//! Site settings and social links. Both are read on every rendered page, so
//! they are cached until the next write.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use thiserror::Error;

use crate::cache::{Cache, CacheLayer};
use crate::db::repositories::SettingsRepository;
use crate::models::{
    CreateSocialLinkInput, SiteSettings, SocialLink, UpdateSettingsInput, UpdateSocialLinkInput,
};

const SETTINGS_CACHE_KEY: &str = "site:settings";
const SOCIAL_LINKS_CACHE_KEY: &str = "site:social_links";
const CACHE_TTL: Duration = Duration::from_secs(3600);

const MAX_PLATFORM_LENGTH: usize = 50;
const MAX_SETTING_LENGTH: usize = 10_000;

#[derive(Debug, Error)]
pub enum SettingsServiceError {
    #[error("Social link not found")]
    NotFound,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct SettingsService {
    repo: Arc<dyn SettingsRepository>,
    cache: Arc<Cache>,
}

impl SettingsService {
    pub fn new(repo: Arc<dyn SettingsRepository>, cache: Arc<Cache>) -> Self {
        Self { repo, cache }
    }

    /// Stored settings over the defaults
    pub async fn site_settings(&self) -> Result<SiteSettings, SettingsServiceError> {
        if let Some(settings) = self
            .cache
            .get::<SiteSettings>(SETTINGS_CACHE_KEY)
            .await
            .ok()
            .flatten()
        {
            return Ok(settings);
        }

        let values = self.repo.get_all().await.context("Failed to load settings")?;
        let settings = SiteSettings::from_map(&values);
        let _ = self.cache.set(SETTINGS_CACHE_KEY, &settings, CACHE_TTL).await;
        Ok(settings)
    }

    /// Apply a partial update; unknown keys are rejected as a whole
    pub async fn update(
        &self,
        input: UpdateSettingsInput,
    ) -> Result<SiteSettings, SettingsServiceError> {
        let mut settings = self.site_settings().await?;
        let mut changed: HashMap<String, String> = HashMap::new();

        for (key, value) in input {
            let value = value.trim().to_string();
            if value.chars().count() > MAX_SETTING_LENGTH {
                return Err(SettingsServiceError::ValidationError(format!(
                    "Setting '{}' is too long",
                    key
                )));
            }
            if !settings.set(&key, value.clone()) {
                return Err(SettingsServiceError::ValidationError(format!(
                    "Unknown setting '{}'",
                    key
                )));
            }
            changed.insert(key, value);
        }

        if !changed.is_empty() {
            self.repo
                .set_many(&changed)
                .await
                .context("Failed to save settings")?;
            let _ = self.cache.delete(SETTINGS_CACHE_KEY).await;
            tracing::info!("Updated {} site settings", changed.len());
        }
        Ok(settings)
    }

    /// Social links in display order
    pub async fn social_links(&self) -> Result<Vec<SocialLink>, SettingsServiceError> {
        if let Some(links) = self
            .cache
            .get::<Vec<SocialLink>>(SOCIAL_LINKS_CACHE_KEY)
            .await
            .ok()
            .flatten()
        {
            return Ok(links);
        }

        let links = self
            .repo
            .list_social_links()
            .await
            .context("Failed to list social links")?;
        let _ = self.cache.set(SOCIAL_LINKS_CACHE_KEY, &links, CACHE_TTL).await;
        Ok(links)
    }

    pub async fn create_social_link(
        &self,
        input: CreateSocialLinkInput,
    ) -> Result<SocialLink, SettingsServiceError> {
        let platform = validate_platform(&input.platform)?;
        let link = validate_link(&input.link)?;

        let created = self
            .repo
            .create_social_link(&SocialLink {
                id: 0,
                platform,
                link,
                sort_order: input.sort_order,
                created_at: Utc::now(),
            })
            .await
            .context("Failed to create social link")?;
        self.invalidate_links().await;
        Ok(created)
    }

    pub async fn update_social_link(
        &self,
        id: i64,
        input: UpdateSocialLinkInput,
    ) -> Result<SocialLink, SettingsServiceError> {
        let mut link = self
            .repo
            .get_social_link(id)
            .await
            .context("Failed to get social link")?
            .ok_or(SettingsServiceError::NotFound)?;

        if let Some(platform) = input.platform {
            link.platform = validate_platform(&platform)?;
        }
        if let Some(url) = input.link {
            link.link = validate_link(&url)?;
        }
        if let Some(order) = input.sort_order {
            link.sort_order = order;
        }

        let updated = self
            .repo
            .update_social_link(&link)
            .await
            .context("Failed to update social link")?;
        self.invalidate_links().await;
        Ok(updated)
    }

    pub async fn delete_social_link(&self, id: i64) -> Result<(), SettingsServiceError> {
        self.repo
            .get_social_link(id)
            .await
            .context("Failed to get social link")?
            .ok_or(SettingsServiceError::NotFound)?;
        self.repo
            .delete_social_link(id)
            .await
            .context("Failed to delete social link")?;
        self.invalidate_links().await;
        Ok(())
    }

    async fn invalidate_links(&self) {
        let _ = self.cache.delete(SOCIAL_LINKS_CACHE_KEY).await;
    }
}

fn validate_platform(platform: &str) -> Result<String, SettingsServiceError> {
    let platform = platform.trim();
    if platform.is_empty() || platform.chars().count() > MAX_PLATFORM_LENGTH {
        return Err(SettingsServiceError::ValidationError(format!(
            "Platform must be 1 to {} characters",
            MAX_PLATFORM_LENGTH
        )));
    }
    Ok(platform.to_string())
}

fn validate_link(link: &str) -> Result<String, SettingsServiceError> {
    let link = link.trim();
    let rest = link
        .strip_prefix("https://")
        .or_else(|| link.strip_prefix("http://"));
    match rest {
        Some(host) if !host.is_empty() && !host.starts_with('/') && !link.contains(char::is_whitespace) => {
            Ok(link.to_string())
        }
        _ => Err(SettingsServiceError::ValidationError(
            "Link must be an http(s) URL".to_string(),
        )),
    }
}
