//! Site settings and social links

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const SITE_NAME: &str = "site_name";
pub const SITE_TAGLINE: &str = "site_tagline";
pub const SITE_DESCRIPTION: &str = "site_description";
pub const ABOUT_HEADING: &str = "about_heading";
pub const ABOUT_BODY: &str = "about_body";
pub const FOOTER_TEXT: &str = "footer_text";
pub const CONTACT_EMAIL: &str = "contact_email";

/// Every key the settings table knows about
pub const SETTING_KEYS: &[&str] = &[
    SITE_NAME,
    SITE_TAGLINE,
    SITE_DESCRIPTION,
    ABOUT_HEADING,
    ABOUT_BODY,
    FOOTER_TEXT,
    CONTACT_EMAIL,
];

/// Typed view of the key/value settings table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SiteSettings {
    pub site_name: String,
    pub site_tagline: String,
    pub site_description: String,
    pub about_heading: String,
    pub about_body: String,
    pub footer_text: String,
    pub contact_email: String,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            site_name: "Quillpress".to_string(),
            site_tagline: "Stories, notes and ideas".to_string(),
            site_description: "A blog powered by Quillpress".to_string(),
            about_heading: "About".to_string(),
            about_body: String::new(),
            footer_text: String::new(),
            contact_email: String::new(),
        }
    }
}

impl SiteSettings {
    /// Overlay stored values on top of the defaults
    pub fn from_map(values: &HashMap<String, String>) -> Self {
        let mut settings = Self::default();
        for (key, value) in values {
            settings.set(key, value.clone());
        }
        settings
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        match key {
            SITE_NAME => Some(&self.site_name),
            SITE_TAGLINE => Some(&self.site_tagline),
            SITE_DESCRIPTION => Some(&self.site_description),
            ABOUT_HEADING => Some(&self.about_heading),
            ABOUT_BODY => Some(&self.about_body),
            FOOTER_TEXT => Some(&self.footer_text),
            CONTACT_EMAIL => Some(&self.contact_email),
            _ => None,
        }
    }

    /// Returns false for unknown keys
    pub fn set(&mut self, key: &str, value: String) -> bool {
        let slot = match key {
            SITE_NAME => &mut self.site_name,
            SITE_TAGLINE => &mut self.site_tagline,
            SITE_DESCRIPTION => &mut self.site_description,
            ABOUT_HEADING => &mut self.about_heading,
            ABOUT_BODY => &mut self.about_body,
            FOOTER_TEXT => &mut self.footer_text,
            CONTACT_EMAIL => &mut self.contact_email,
            _ => return false,
        };
        *slot = value;
        true
    }
}

/// Partial settings update; unknown keys are rejected by the service
pub type UpdateSettingsInput = HashMap<String, String>;

/// Footer/header link to a social profile
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SocialLink {
    pub id: i64,
    pub platform: String,
    pub link: String,
    pub sort_order: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSocialLinkInput {
    pub platform: String,
    pub link: String,
    #[serde(default)]
    pub sort_order: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateSocialLinkInput {
    pub platform: Option<String>,
    pub link: Option<String>,
    pub sort_order: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_map_overlays_defaults() {
        let mut values = HashMap::new();
        values.insert(SITE_NAME.to_string(), "My Blog".to_string());
        values.insert("unknown".to_string(), "ignored".to_string());

        let settings = SiteSettings::from_map(&values);
        assert_eq!(settings.site_name, "My Blog");
        assert_eq!(settings.site_tagline, SiteSettings::default().site_tagline);
    }

    #[test]
    fn test_set_rejects_unknown_key() {
        let mut settings = SiteSettings::default();
        assert!(settings.set(FOOTER_TEXT, "bye".to_string()));
        assert!(!settings.set("theme", "dark".to_string()));
        assert!(SETTING_KEYS.iter().all(|key| settings.get(key).is_some()));
    }
}
