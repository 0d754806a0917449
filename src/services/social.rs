//! Social login over the OAuth2 authorization code flow
//!
//! Providers come from `social.<name>` in the config. After the code
//! exchange the provider's userinfo JSON is mapped onto a
//! [`SocialIdentity`]; account linking is done by the user service.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::config::SocialProviderConfig;
use crate::models::SocialIdentity;

const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, thiserror::Error)]
pub enum SocialAuthError {
    #[error("Unknown login provider: {0}")]
    UnknownProvider(String),

    #[error("Login provider error: {0}")]
    ProviderError(String),
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

pub struct SocialAuthService {
    providers: HashMap<String, SocialProviderConfig>,
    site_url: String,
    client: reqwest::Client,
}

impl SocialAuthService {
    pub fn new(providers: HashMap<String, SocialProviderConfig>, site_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("Quillpress-Login")
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            providers,
            site_url: site_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn providers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Random value for the `oauth_state` cookie
    pub fn new_state() -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }

    pub fn redirect_uri(&self, provider: &str) -> String {
        format!("{}/api/v1/auth/social/{}/callback", self.site_url, provider)
    }

    /// Provider URL the browser is sent to
    pub fn authorize_url(&self, provider: &str, state: &str) -> Result<String, SocialAuthError> {
        let config = self.provider(provider)?;
        let separator = if config.authorize_url.contains('?') { '&' } else { '?' };
        Ok(format!(
            "{}{}response_type=code&client_id={}&redirect_uri={}&scope={}&state={}",
            config.authorize_url,
            separator,
            urlencoding::encode(&config.client_id),
            urlencoding::encode(&self.redirect_uri(provider)),
            urlencoding::encode(&config.scope),
            urlencoding::encode(state),
        ))
    }

    /// Exchange `code` for a token and fetch the user's identity
    pub async fn exchange(
        &self,
        provider: &str,
        code: &str,
    ) -> Result<SocialIdentity, SocialAuthError> {
        let config = self.provider(provider)?;

        let body = format!(
            "grant_type=authorization_code&code={}&redirect_uri={}&client_id={}&client_secret={}",
            urlencoding::encode(code),
            urlencoding::encode(&self.redirect_uri(provider)),
            urlencoding::encode(&config.client_id),
            urlencoding::encode(&config.client_secret),
        );
        let response = self
            .client
            .post(&config.token_url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .header("Accept", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| SocialAuthError::ProviderError(format!("Token request failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(SocialAuthError::ProviderError(format!(
                "Token endpoint returned {}",
                response.status()
            )));
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| SocialAuthError::ProviderError(format!("Invalid token response: {}", e)))?;

        let response = self
            .client
            .get(&config.userinfo_url)
            .bearer_auth(&token.access_token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| SocialAuthError::ProviderError(format!("Userinfo request failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(SocialAuthError::ProviderError(format!(
                "Userinfo endpoint returned {}",
                response.status()
            )));
        }
        let info: Value = response
            .json()
            .await
            .map_err(|e| SocialAuthError::ProviderError(format!("Invalid userinfo: {}", e)))?;

        identity_from_userinfo(provider, &info)
    }

    fn provider(&self, name: &str) -> Result<&SocialProviderConfig, SocialAuthError> {
        self.providers
            .get(name)
            .ok_or_else(|| SocialAuthError::UnknownProvider(name.to_string()))
    }
}

/// Map a userinfo document onto an identity.
///
/// Understands OpenID Connect claims (`sub`, `given_name`, ...) and the
/// common non-OIDC shapes (`id`, `login`, `name`).
pub fn identity_from_userinfo(provider: &str, info: &Value) -> Result<SocialIdentity, SocialAuthError> {
    let uid = ["sub", "id"]
        .iter()
        .find_map(|key| match info.get(*key) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
        .ok_or_else(|| SocialAuthError::ProviderError("Userinfo has no user id".to_string()))?;

    let text = |keys: &[&str]| -> String {
        keys.iter()
            .find_map(|key| info.get(*key).and_then(Value::as_str).filter(|s| !s.is_empty()))
            .unwrap_or_default()
            .trim()
            .to_string()
    };

    let email = text(&["email"]);
    let full_name = text(&["name"]);
    let mut first_name = text(&["given_name", "first_name"]);
    let mut last_name = text(&["family_name", "last_name"]);
    if first_name.is_empty() && last_name.is_empty() && !full_name.is_empty() {
        let mut parts = full_name.splitn(2, ' ');
        first_name = parts.next().unwrap_or_default().to_string();
        last_name = parts.next().unwrap_or_default().trim().to_string();
    }

    let mut username_hint = text(&["preferred_username", "login", "username"]);
    if username_hint.is_empty() {
        username_hint = email.split('@').next().unwrap_or_default().to_string();
    }
    if username_hint.is_empty() {
        username_hint = first_name.clone();
    }

    Ok(SocialIdentity {
        provider: provider.to_string(),
        uid,
        email,
        username_hint,
        first_name,
        last_name,
    })
}
