//! User, profile and social account models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    /// Empty for social accounts whose provider shared no email
    pub email: String,
    /// Argon2 PHC string; empty for social-only accounts
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl User {
    /// Build an unsaved user. The password must already be hashed.
    pub fn new(username: String, email: String, password_hash: String) -> Self {
        Self {
            id: 0,
            username,
            email,
            password_hash,
            first_name: String::new(),
            last_name: String::new(),
            is_active: true,
            is_staff: false,
            is_superuser: false,
            date_joined: Utc::now(),
            last_login: None,
        }
    }

    /// Staff and superusers may use the dashboard
    pub fn is_admin(&self) -> bool {
        self.is_staff || self.is_superuser
    }

    pub fn has_usable_password(&self) -> bool {
        !self.password_hash.is_empty()
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }

    /// Name shown next to comments and in emails
    pub fn display_name(&self) -> String {
        let full = self.full_name();
        if full.is_empty() {
            self.username.clone()
        } else {
            full
        }
    }
}

/// Per-user preferences, 1:1 with [`User`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: i64,
    pub user_id: i64,
    pub newsletter_opt_in: bool,
    pub avatar: Option<String>,
    pub email_on_reply: bool,
    pub email_on_mention: bool,
    pub is_comment_moderator: bool,
    pub comment_ban_until: Option<DateTime<Utc>>,
}

impl Profile {
    pub fn new(user_id: i64) -> Self {
        Self {
            id: 0,
            user_id,
            newsletter_opt_in: false,
            avatar: None,
            email_on_reply: true,
            email_on_mention: true,
            is_comment_moderator: false,
            comment_ban_until: None,
        }
    }

    pub fn is_comment_banned(&self) -> bool {
        self.is_comment_banned_at(Utc::now())
    }

    pub fn is_comment_banned_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.comment_ban_until, Some(until) if until > now)
    }
}

/// Link between a local user and an OAuth provider identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialAccount {
    pub id: i64,
    pub provider: String,
    pub uid: String,
    pub user_id: i64,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// Input for password registration
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserInput {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub newsletter_opt_in: bool,
}

/// Admin-side user edit; `None` leaves the field untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateUserInput {
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_active: Option<bool>,
    pub is_staff: Option<bool>,
    pub is_superuser: Option<bool>,
}

/// Self-service profile edit
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProfileInput {
    pub newsletter_opt_in: Option<bool>,
    pub email_on_reply: Option<bool>,
    pub email_on_mention: Option<bool>,
    /// `Some("")` clears the avatar
    pub avatar: Option<String>,
}

/// Identity returned by an OAuth provider's userinfo endpoint
#[derive(Debug, Clone)]
pub struct SocialIdentity {
    pub provider: String,
    pub uid: String,
    pub email: String,
    pub username_hint: String,
    pub first_name: String,
    pub last_name: String,
}
