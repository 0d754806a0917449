//! User service
//!
//! Accounts, sessions and profiles:
//! - registration (the first account becomes superuser and staff)
//! - login by username or email, logout, session validation
//! - profile preferences, newsletter opt-in and unsubscribe
//! - admin edits, comment bans and moderator grants
//! - social sign-in: link an OAuth identity to an existing or new account

use crate::cache::{Cache, CacheLayer};
use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{
    thread_cache_key, ContentType, CreateUserInput, ListParams, PagedResult, Profile, Session,
    SocialIdentity, UpdateProfileInput, UpdateUserInput, User,
};
use crate::services::homepage::{CATEGORY_POSTS_KEY, HOMEPAGE_KEY};
use crate::services::password::{check_password_strength, hash_password, verify_password};
use crate::services::slug::numbered_slug;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;

/// Longest accepted username
pub const MAX_USERNAME_LENGTH: usize = 150;

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Authentication failed (invalid credentials or disabled account)
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Username or email already taken
    #[error("User already exists: {0}")]
    UserExists(String),

    #[error("User not found")]
    NotFound,

    /// Action not allowed for this user
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Input for user login
#[derive(Debug, Clone, Deserialize)]
pub struct LoginInput {
    pub username_or_email: String,
    pub password: String,
}

impl LoginInput {
    pub fn new(username_or_email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username_or_email: username_or_email.into(),
            password: password.into(),
        }
    }
}

/// Result of a completed social sign-in
#[derive(Debug, Clone)]
pub struct SocialLogin {
    pub user: User,
    pub session: Session,
    /// True when the account was created by this sign-in
    pub is_new: bool,
}

/// User service for managing users and authentication
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    cache: Option<Arc<Cache>>,
}

impl UserService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            cache: None,
        }
    }

    /// Drop cached homepage and comment data when a deleted user's posts disappear
    pub fn with_cache(mut self, cache: Arc<Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Register a new user with a password.
    ///
    /// The first account in an empty database is made superuser and staff.
    ///
    /// # Errors
    ///
    /// - `ValidationError` for a malformed username, email or weak password
    /// - `UserExists` if the username or email is taken
    pub async fn register(&self, input: CreateUserInput) -> Result<User, UserServiceError> {
        let username = input.username.trim().to_string();
        let email = input.email.trim().to_string();

        validate_username(&username)?;
        validate_email(&email)?;
        if let Some(problem) = check_password_strength(&input.password, &username) {
            return Err(UserServiceError::ValidationError(problem.to_string()));
        }

        self.ensure_available(&username, &email, None).await?;

        let is_first = self.is_first_user().await?;
        let password_hash = hash_password(&input.password).context("Failed to hash password")?;

        let mut user = User::new(username, email, password_hash);
        user.first_name = input.first_name.trim().to_string();
        user.last_name = input.last_name.trim().to_string();
        if is_first {
            user.is_staff = true;
            user.is_superuser = true;
        }

        let created = self
            .user_repo
            .create(&user, input.newsletter_opt_in)
            .await
            .context("Failed to create user")?;

        tracing::info!(
            "Registered user {} (id {}, admin: {})",
            created.username,
            created.id,
            created.is_admin()
        );
        Ok(created)
    }

    /// Create a superuser, or promote an existing account with that username
    pub async fn create_admin(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<User, UserServiceError> {
        if let Some(mut existing) = self.get_by_username(username).await? {
            existing.is_staff = true;
            existing.is_superuser = true;
            existing.password_hash = hash_password(password).context("Failed to hash password")?;
            let updated = self
                .user_repo
                .update(&existing)
                .await
                .context("Failed to promote user")?;
            return Ok(updated);
        }

        let mut user = self
            .register(CreateUserInput {
                username: username.to_string(),
                email: email.to_string(),
                password: password.to_string(),
                first_name: String::new(),
                last_name: String::new(),
                newsletter_opt_in: false,
            })
            .await?;

        if !user.is_superuser {
            user.is_staff = true;
            user.is_superuser = true;
            user = self
                .user_repo
                .update(&user)
                .await
                .context("Failed to promote user")?;
        }
        Ok(user)
    }

    /// Check credentials and open a session
    ///
    /// # Errors
    ///
    /// - `AuthenticationError` for unknown users, wrong passwords, social-only
    ///   accounts and disabled accounts
    pub async fn login(&self, input: LoginInput) -> Result<(User, Session), UserServiceError> {
        let invalid =
            || UserServiceError::AuthenticationError("Invalid username or password".to_string());

        let user = self
            .find_user_by_username_or_email(input.username_or_email.trim())
            .await?
            .ok_or_else(invalid)?;

        // Social-only accounts sign in through their provider
        if !user.has_usable_password() {
            return Err(invalid());
        }

        let password_valid = verify_password(&input.password, &user.password_hash)
            .context("Failed to verify password")?;
        if !password_valid {
            return Err(invalid());
        }

        if !user.is_active {
            return Err(UserServiceError::AuthenticationError(
                "This account has been disabled".to_string(),
            ));
        }

        let session = self.start_session(&user).await?;
        Ok((user, session))
    }

    /// Where to send a user after login
    pub fn login_redirect(user: &User) -> &'static str {
        if user.is_admin() {
            "/dashboard"
        } else {
            "/"
        }
    }

    pub async fn logout(&self, session_id: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(session_id)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// The user behind a session token, if the session is live and the account active.
    ///
    /// Expired sessions are deleted on sight.
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let session = match self
            .session_repo
            .get_by_id(token)
            .await
            .context("Failed to get session")?
        {
            Some(s) => s,
            None => return Ok(None),
        };

        if session.is_expired() {
            let _ = self.session_repo.delete(token).await;
            return Ok(None);
        }

        let user = self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get user")?;

        Ok(user.filter(|u| u.is_active))
    }

    pub async fn is_first_user(&self) -> Result<bool, UserServiceError> {
        let count = self.user_repo.count().await.context("Failed to count users")?;
        Ok(count == 0)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        Ok(self
            .user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user by ID")?)
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>, UserServiceError> {
        Ok(self
            .user_repo
            .get_by_username(username)
            .await
            .context("Failed to get user by username")?)
    }

    /// Existing users among `usernames` (used for @mentions)
    pub async fn get_by_usernames(&self, usernames: &[String]) -> Result<Vec<User>, UserServiceError> {
        Ok(self
            .user_repo
            .get_by_usernames(usernames)
            .await
            .context("Failed to look up usernames")?)
    }

    /// Delete every expired session, returning how many were removed
    pub async fn cleanup_expired_sessions(&self) -> Result<u64, UserServiceError> {
        Ok(self
            .session_repo
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?)
    }

    // ------------------------------------------------------------------
    // Profiles
    // ------------------------------------------------------------------

    pub async fn get_profile(&self, user_id: i64) -> Result<Profile, UserServiceError> {
        self.user_repo
            .get_profile(user_id)
            .await
            .context("Failed to get profile")?
            .ok_or(UserServiceError::NotFound)
    }

    pub async fn update_profile(
        &self,
        user_id: i64,
        input: UpdateProfileInput,
    ) -> Result<Profile, UserServiceError> {
        let mut profile = self.get_profile(user_id).await?;

        if let Some(opt_in) = input.newsletter_opt_in {
            profile.newsletter_opt_in = opt_in;
        }
        if let Some(on_reply) = input.email_on_reply {
            profile.email_on_reply = on_reply;
        }
        if let Some(on_mention) = input.email_on_mention {
            profile.email_on_mention = on_mention;
        }
        if let Some(avatar) = input.avatar {
            let avatar = avatar.trim().to_string();
            if avatar.contains("..") {
                return Err(UserServiceError::ValidationError(
                    "Invalid avatar path".to_string(),
                ));
            }
            profile.avatar = (!avatar.is_empty()).then_some(avatar);
        }

        Ok(self
            .user_repo
            .update_profile(&profile)
            .await
            .context("Failed to update profile")?)
    }

    /// Set the newsletter preference (social opt-in page and unsubscribe link)
    pub async fn set_newsletter_opt_in(
        &self,
        user_id: i64,
        opt_in: bool,
    ) -> Result<Profile, UserServiceError> {
        self.update_profile(
            user_id,
            UpdateProfileInput {
                newsletter_opt_in: Some(opt_in),
                ..Default::default()
            },
        )
        .await
    }

    /// Backfill profiles for users created without one
    pub async fn create_missing_profiles(&self) -> Result<u64, UserServiceError> {
        Ok(self
            .user_repo
            .create_missing_profiles()
            .await
            .context("Failed to create missing profiles")?)
    }

    // ------------------------------------------------------------------
    // Administration
    // ------------------------------------------------------------------

    pub async fn list_users(&self, params: ListParams) -> Result<PagedResult<User>, UserServiceError> {
        let (users, total) = self
            .user_repo
            .list(&params)
            .await
            .context("Failed to list users")?;
        Ok(PagedResult::new(users, total, &params))
    }

    pub async fn count(&self) -> Result<i64, UserServiceError> {
        Ok(self.user_repo.count().await.context("Failed to count users")?)
    }

    /// Apply an admin edit to another account
    pub async fn admin_update(
        &self,
        id: i64,
        input: UpdateUserInput,
    ) -> Result<User, UserServiceError> {
        let mut user = self.get_by_id(id).await?.ok_or(UserServiceError::NotFound)?;

        if let Some(username) = input.username {
            let username = username.trim().to_string();
            validate_username(&username)?;
            user.username = username;
        }
        if let Some(email) = input.email {
            let email = email.trim().to_string();
            validate_email(&email)?;
            user.email = email;
        }
        self.ensure_available(&user.username, &user.email, Some(id))
            .await?;

        if let Some(first_name) = input.first_name {
            user.first_name = first_name.trim().to_string();
        }
        if let Some(last_name) = input.last_name {
            user.last_name = last_name.trim().to_string();
        }
        if let Some(is_active) = input.is_active {
            user.is_active = is_active;
        }
        if let Some(is_staff) = input.is_staff {
            user.is_staff = is_staff;
        }
        if let Some(is_superuser) = input.is_superuser {
            user.is_superuser = is_superuser;
        }

        let updated = self
            .user_repo
            .update(&user)
            .await
            .context("Failed to update user")?;

        if !updated.is_active {
            self.session_repo
                .delete_by_user(id)
                .await
                .context("Failed to end sessions of disabled user")?;
        }
        Ok(updated)
    }

    /// Delete an account. Admins cannot delete themselves.
    pub async fn delete_user(&self, actor_id: i64, id: i64) -> Result<(), UserServiceError> {
        if actor_id == id {
            return Err(UserServiceError::Forbidden(
                "You cannot delete your own account".to_string(),
            ));
        }
        self.get_by_id(id).await?.ok_or(UserServiceError::NotFound)?;
        let post_ids = self
            .user_repo
            .delete(id)
            .await
            .context("Failed to delete user")?;
        tracing::info!(
            "Deleted user {} with {} posts (by user {})",
            id,
            post_ids.len(),
            actor_id
        );

        if !post_ids.is_empty() {
            self.invalidate_posts(&post_ids).await;
        }
        Ok(())
    }

    async fn invalidate_posts(&self, post_ids: &[i64]) {
        let Some(cache) = &self.cache else {
            return;
        };
        let keys = [HOMEPAGE_KEY.to_string(), CATEGORY_POSTS_KEY.to_string()]
            .into_iter()
            .chain(post_ids.iter().map(|id| thread_cache_key(ContentType::Post, *id)));
        for key in keys {
            if let Err(e) = cache.delete(&key).await {
                tracing::warn!("Failed to invalidate cache key {}: {:#}", key, e);
            }
        }
    }

    /// Ban a user from commenting until `until`; `None` lifts the ban
    pub async fn set_comment_ban(
        &self,
        id: i64,
        until: Option<DateTime<Utc>>,
    ) -> Result<Profile, UserServiceError> {
        let mut profile = self.get_profile(id).await?;
        profile.comment_ban_until = until;
        Ok(self
            .user_repo
            .update_profile(&profile)
            .await
            .context("Failed to update comment ban")?)
    }

    pub async fn set_comment_moderator(
        &self,
        id: i64,
        enabled: bool,
    ) -> Result<Profile, UserServiceError> {
        let mut profile = self.get_profile(id).await?;
        profile.is_comment_moderator = enabled;
        Ok(self
            .user_repo
            .update_profile(&profile)
            .await
            .context("Failed to update moderator flag")?)
    }

    /// Admins and profile moderators may moderate comments
    pub async fn is_moderator(&self, user: &User) -> Result<bool, UserServiceError> {
        if user.is_admin() {
            return Ok(true);
        }
        let profile = self
            .user_repo
            .get_profile(user.id)
            .await
            .context("Failed to get profile")?;
        Ok(profile.map(|p| p.is_comment_moderator).unwrap_or(false))
    }

    // ------------------------------------------------------------------
    // Social sign-in
    // ------------------------------------------------------------------

    /// Sign in with a provider identity.
    ///
    /// A known identity logs into its account. An unknown identity whose
    /// email matches an account is linked to it. Otherwise a new
    /// passwordless account is created, opted into the newsletter.
    pub async fn social_login(
        &self,
        identity: SocialIdentity,
    ) -> Result<SocialLogin, UserServiceError> {
        if identity.uid.is_empty() {
            return Err(UserServiceError::AuthenticationError(
                "Provider returned no account id".to_string(),
            ));
        }

        if let Some(account) = self
            .user_repo
            .get_social_account(&identity.provider, &identity.uid)
            .await
            .context("Failed to get social account")?
        {
            let user = self
                .get_by_id(account.user_id)
                .await?
                .ok_or(UserServiceError::NotFound)?;
            return self.finish_social_login(user, false).await;
        }

        let existing = if identity.email.trim().is_empty() {
            None
        } else {
            self.user_repo
                .get_by_email(&identity.email)
                .await
                .context("Failed to get user by email")?
        };

        let (user, is_new) = match existing {
            Some(user) => (user, false),
            None => {
                let username = self.unique_username(&identity).await?;
                let mut user = User::new(username, identity.email.trim().to_string(), String::new());
                user.first_name = identity.first_name.clone();
                user.last_name = identity.last_name.clone();
                if self.is_first_user().await? {
                    user.is_staff = true;
                    user.is_superuser = true;
                }
                let created = self
                    .user_repo
                    .create(&user, true)
                    .await
                    .context("Failed to create social user")?;
                tracing::info!(
                    "Created user {} from {} sign-in",
                    created.username,
                    identity.provider
                );
                (created, true)
            }
        };

        self.user_repo
            .create_social_account(&identity.provider, &identity.uid, user.id, &identity.email)
            .await
            .context("Failed to link social account")?;

        self.finish_social_login(user, is_new).await
    }

    // ------------------------------------------------------------------
    // Private helpers
    // ------------------------------------------------------------------

    async fn finish_social_login(
        &self,
        user: User,
        is_new: bool,
    ) -> Result<SocialLogin, UserServiceError> {
        if !user.is_active {
            return Err(UserServiceError::AuthenticationError(
                "This account has been disabled".to_string(),
            ));
        }
        let session = self.start_session(&user).await?;
        Ok(SocialLogin {
            user,
            session,
            is_new,
        })
    }

    async fn start_session(&self, user: &User) -> Result<Session, UserServiceError> {
        let session = self
            .session_repo
            .create(&Session::new(user.id))
            .await
            .context("Failed to create session")?;

        self.user_repo
            .update_last_login(user.id)
            .await
            .context("Failed to record last login")?;

        Ok(session)
    }

    async fn find_user_by_username_or_email(
        &self,
        username_or_email: &str,
    ) -> Result<Option<User>, UserServiceError> {
        if let Some(user) = self.get_by_username(username_or_email).await? {
            return Ok(Some(user));
        }

        Ok(self
            .user_repo
            .get_by_email(username_or_email)
            .await
            .context("Failed to get user by email")?)
    }

    async fn ensure_available(
        &self,
        username: &str,
        email: &str,
        exclude_id: Option<i64>,
    ) -> Result<(), UserServiceError> {
        if let Some(other) = self.get_by_username(username).await? {
            if Some(other.id) != exclude_id {
                return Err(UserServiceError::UserExists(format!(
                    "Username '{}' is already taken",
                    username
                )));
            }
        }

        if let Some(other) = self
            .user_repo
            .get_by_email(email)
            .await
            .context("Failed to check email")?
        {
            if Some(other.id) != exclude_id {
                return Err(UserServiceError::UserExists(format!(
                    "Email '{}' is already registered",
                    email
                )));
            }
        }

        Ok(())
    }

    /// First free username derived from the provider's hint or email
    async fn unique_username(&self, identity: &SocialIdentity) -> Result<String, UserServiceError> {
        let hint = if identity.username_hint.trim().is_empty() {
            identity.email.split('@').next().unwrap_or_default()
        } else {
            identity.username_hint.as_str()
        };

        let mut base: String = hint.chars().filter(|c| is_username_char(*c)).take(140).collect();
        if base.is_empty() {
            base = "user".to_string();
        }

        let mut n = 1;
        loop {
            let candidate = numbered_slug(&base, n);
            if self.get_by_username(&candidate).await?.is_none() {
                return Ok(candidate);
            }
            n += 1;
        }
    }
}

fn is_username_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '@' | '+' | '-')
}

/// Usernames are 1..=150 characters of letters, digits and `_.@+-`
pub fn validate_username(username: &str) -> Result<(), UserServiceError> {
    if username.is_empty() {
        return Err(UserServiceError::ValidationError(
            "Username cannot be empty".to_string(),
        ));
    }
    if username.chars().count() > MAX_USERNAME_LENGTH {
        return Err(UserServiceError::ValidationError(format!(
            "Username must be at most {} characters",
            MAX_USERNAME_LENGTH
        )));
    }
    if !username.chars().all(is_username_char) {
        return Err(UserServiceError::ValidationError(
            "Username may only contain letters, digits and @/./+/-/_".to_string(),
        ));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), UserServiceError> {
    if email.is_empty() {
        return Err(UserServiceError::ValidationError(
            "Email cannot be empty".to_string(),
        ));
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') && !domain.contains('@') => {
            Ok(())
        }
        _ => Err(UserServiceError::ValidationError(
            "Invalid email format".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxSessionRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations, DbPool};
    use chrono::Duration;

    async fn setup_test_service() -> (DbPool, UserService) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let session_repo = SqlxSessionRepository::boxed(pool.clone());
        (pool, UserService::new(user_repo, session_repo))
    }

    fn input(username: &str, email: &str) -> CreateUserInput {
        CreateUserInput {
            username: username.to_string(),
            email: email.to_string(),
            password: "s3cure-passw0rd".to_string(),
            first_name: String::new(),
            last_name: String::new(),
            newsletter_opt_in: false,
        }
    }

    fn identity(uid: &str, email: &str) -> SocialIdentity {
        SocialIdentity {
            provider: "github".to_string(),
            uid: uid.to_string(),
            email: email.to_string(),
            username_hint: "octo".to_string(),
            first_name: "Octo".to_string(),
            last_name: "Cat".to_string(),
        }
    }

    #[tokio::test]
    async fn test_first_user_becomes_superuser() {
        let (_pool, service) = setup_test_service().await;

        let first = service.register(input("admin", "admin@example.com")).await.unwrap();
        assert!(first.is_superuser && first.is_staff);

        let second = service.register(input("reader", "reader@example.com")).await.unwrap();
        assert!(!second.is_admin());
        assert_eq!(UserService::login_redirect(&first), "/dashboard");
        assert_eq!(UserService::login_redirect(&second), "/");
    }

    #[tokio::test]
    async fn test_register_records_newsletter_choice() {
        let (_pool, service) = setup_test_service().await;
        let mut data = input("reader", "reader@example.com");
        data.newsletter_opt_in = true;

        let user = service.register(data).await.unwrap();
        let profile = service.get_profile(user.id).await.unwrap();
        assert!(profile.newsletter_opt_in);
        assert!(profile.email_on_reply);
    }

    #[tokio::test]
    async fn test_register_duplicates_fail() {
        let (_pool, service) = setup_test_service().await;
        service.register(input("taken", "taken@example.com")).await.unwrap();

        let same_name = service.register(input("taken", "other@example.com")).await;
        assert!(matches!(same_name, Err(UserServiceError::UserExists(_))));

        let same_email = service.register(input("other", "TAKEN@example.com")).await;
        assert!(matches!(same_email, Err(UserServiceError::UserExists(_))));
    }

    #[tokio::test]
    async fn test_register_validation() {
        let (_pool, service) = setup_test_service().await;

        for (username, email) in [("", "a@example.com"), ("has space", "a@example.com"), ("ok", "no-at-sign")] {
            let result = service.register(input(username, email)).await;
            assert!(matches!(result, Err(UserServiceError::ValidationError(_))), "{username} {email}");
        }

        let long_name = "x".repeat(151);
        let result = service.register(input(&long_name, "a@example.com")).await;
        assert!(matches!(result, Err(UserServiceError::ValidationError(_))));

        let mut weak = input("weak", "weak@example.com");
        weak.password = "12345678".to_string();
        assert!(matches!(
            service.register(weak).await,
            Err(UserServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_login_with_username_or_email() {
        let (_pool, service) = setup_test_service().await;
        service.register(input("writer", "writer@example.com")).await.unwrap();

        let (user, session) = service
            .login(LoginInput::new("writer", "s3cure-passw0rd"))
            .await
            .unwrap();
        assert_eq!(session.user_id, user.id);

        let (by_email, _) = service
            .login(LoginInput::new("Writer@Example.com", "s3cure-passw0rd"))
            .await
            .unwrap();
        assert_eq!(by_email.id, user.id);

        let refreshed = service.get_by_id(user.id).await.unwrap().unwrap();
        assert!(refreshed.last_login.is_some());
    }

    #[tokio::test]
    async fn test_login_rejects_bad_credentials_and_disabled_accounts() {
        let (_pool, service) = setup_test_service().await;
        let user = service.register(input("writer", "writer@example.com")).await.unwrap();

        let wrong = service.login(LoginInput::new("writer", "not-the-password")).await;
        assert!(matches!(wrong, Err(UserServiceError::AuthenticationError(_))));

        let unknown = service.login(LoginInput::new("nobody", "s3cure-passw0rd")).await;
        assert!(matches!(unknown, Err(UserServiceError::AuthenticationError(_))));

        service
            .admin_update(
                user.id,
                UpdateUserInput {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let disabled = service.login(LoginInput::new("writer", "s3cure-passw0rd")).await;
        assert!(matches!(disabled, Err(UserServiceError::AuthenticationError(_))));
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let (pool, service) = setup_test_service().await;
        let user = service.register(input("writer", "writer@example.com")).await.unwrap();
        let (_, session) = service
            .login(LoginInput::new("writer", "s3cure-passw0rd"))
            .await
            .unwrap();

        let current = service.validate_session(&session.id).await.unwrap().unwrap();
        assert_eq!(current.id, user.id);

        service.logout(&session.id).await.unwrap();
        assert!(service.validate_session(&session.id).await.unwrap().is_none());

        let session_repo = SqlxSessionRepository::new(pool);
        let mut stale = Session::new(user.id);
        stale.expires_at = Utc::now() - Duration::hours(1);
        session_repo.create(&stale).await.unwrap();

        assert!(service.validate_session(&stale.id).await.unwrap().is_none());
        assert!(session_repo.get_by_id(&stale.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_profile_updates_and_unsubscribe() {
        let (_pool, service) = setup_test_service().await;
        let user = service.register(input("reader", "reader@example.com")).await.unwrap();

        let profile = service
            .update_profile(
                user.id,
                UpdateProfileInput {
                    newsletter_opt_in: Some(true),
                    email_on_mention: Some(false),
                    avatar: Some("uploads/me.png".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(profile.newsletter_opt_in);
        assert!(!profile.email_on_mention);
        assert_eq!(profile.avatar.as_deref(), Some("uploads/me.png"));

        let profile = service.set_newsletter_opt_in(user.id, false).await.unwrap();
        assert!(!profile.newsletter_opt_in);

        let bad = service
            .update_profile(
                user.id,
                UpdateProfileInput {
                    avatar: Some("../etc/passwd".to_string()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(bad, Err(UserServiceError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_admin_cannot_delete_self() {
        let (_pool, service) = setup_test_service().await;
        let admin = service.register(input("admin", "admin@example.com")).await.unwrap();
        let other = service.register(input("other", "other@example.com")).await.unwrap();

        let result = service.delete_user(admin.id, admin.id).await;
        assert!(matches!(result, Err(UserServiceError::Forbidden(_))));

        service.delete_user(admin.id, other.id).await.unwrap();
        assert!(service.get_by_id(other.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_user_removes_comments_on_their_posts_and_cached_pages() {
        let (pool, service) = setup_test_service().await;
        let cache = Arc::new(Cache::Memory(crate::cache::MemoryCache::new()));
        let service = UserService {
            cache: Some(cache.clone()),
            ..service
        };
        let admin = service.register(input("admin", "admin@example.com")).await.unwrap();
        let author = service.register(input("author", "author@example.com")).await.unwrap();
        let reader = service.register(input("reader", "reader@example.com")).await.unwrap();

        let now = Utc::now();
        sqlx::query(
            "INSERT INTO categories (category_name, slug, created_at, updated_at) VALUES ('Rust', 'rust', ?, ?)",
        )
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await
        .unwrap();
        let post_id: i64 = sqlx::query_scalar(
            "INSERT INTO posts (title, slug, category_id, author_id, short_description, blog_body, status, published_at, created_at, updated_at) \
             VALUES ('Lifetimes', 'lifetimes', 1, ?, 'intro', 'body', 'published', ?, ?, ?) RETURNING id",
        )
        .bind(author.id)
        .bind(now)
        .bind(now)
        .bind(now)
        .fetch_one(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO comments (content_type, object_id, user_id, comment, created_at, updated_at) VALUES ('post', ?, ?, 'great write-up', ?, ?)",
        )
        .bind(post_id)
        .bind(reader.id)
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await
        .unwrap();

        let ttl = std::time::Duration::from_secs(60);
        let thread_key = thread_cache_key(ContentType::Post, post_id);
        for key in [HOMEPAGE_KEY, CATEGORY_POSTS_KEY, thread_key.as_str()] {
            cache.set(key, &1, ttl).await.unwrap();
        }

        service.delete_user(admin.id, author.id).await.unwrap();

        let posts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts")
            .fetch_one(&pool)
            .await
            .unwrap();
        let comments: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(posts, 0);
        assert_eq!(comments, 0);
        assert!(service.get_by_id(reader.id).await.unwrap().is_some());
        for key in [HOMEPAGE_KEY, CATEGORY_POSTS_KEY, thread_key.as_str()] {
            assert_eq!(cache.get::<i32>(key).await.unwrap(), None, "{} still cached", key);
        }
    }

    #[tokio::test]
    async fn test_comment_ban_and_moderator_flags() {
        let (_pool, service) = setup_test_service().await;
        service.register(input("admin", "admin@example.com")).await.unwrap();
        let user = service.register(input("reader", "reader@example.com")).await.unwrap();

        let banned = service
            .set_comment_ban(user.id, Some(Utc::now() + Duration::days(1)))
            .await
            .unwrap();
        assert!(banned.is_comment_banned());
        let lifted = service.set_comment_ban(user.id, None).await.unwrap();
        assert!(!lifted.is_comment_banned());

        assert!(!service.is_moderator(&user).await.unwrap());
        service.set_comment_moderator(user.id, true).await.unwrap();
        assert!(service.is_moderator(&user).await.unwrap());
    }

    #[tokio::test]
    async fn test_social_login_creates_then_reuses_account() {
        let (_pool, service) = setup_test_service().await;
        service.register(input("admin", "admin@example.com")).await.unwrap();
        service.register(input("octo", "someone@example.com")).await.unwrap();

        let first = service.social_login(identity("42", "octo@example.com")).await.unwrap();
        assert!(first.is_new);
        assert_eq!(first.user.username, "octo-2");
        assert!(!first.user.has_usable_password());
        assert!(service.get_profile(first.user.id).await.unwrap().newsletter_opt_in);

        let again = service.social_login(identity("42", "octo@example.com")).await.unwrap();
        assert!(!again.is_new);
        assert_eq!(again.user.id, first.user.id);

        for guess in ["", "SomePassword123"] {
            let password_login = service.login(LoginInput::new("octo-2", guess)).await;
            assert!(matches!(password_login, Err(UserServiceError::AuthenticationError(_))));
        }
    }

    #[tokio::test]
    async fn test_social_login_links_existing_email() {
        let (_pool, service) = setup_test_service().await;
        let user = service.register(input("writer", "writer@example.com")).await.unwrap();

        let login = service.social_login(identity("7", "writer@example.com")).await.unwrap();
        assert!(!login.is_new);
        assert_eq!(login.user.id, user.id);
    }

    #[tokio::test]
    async fn test_create_admin_promotes_existing_user() {
        let (_pool, service) = setup_test_service().await;
        service.register(input("first", "first@example.com")).await.unwrap();
        service.register(input("editor", "editor@example.com")).await.unwrap();

        let promoted = service
            .create_admin("editor", "editor@example.com", "new-passw0rd!")
            .await
            .unwrap();
        assert!(promoted.is_superuser);
        assert!(service.login(LoginInput::new("editor", "new-passw0rd!")).await.is_ok());

        let fresh = service
            .create_admin("boss", "boss@example.com", "boss-passw0rd!")
            .await
            .unwrap();
        assert!(fresh.is_superuser && fresh.is_staff);
    }
}
