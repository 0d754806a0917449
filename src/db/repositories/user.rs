//! User repository
//!
//! Database operations for users and the records hanging off them:
//! - `users` with their 1:1 `profiles` row
//! - `social_accounts` linking OAuth identities to users

use crate::db::DbPool;
use crate::models::{ListParams, Profile, SocialAccount, User};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::sync::Arc;

const USER_COLUMNS: &str = "id, username, email, password_hash, first_name, last_name, \
     is_active, is_staff, is_superuser, date_joined, last_login";

const PROFILE_COLUMNS: &str = "id, user_id, newsletter_opt_in, avatar, email_on_reply, \
     email_on_mention, is_comment_moderator, comment_ban_until";

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a user together with its profile
    async fn create(&self, user: &User, newsletter_opt_in: bool) -> Result<User>;

    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Case-insensitive email lookup; blank emails never match
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Users whose username is in `usernames`
    async fn get_by_usernames(&self, usernames: &[String]) -> Result<Vec<User>>;

    async fn update(&self, user: &User) -> Result<User>;

    async fn update_last_login(&self, id: i64) -> Result<()>;

    /// Remove the user and everything they own; returns the ids of their deleted posts
    async fn delete(&self, id: i64) -> Result<Vec<i64>>;

    async fn count(&self) -> Result<i64>;

    /// Newest first
    async fn list(&self, params: &ListParams) -> Result<(Vec<User>, i64)>;

    /// Active users with an email address who opted into the newsletter
    async fn newsletter_recipients(&self) -> Result<Vec<User>>;

    async fn get_profile(&self, user_id: i64) -> Result<Option<Profile>>;

    async fn update_profile(&self, profile: &Profile) -> Result<Profile>;

    /// Create profiles for users that lack one, returning how many were created
    async fn create_missing_profiles(&self) -> Result<u64>;

    async fn get_social_account(&self, provider: &str, uid: &str)
        -> Result<Option<SocialAccount>>;

    async fn create_social_account(
        &self,
        provider: &str,
        uid: &str,
        user_id: i64,
        email: &str,
    ) -> Result<SocialAccount>;
}

/// SQLx-based user repository implementation
pub struct SqlxUserRepository {
    pool: DbPool,
}

impl SqlxUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DbPool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }

    async fn fetch_user(&self, clause: &str, value: &str, what: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE {}", USER_COLUMNS, clause);
        let row = sqlx::query(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to get user by {}", what))?;

        row.as_ref().map(row_to_user).transpose()
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User, newsletter_opt_in: bool) -> Result<User> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let joined = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO users (username, email, password_hash, first_name, last_name,
                               is_active, is_staff, is_superuser, date_joined, last_login)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.is_active)
        .bind(user.is_staff)
        .bind(user.is_superuser)
        .bind(joined)
        .bind(user.last_login)
        .execute(&mut *tx)
        .await
        .context("Failed to create user")?;
        let id = result.last_insert_rowid();

        sqlx::query("INSERT INTO profiles (user_id, newsletter_opt_in) VALUES (?, ?)")
            .bind(id)
            .bind(newsletter_opt_in)
            .execute(&mut *tx)
            .await
            .context("Failed to create profile")?;

        tx.commit().await.context("Failed to commit user creation")?;

        Ok(User {
            id,
            date_joined: joined,
            ..user.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get user by ID")?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        self.fetch_user("username = ?", username, "username").await
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        if email.trim().is_empty() {
            return Ok(None);
        }
        self.fetch_user("email = ? COLLATE NOCASE AND email <> ''", email.trim(), "email")
            .await
    }

    async fn get_by_usernames(&self, usernames: &[String]) -> Result<Vec<User>> {
        if usernames.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; usernames.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM users WHERE username IN ({})",
            USER_COLUMNS, placeholders
        );
        let mut query = sqlx::query(&sql);
        for name in usernames {
            query = query.bind(name);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .context("Failed to get users by username")?;

        rows.iter().map(row_to_user).collect()
    }

    async fn update(&self, user: &User) -> Result<User> {
        sqlx::query(
            r#"
            UPDATE users
            SET username = ?, email = ?, password_hash = ?, first_name = ?, last_name = ?,
                is_active = ?, is_staff = ?, is_superuser = ?
            WHERE id = ?
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.is_active)
        .bind(user.is_staff)
        .bind(user.is_superuser)
        .bind(user.id)
        .execute(&self.pool)
        .await
        .context("Failed to update user")?;

        self.get_by_id(user.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("User not found after update"))
    }

    async fn update_last_login(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update last login")?;
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<Vec<i64>> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let post_ids: Vec<i64> = sqlx::query("SELECT id FROM posts WHERE author_id = ?")
            .bind(id)
            .fetch_all(&mut *tx)
            .await
            .context("Failed to list posts of user")?
            .iter()
            .map(|row| row.get("id"))
            .collect();

        // Posts go through the FK cascade; their generic comment rows do not
        sqlx::query(
            "DELETE FROM comments WHERE content_type = 'post' \
             AND object_id IN (SELECT id FROM posts WHERE author_id = ?)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete comments on posts of user")?;

        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete user")?;

        tx.commit().await.context("Failed to commit user deletion")?;
        Ok(post_ids)
    }

    async fn count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM users")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count users")?;
        Ok(row.get("count"))
    }

    async fn list(&self, params: &ListParams) -> Result<(Vec<User>, i64)> {
        let sql = format!(
            "SELECT {} FROM users ORDER BY date_joined DESC, id DESC LIMIT ? OFFSET ?",
            USER_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(params.limit())
            .bind(params.offset())
            .fetch_all(&self.pool)
            .await
            .context("Failed to list users")?;

        let users = rows.iter().map(row_to_user).collect::<Result<Vec<_>>>()?;
        let total = self.count().await?;
        Ok((users, total))
    }

    async fn newsletter_recipients(&self) -> Result<Vec<User>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM users
            WHERE is_active = 1
              AND email <> ''
              AND id IN (SELECT user_id FROM profiles WHERE newsletter_opt_in = 1)
            ORDER BY id
            "#,
            USER_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list newsletter recipients")?;

        rows.iter().map(row_to_user).collect()
    }

    async fn get_profile(&self, user_id: i64) -> Result<Option<Profile>> {
        let sql = format!("SELECT {} FROM profiles WHERE user_id = ?", PROFILE_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get profile")?;

        row.as_ref().map(row_to_profile).transpose()
    }

    async fn update_profile(&self, profile: &Profile) -> Result<Profile> {
        sqlx::query(
            r#"
            UPDATE profiles
            SET newsletter_opt_in = ?, avatar = ?, email_on_reply = ?, email_on_mention = ?,
                is_comment_moderator = ?, comment_ban_until = ?
            WHERE user_id = ?
            "#,
        )
        .bind(profile.newsletter_opt_in)
        .bind(&profile.avatar)
        .bind(profile.email_on_reply)
        .bind(profile.email_on_mention)
        .bind(profile.is_comment_moderator)
        .bind(profile.comment_ban_until)
        .bind(profile.user_id)
        .execute(&self.pool)
        .await
        .context("Failed to update profile")?;

        self.get_profile(profile.user_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Profile not found after update"))
    }

    async fn create_missing_profiles(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            INSERT INTO profiles (user_id)
            SELECT id FROM users WHERE id NOT IN (SELECT user_id FROM profiles)
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create missing profiles")?;

        Ok(result.rows_affected())
    }

    async fn get_social_account(
        &self,
        provider: &str,
        uid: &str,
    ) -> Result<Option<SocialAccount>> {
        let row = sqlx::query(
            r#"
            SELECT id, provider, uid, user_id, email, created_at
            FROM social_accounts
            WHERE provider = ? AND uid = ?
            "#,
        )
        .bind(provider)
        .bind(uid)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get social account")?;

        Ok(row.as_ref().map(row_to_social_account))
    }

    async fn create_social_account(
        &self,
        provider: &str,
        uid: &str,
        user_id: i64,
        email: &str,
    ) -> Result<SocialAccount> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO social_accounts (provider, uid, user_id, email, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(provider)
        .bind(uid)
        .bind(user_id)
        .bind(email)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to create social account")?;

        Ok(SocialAccount {
            id: result.last_insert_rowid(),
            provider: provider.to_string(),
            uid: uid.to_string(),
            user_id,
            email: email.to_string(),
            created_at: now,
        })
    }
}

pub(crate) fn row_to_user(row: &SqliteRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id").context("Missing user id")?,
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        is_active: row.get("is_active"),
        is_staff: row.get("is_staff"),
        is_superuser: row.get("is_superuser"),
        date_joined: row.get("date_joined"),
        last_login: row.get::<Option<DateTime<Utc>>, _>("last_login"),
    })
}

fn row_to_profile(row: &SqliteRow) -> Result<Profile> {
    Ok(Profile {
        id: row.try_get("id").context("Missing profile id")?,
        user_id: row.get("user_id"),
        newsletter_opt_in: row.get("newsletter_opt_in"),
        avatar: row.get("avatar"),
        email_on_reply: row.get("email_on_reply"),
        email_on_mention: row.get("email_on_mention"),
        is_comment_moderator: row.get("is_comment_moderator"),
        comment_ban_until: row.get("comment_ban_until"),
    })
}

fn row_to_social_account(row: &SqliteRow) -> SocialAccount {
    SocialAccount {
        id: row.get("id"),
        provider: row.get("provider"),
        uid: row.get("uid"),
        user_id: row.get("user_id"),
        email: row.get("email"),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> (DbPool, SqlxUserRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxUserRepository::new(pool.clone());
        (pool, repo)
    }

    fn test_user(username: &str, email: &str) -> User {
        User::new(username.to_string(), email.to_string(), "hash".to_string())
    }

    #[tokio::test]
    async fn test_create_user_creates_profile() {
        let (_pool, repo) = setup_test_repo().await;
        let created = repo
            .create(&test_user("alice", "alice@example.com"), true)
            .await
            .expect("Failed to create user");

        assert!(created.id > 0);
        let profile = repo.get_profile(created.id).await.unwrap().expect("Profile missing");
        assert!(profile.newsletter_opt_in);
        assert!(profile.email_on_reply);
        assert!(!profile.is_comment_moderator);
    }

    #[tokio::test]
    async fn test_get_by_email_ignores_case_and_blank() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create(&test_user("bob", "Bob@Example.com"), false).await.unwrap();
        repo.create(&test_user("social", ""), false).await.unwrap();

        let found = repo.get_by_email("bob@example.COM").await.unwrap();
        assert_eq!(found.map(|u| u.username), Some("bob".to_string()));
        assert!(repo.get_by_email("").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create(&test_user("carol", "c1@example.com"), false).await.unwrap();
        assert!(repo.create(&test_user("carol", "c2@example.com"), false).await.is_err());
    }

    #[tokio::test]
    async fn test_newsletter_recipients_filter() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create(&test_user("in", "in@example.com"), true).await.unwrap();
        repo.create(&test_user("out", "out@example.com"), false).await.unwrap();
        repo.create(&test_user("blank", ""), true).await.unwrap();
        let mut inactive = test_user("gone", "gone@example.com");
        inactive.is_active = false;
        repo.create(&inactive, true).await.unwrap();

        let recipients = repo.newsletter_recipients().await.unwrap();
        let names: Vec<_> = recipients.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["in"]);
    }

    #[tokio::test]
    async fn test_update_profile_and_ban() {
        let (_pool, repo) = setup_test_repo().await;
        let user = repo.create(&test_user("dave", "dave@example.com"), false).await.unwrap();

        let mut profile = repo.get_profile(user.id).await.unwrap().unwrap();
        profile.comment_ban_until = Some(Utc::now() + chrono::Duration::days(1));
        profile.avatar = Some("avatars/dave.png".to_string());
        let updated = repo.update_profile(&profile).await.unwrap();

        assert!(updated.is_comment_banned());
        assert_eq!(updated.avatar.as_deref(), Some("avatars/dave.png"));
    }

    #[tokio::test]
    async fn test_create_missing_profiles() {
        let (pool, repo) = setup_test_repo().await;
        let user = repo.create(&test_user("erin", "erin@example.com"), false).await.unwrap();
        sqlx::query("DELETE FROM profiles WHERE user_id = ?")
            .bind(user.id)
            .execute(&pool)
            .await
            .unwrap();

        assert_eq!(repo.create_missing_profiles().await.unwrap(), 1);
        assert_eq!(repo.create_missing_profiles().await.unwrap(), 0);
        assert!(repo.get_profile(user.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_social_account_roundtrip_and_uniqueness() {
        let (_pool, repo) = setup_test_repo().await;
        let user = repo.create(&test_user("frank", ""), true).await.unwrap();

        repo.create_social_account("github", "42", user.id, "f@example.com")
            .await
            .unwrap();
        let found = repo.get_social_account("github", "42").await.unwrap().unwrap();
        assert_eq!(found.user_id, user.id);

        assert!(repo
            .create_social_account("github", "42", user.id, "")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_get_by_usernames_and_list() {
        let (_pool, repo) = setup_test_repo().await;
        for name in ["gina", "hank", "ivan"] {
            repo.create(&test_user(name, &format!("{}@example.com", name)), false)
                .await
                .unwrap();
        }

        let found = repo
            .get_by_usernames(&["gina".to_string(), "ivan".to_string(), "nobody".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 2);

        let (page, total) = repo.list(&ListParams::new(1, 2)).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(total, 3);
    }
}
