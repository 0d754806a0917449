//! Comment service
//!
//! Threaded comments on posts and pages:
//! - Posting with sanitizing, spam checks, bans, rate limiting and a depth limit
//! - Reply, author and `@mention` email notifications
//! - Edit window, deletion, flags with auto-flagging, like toggling
//! - Cached public threads and the moderation queue

use crate::cache::{Cache, CacheLayer};
use crate::config::CommentsConfig;
use crate::db::repositories::{CommentRepository, PageRepository, PostRepository, UserRepository};
use crate::models::{
    thread_cache_key, Comment, CommentFlag, CommentNode, CommentSearchHit, CommentStats,
    CommentView, ContentType, CreateCommentInput, FlagCommentInput, FlagView, LikeToggle,
    ListParams, ModerationAction, ModerationFilter, PagedResult, UpdateCommentInput, User,
};
use crate::services::email::{Mailer, OutgoingEmail};
use crate::services::rate_limiter::CommentRateLimiter;
use crate::services::spam::validate_comment_text;
use anyhow::Context;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

const THREAD_CACHE_TTL: Duration = Duration::from_secs(300);

/// Top-level comments per page of "load more"
pub const MORE_PAGE_SIZE: u32 = 10;
/// Comments per page on "my comments"
pub const MINE_PAGE_SIZE: u32 = 20;

const SEARCH_MIN_LENGTH: usize = 2;
const SEARCH_LIMIT: i64 = 20;
const SEARCH_SNIPPET_LENGTH: usize = 100;
const MODERATION_QUEUE_LIMIT: i64 = 100;
const MAX_FLAG_DESCRIPTION_LENGTH: usize = 500;

static MENTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"@(\w+)").expect("valid mention regex"));

#[derive(Debug, thiserror::Error)]
pub enum CommentServiceError {
    #[error("Comment not found")]
    NotFound,

    #[error("Commented object not found")]
    TargetNotFound,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("You are banned from commenting until {0}")]
    Banned(DateTime<Utc>),

    #[error("Please wait {0} seconds before commenting again")]
    RateLimited(u64),

    #[error("You have already flagged this comment")]
    AlreadyFlagged,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Result of flagging a comment
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct FlagOutcome {
    pub flag_count: i64,
    /// The comment is flagged for moderation
    pub is_flagged: bool,
}

/// The post or page a thread hangs off
#[derive(Debug, Clone)]
struct CommentTarget {
    title: String,
    url: String,
    author_id: Option<i64>,
}

pub struct CommentService {
    repo: Arc<dyn CommentRepository>,
    user_repo: Arc<dyn UserRepository>,
    post_repo: Arc<dyn PostRepository>,
    page_repo: Arc<dyn PageRepository>,
    cache: Arc<Cache>,
    rate_limiter: CommentRateLimiter,
    mailer: Option<Arc<dyn Mailer>>,
    config: CommentsConfig,
    site_url: String,
}

impl CommentService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repo: Arc<dyn CommentRepository>,
        user_repo: Arc<dyn UserRepository>,
        post_repo: Arc<dyn PostRepository>,
        page_repo: Arc<dyn PageRepository>,
        cache: Arc<Cache>,
        mailer: Option<Arc<dyn Mailer>>,
        config: CommentsConfig,
        site_url: &str,
    ) -> Self {
        Self {
            rate_limiter: CommentRateLimiter::new(cache.clone(), config.rate_limit_seconds),
            repo,
            user_repo,
            post_repo,
            page_repo,
            cache,
            mailer,
            config,
            site_url: site_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn config(&self) -> &CommentsConfig {
        &self.config
    }

    /// Post a comment or reply as `author`
    pub async fn create(
        &self,
        author: &User,
        input: CreateCommentInput,
    ) -> Result<CommentView, CommentServiceError> {
        let text = validate_comment_text(&input.comment, self.config.min_length, self.config.max_length)
            .map_err(|e| CommentServiceError::ValidationError(e.to_string()))?;

        if let Some(profile) = self
            .user_repo
            .get_profile(author.id)
            .await
            .context("Failed to load profile")?
        {
            if let Some(until) = profile.comment_ban_until.filter(|_| profile.is_comment_banned()) {
                return Err(CommentServiceError::Banned(until));
            }
        }

        let identity = format!("user:{}", author.id);
        if let Some(wait) = self.rate_limiter.retry_after(&identity).await {
            return Err(CommentServiceError::RateLimited(wait));
        }
        // Stamp before any further await so overlapping requests see the window
        self.rate_limiter.record(&identity).await;

        let target = self.target(input.content_type, input.object_id).await?;

        let parent = match input.parent_id {
            Some(parent_id) => Some(
                self.check_parent(parent_id, input.content_type, input.object_id)
                    .await?,
            ),
            None => None,
        };

        let comment = Comment::new(
            input.content_type,
            input.object_id,
            parent.as_ref().map(|p| p.id),
            author.id,
            text,
        );
        let created = self
            .repo
            .create(&comment)
            .await
            .context("Failed to create comment")?;

        self.invalidate(&created).await;
        self.notify(author, &created, parent.as_ref(), &target).await;

        tracing::info!(
            "User {} commented on {} {} (comment {})",
            author.id,
            created.content_type,
            created.object_id,
            created.id
        );
        self.get_view(created.id).await
    }

    pub async fn get(&self, id: i64) -> Result<Comment, CommentServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get comment")?
            .ok_or(CommentServiceError::NotFound)
    }

    pub async fn get_view(&self, id: i64) -> Result<CommentView, CommentServiceError> {
        self.repo
            .get_view(id)
            .await
            .context("Failed to get comment")?
            .ok_or(CommentServiceError::NotFound)
    }

    /// Owners may edit within the edit window; admins any time
    pub async fn update(
        &self,
        actor: &User,
        id: i64,
        input: UpdateCommentInput,
    ) -> Result<CommentView, CommentServiceError> {
        let comment = self.get(id).await?;
        self.check_can_edit(actor, &comment, Utc::now())?;

        let text = validate_comment_text(&input.comment, self.config.min_length, self.config.max_length)
            .map_err(|e| CommentServiceError::ValidationError(e.to_string()))?;

        let updated = self
            .repo
            .update_text(id, &text)
            .await
            .context("Failed to update comment")?;
        self.invalidate(&updated).await;
        self.get_view(id).await
    }

    /// Delete a comment and its replies; owners and admins only
    pub async fn delete(&self, actor: &User, id: i64) -> Result<(), CommentServiceError> {
        let comment = self.get(id).await?;
        if comment.user_id != actor.id && !actor.is_admin() {
            return Err(CommentServiceError::Forbidden(
                "You cannot delete this comment".to_string(),
            ));
        }

        self.repo
            .delete(id)
            .await
            .context("Failed to delete comment")?;
        self.invalidate(&comment).await;
        tracing::info!("User {} deleted comment {}", actor.id, id);
        Ok(())
    }

    /// Report a comment; enough reports flag it for moderation
    pub async fn flag(
        &self,
        reporter: &User,
        id: i64,
        input: FlagCommentInput,
    ) -> Result<FlagOutcome, CommentServiceError> {
        let comment = self.get(id).await?;
        if input.description.chars().count() > MAX_FLAG_DESCRIPTION_LENGTH {
            return Err(CommentServiceError::ValidationError(format!(
                "Description must be at most {} characters",
                MAX_FLAG_DESCRIPTION_LENGTH
            )));
        }
        if self
            .repo
            .has_flagged(id, reporter.id)
            .await
            .context("Failed to check existing flag")?
        {
            return Err(CommentServiceError::AlreadyFlagged);
        }

        let flag = CommentFlag {
            id: 0,
            comment_id: id,
            user_id: reporter.id,
            reason: input.reason,
            description: input.description.trim().to_string(),
            is_reviewed: false,
            created_at: Utc::now(),
        };
        self.repo
            .create_flag(&flag)
            .await
            .context("Failed to create flag")?;

        let flag_count = self.repo.flag_count(id).await.context("Failed to count flags")?;
        let mut is_flagged = comment.is_flagged;
        if !is_flagged && flag_count >= self.config.auto_flag_threshold {
            self.repo
                .set_flagged(id, true)
                .await
                .context("Failed to flag comment")?;
            is_flagged = true;
            tracing::info!("Comment {} auto-flagged after {} reports", id, flag_count);
        }

        Ok(FlagOutcome {
            flag_count,
            is_flagged,
        })
    }

    pub async fn toggle_like(&self, user: &User, id: i64) -> Result<LikeToggle, CommentServiceError> {
        let comment = self.get(id).await?;
        let toggle = self
            .repo
            .toggle_like(id, user.id)
            .await
            .context("Failed to toggle like")?;
        self.invalidate(&comment).await;
        Ok(toggle)
    }

    /// Approved thread for an object, cached
    pub async fn thread(
        &self,
        content_type: ContentType,
        object_id: i64,
    ) -> Result<Vec<CommentNode>, CommentServiceError> {
        let key = thread_cache_key(content_type, object_id);
        if let Some(nodes) = self.cache.get::<Vec<CommentNode>>(&key).await.ok().flatten() {
            return Ok(nodes);
        }

        let views = self
            .repo
            .list_for_object(content_type, object_id, true)
            .await
            .context("Failed to load comments")?;
        let nodes = build_tree(views);
        let _ = self.cache.set(&key, &nodes, THREAD_CACHE_TTL).await;
        Ok(nodes)
    }

    /// Approved top-level comments, newest first
    pub async fn more(
        &self,
        content_type: ContentType,
        object_id: i64,
        page: u32,
    ) -> Result<PagedResult<CommentView>, CommentServiceError> {
        let params = ListParams::new(page, MORE_PAGE_SIZE);
        let (items, total) = self
            .repo
            .list_top_level(content_type, object_id, &params)
            .await
            .context("Failed to list comments")?;
        Ok(PagedResult::new(items, total, &params))
    }

    pub async fn replies(&self, parent_id: i64) -> Result<Vec<CommentView>, CommentServiceError> {
        self.get(parent_id).await?;
        Ok(self
            .repo
            .list_replies(parent_id)
            .await
            .context("Failed to list replies")?)
    }

    pub async fn search(&self, q: &str) -> Result<Vec<CommentSearchHit>, CommentServiceError> {
        let q = q.trim();
        if q.chars().count() < SEARCH_MIN_LENGTH {
            return Err(CommentServiceError::ValidationError(
                "Query too short".to_string(),
            ));
        }

        let views = self
            .repo
            .search(q, SEARCH_LIMIT)
            .await
            .context("Failed to search comments")?;

        let mut titles: HashMap<(ContentType, i64), String> = HashMap::new();
        let mut hits = Vec::with_capacity(views.len());
        for view in views {
            let c = &view.comment;
            let key = (c.content_type, c.object_id);
            if !titles.contains_key(&key) {
                let title = match self.target(c.content_type, c.object_id).await {
                    Ok(target) => target.title,
                    Err(_) => String::new(),
                };
                titles.insert(key, title);
            }
            let depth = self.repo.depth(c.id).await.context("Failed to get depth")?;

            hits.push(CommentSearchHit {
                id: c.id,
                content: snippet(&c.comment),
                author: view.author.display_name.clone(),
                created_at: c.created_at,
                content_type: c.content_type,
                object_id: c.object_id,
                object_title: titles.get(&key).cloned().unwrap_or_default(),
                depth,
                is_reply: c.is_reply(),
            });
        }
        Ok(hits)
    }

    pub async fn stats(
        &self,
        content_type: ContentType,
        object_id: i64,
    ) -> Result<CommentStats, CommentServiceError> {
        Ok(self
            .repo
            .stats_for_object(content_type, object_id)
            .await
            .context("Failed to get comment stats")?)
    }

    /// Comments written by `user_id`, newest first
    pub async fn mine(
        &self,
        user_id: i64,
        page: u32,
    ) -> Result<PagedResult<CommentView>, CommentServiceError> {
        let params = ListParams::new(page, MINE_PAGE_SIZE);
        let (items, total) = self
            .repo
            .list_by_user(user_id, &params)
            .await
            .context("Failed to list user comments")?;
        Ok(PagedResult::new(items, total, &params))
    }

    pub async fn moderation_queue(
        &self,
        filter: ModerationFilter,
    ) -> Result<Vec<CommentView>, CommentServiceError> {
        Ok(self
            .repo
            .moderation_queue(filter, MODERATION_QUEUE_LIMIT)
            .await
            .context("Failed to load moderation queue")?)
    }

    /// Approve (also clearing the flag) or hide a comment
    pub async fn moderate(
        &self,
        moderator: &User,
        id: i64,
        action: ModerationAction,
    ) -> Result<CommentView, CommentServiceError> {
        let comment = self.get(id).await?;
        match action {
            ModerationAction::Approve => self.repo.set_approved(id, true, true).await,
            ModerationAction::Reject => self.repo.set_approved(id, false, false).await,
        }
        .context("Failed to moderate comment")?;

        self.invalidate(&comment).await;
        tracing::info!("Moderator {} applied {:?} to comment {}", moderator.id, action, id);
        self.get_view(id).await
    }

    pub async fn flags(&self, comment_id: i64) -> Result<Vec<FlagView>, CommentServiceError> {
        self.get(comment_id).await?;
        Ok(self
            .repo
            .list_flags(comment_id)
            .await
            .context("Failed to list flags")?)
    }

    pub async fn review_flag(&self, flag_id: i64) -> Result<(), CommentServiceError> {
        self.repo
            .get_flag(flag_id)
            .await
            .context("Failed to get flag")?
            .ok_or(CommentServiceError::NotFound)?;
        self.repo
            .mark_flag_reviewed(flag_id)
            .await
            .context("Failed to review flag")?;
        Ok(())
    }

    /// Site-wide (total, pending, flagged)
    pub async fn counts(&self) -> Result<(i64, i64, i64), CommentServiceError> {
        Ok(self.repo.counts().await.context("Failed to count comments")?)
    }

    fn check_can_edit(
        &self,
        actor: &User,
        comment: &Comment,
        now: DateTime<Utc>,
    ) -> Result<(), CommentServiceError> {
        if actor.is_admin() {
            return Ok(());
        }
        if comment.user_id != actor.id {
            return Err(CommentServiceError::Forbidden(
                "You cannot edit this comment".to_string(),
            ));
        }
        let window = ChronoDuration::minutes(self.config.edit_window_minutes);
        if now - comment.created_at > window {
            return Err(CommentServiceError::Forbidden(format!(
                "Comments can only be edited within {} minutes",
                self.config.edit_window_minutes
            )));
        }
        Ok(())
    }

    async fn check_parent(
        &self,
        parent_id: i64,
        content_type: ContentType,
        object_id: i64,
    ) -> Result<Comment, CommentServiceError> {
        let parent = self
            .repo
            .get_by_id(parent_id)
            .await
            .context("Failed to get parent comment")?
            .filter(|p| p.content_type == content_type && p.object_id == object_id)
            .ok_or_else(|| {
                CommentServiceError::ValidationError("Parent comment not found".to_string())
            })?;

        let depth = self
            .repo
            .depth(parent.id)
            .await
            .context("Failed to get parent depth")?;
        if depth + 1 >= self.config.max_depth {
            return Err(CommentServiceError::ValidationError(
                "Maximum reply depth reached".to_string(),
            ));
        }
        Ok(parent)
    }

    async fn target(
        &self,
        content_type: ContentType,
        object_id: i64,
    ) -> Result<CommentTarget, CommentServiceError> {
        match content_type {
            ContentType::Post => {
                let summary = self
                    .post_repo
                    .get_summary(object_id)
                    .await
                    .context("Failed to get post")?
                    .filter(|s| s.post.is_published())
                    .ok_or(CommentServiceError::TargetNotFound)?;
                Ok(CommentTarget {
                    url: summary.url(),
                    title: summary.post.title,
                    author_id: Some(summary.post.author_id),
                })
            }
            ContentType::Page => {
                let page = self
                    .page_repo
                    .get_by_id(object_id)
                    .await
                    .context("Failed to get page")?
                    .filter(|p| p.is_published())
                    .ok_or(CommentServiceError::TargetNotFound)?;
                Ok(CommentTarget {
                    url: page.path(),
                    title: page.title,
                    author_id: None,
                })
            }
        }
    }

    async fn invalidate(&self, comment: &Comment) {
        let _ = self.cache.delete(&comment.thread_key()).await;
    }

    /// Reply, author and mention emails. Failures are logged only.
    async fn notify(
        &self,
        author: &User,
        comment: &Comment,
        parent: Option<&Comment>,
        target: &CommentTarget,
    ) {
        let Some(mailer) = self.mailer.as_ref() else {
            tracing::debug!("SMTP not configured, skipping comment notifications");
            return;
        };

        let link = format!("{}{}#comment-{}", self.site_url, target.url, comment.id);
        let mut emails = Vec::new();
        let mut notified: HashSet<i64> = HashSet::new();

        if let Some(parent) = parent {
            if let Some(user) = self.recipient(parent.user_id, author, |p| p.email_on_reply).await {
                emails.push(OutgoingEmail::to(
                    user.email.clone(),
                    format!("New reply to your comment on {}", target.title),
                    format!(
                        "Hi {},\n\n{} replied to your comment:\n\n{}\n\nView the reply: {}\n",
                        user.display_name(),
                        author.display_name(),
                        comment.comment,
                        link
                    ),
                ));
                notified.insert(user.id);
            }
        }

        if let Some(owner_id) = target.author_id.filter(|id| !notified.contains(id)) {
            if let Some(user) = self.recipient(owner_id, author, |p| p.email_on_reply).await {
                emails.push(OutgoingEmail::to(
                    user.email.clone(),
                    format!("New comment on your post: {}", target.title),
                    format!(
                        "Hi {},\n\n{} commented on \"{}\":\n\n{}\n\nView the comment: {}\n",
                        user.display_name(),
                        author.display_name(),
                        target.title,
                        comment.comment,
                        link
                    ),
                ));
            }
        }

        let mentions = extract_mentions(&comment.comment);
        if !mentions.is_empty() {
            match self.user_repo.get_by_usernames(&mentions).await {
                Ok(users) => {
                    for user in users {
                        let Some(user) = self
                            .recipient(user.id, author, |p| p.email_on_mention)
                            .await
                        else {
                            continue;
                        };
                        emails.push(OutgoingEmail::to(
                            user.email.clone(),
                            format!("You were mentioned in a comment by {}", author.username),
                            format!(
                                "Hi {},\n\n{} mentioned you in a comment on \"{}\":\n\n{}\n\nView the comment: {}\n",
                                user.display_name(),
                                author.display_name(),
                                target.title,
                                comment.comment,
                                link
                            ),
                        ));
                    }
                }
                Err(e) => tracing::warn!("Failed to look up mentioned users: {:#}", e),
            }
        }

        for email in emails {
            if let Err(e) = mailer.send(&email).await {
                tracing::warn!("Failed to send comment notification to {:?}: {:#}", email.to, e);
            }
        }
    }

    /// `user_id` if they should get an email: not the author, has an
    /// address, active, and opted in through `wants`
    async fn recipient(
        &self,
        user_id: i64,
        author: &User,
        wants: impl Fn(&crate::models::Profile) -> bool,
    ) -> Option<User> {
        if user_id == author.id {
            return None;
        }
        let user = self.user_repo.get_by_id(user_id).await.ok().flatten()?;
        if !user.is_active || user.email.is_empty() {
            return None;
        }
        let profile = self.user_repo.get_profile(user_id).await.ok().flatten()?;
        wants(&profile).then_some(user)
    }
}

/// Usernames mentioned as `@name`, deduplicated in order of appearance
pub fn extract_mentions(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    MENTION_RE
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

/// Nest flat comments (oldest first) into a thread.
///
/// Roots are ordered newest first and replies oldest first. Replies whose
/// parent is not in `views` are dropped.
pub fn build_tree(views: Vec<CommentView>) -> Vec<CommentNode> {
    let mut children: HashMap<i64, Vec<usize>> = HashMap::new();
    let mut roots: Vec<usize> = Vec::new();
    let ids: HashSet<i64> = views.iter().map(|v| v.comment.id).collect();

    for (idx, view) in views.iter().enumerate() {
        match view.comment.parent_id {
            None => roots.push(idx),
            Some(parent) if ids.contains(&parent) => children.entry(parent).or_default().push(idx),
            Some(_) => {}
        }
    }

    roots.sort_by(|&a, &b| {
        views[b]
            .comment
            .created_at
            .cmp(&views[a].comment.created_at)
            .then(views[b].comment.id.cmp(&views[a].comment.id))
    });
    for list in children.values_mut() {
        list.sort_by(|&a, &b| {
            views[a]
                .comment
                .created_at
                .cmp(&views[b].comment.created_at)
                .then(views[a].comment.id.cmp(&views[b].comment.id))
        });
    }

    let mut arena: Vec<Option<CommentView>> = views.into_iter().map(Some).collect();
    roots
        .into_iter()
        .filter_map(|idx| take_node(&mut arena, &children, idx, 0))
        .collect()
}

fn take_node(
    arena: &mut [Option<CommentView>],
    children: &HashMap<i64, Vec<usize>>,
    idx: usize,
    depth: u32,
) -> Option<CommentNode> {
    let view = arena.get_mut(idx)?.take()?;
    let replies = children
        .get(&view.comment.id)
        .map(|kids| {
            kids.iter()
                .filter_map(|&kid| take_node(arena, children, kid, depth + 1))
                .collect()
        })
        .unwrap_or_default();

    Some(CommentNode {
        comment: view.comment,
        author: view.author,
        depth,
        like_count: view.like_count,
        replies,
    })
}

fn snippet(text: &str) -> String {
    if text.chars().count() > SEARCH_SNIPPET_LENGTH {
        let head: String = text.chars().take(SEARCH_SNIPPET_LENGTH).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::db::repositories::{
        CategoryRepository, SqlxCategoryRepository, SqlxCommentRepository, SqlxPageRepository,
        SqlxPostRepository, SqlxUserRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::{Category, CommentAuthor, FlagReason, Post, PublishStatus};
    use crate::services::email::RecordingMailer;

    struct Fixture {
        service: CommentService,
        users: Arc<dyn UserRepository>,
        mailer: Arc<RecordingMailer>,
        post_id: i64,
        other_post_id: i64,
        owner: User,
        alice: User,
        bob: User,
    }

    const TEXT: &str = "This is a perfectly ordinary comment.";

    async fn setup_with(config: CommentsConfig) -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let users = SqlxUserRepository::boxed(pool.clone());
        let mut owner = User::new("owner".into(), "owner@example.com".into(), String::new());
        owner.is_staff = true;
        let owner = users.create(&owner, false).await.unwrap();
        let alice = users
            .create(&User::new("alice".into(), "alice@example.com".into(), String::new()), false)
            .await
            .unwrap();
        let bob = users
            .create(&User::new("bob".into(), "bob@example.com".into(), String::new()), false)
            .await
            .unwrap();

        let category = SqlxCategoryRepository::new(pool.clone())
            .create(&Category::new("Rust".into(), "rust".into()))
            .await
            .unwrap();
        let posts = SqlxPostRepository::boxed(pool.clone());
        let mut post = Post::new("Hello".into(), "hello".into(), category.id, owner.id);
        post.status = PublishStatus::Published;
        let post = posts.create(&post).await.unwrap();
        let mut other = Post::new("Other".into(), "other".into(), category.id, owner.id);
        other.status = PublishStatus::Published;
        let other = posts.create(&other).await.unwrap();

        let mailer = Arc::new(RecordingMailer::new());
        let cache = Arc::new(Cache::Memory(MemoryCache::new()));
        let service = CommentService::new(
            SqlxCommentRepository::boxed(pool.clone()),
            users.clone(),
            posts,
            SqlxPageRepository::boxed(pool),
            cache,
            Some(mailer.clone()),
            config,
            "https://blog.example",
        );

        Fixture {
            service,
            users,
            mailer,
            post_id: post.id,
            other_post_id: other.id,
            owner,
            alice,
            bob,
        }
    }

    async fn setup() -> Fixture {
        setup_with(CommentsConfig {
            rate_limit_seconds: 0,
            ..CommentsConfig::default()
        })
        .await
    }

    fn input(f: &Fixture, parent_id: Option<i64>) -> CreateCommentInput {
        CreateCommentInput {
            content_type: ContentType::Post,
            object_id: f.post_id,
            parent_id,
            comment: TEXT.to_string(),
        }
    }

    #[tokio::test]
    async fn test_banned_user_cannot_comment() {
        let f = setup().await;
        let until = Utc::now() + ChronoDuration::days(1);
        let mut profile = f.users.get_profile(f.alice.id).await.unwrap().unwrap();
        profile.comment_ban_until = Some(until);
        f.users.update_profile(&profile).await.unwrap();

        assert!(matches!(
            f.service.create(&f.alice, input(&f, None)).await,
            Err(CommentServiceError::Banned(_))
        ));
    }

    #[tokio::test]
    async fn test_rate_limit() {
        let f = setup_with(CommentsConfig::default()).await;
        f.service.create(&f.alice, input(&f, None)).await.unwrap();
        assert!(matches!(
            f.service.create(&f.alice, input(&f, None)).await,
            Err(CommentServiceError::RateLimited(_))
        ));
        // Other users have their own window
        f.service.create(&f.bob, input(&f, None)).await.unwrap();
    }

    #[tokio::test]
    async fn test_rate_limit_window_opens_on_attempt() {
        let f = setup_with(CommentsConfig::default()).await;
        let mut missing = input(&f, None);
        missing.object_id = 999;
        assert!(matches!(
            f.service.create(&f.alice, missing).await,
            Err(CommentServiceError::TargetNotFound)
        ));
        assert!(matches!(
            f.service.create(&f.alice, input(&f, None)).await,
            Err(CommentServiceError::RateLimited(_))
        ));
    }

    #[tokio::test]
    async fn test_depth_limit_and_parent_object() {
        let f = setup().await;
        let mut parent_id = None;
        // depths 0..=3 are allowed with max_depth 4
        for _ in 0..4 {
            let c = f.service.create(&f.alice, input(&f, parent_id)).await.unwrap();
            parent_id = Some(c.comment.id);
        }
        assert!(matches!(
            f.service.create(&f.alice, input(&f, parent_id)).await,
            Err(CommentServiceError::ValidationError(msg)) if msg.contains("depth")
        ));

        let root = f.service.create(&f.alice, input(&f, None)).await.unwrap();
        let mut elsewhere = input(&f, Some(root.comment.id));
        elsewhere.object_id = f.other_post_id;
        assert!(matches!(
            f.service.create(&f.alice, elsewhere).await,
            Err(CommentServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_spam_and_missing_target_rejected() {
        let f = setup().await;
        let mut spam = input(&f, None);
        spam.comment = "Click here to win the casino lottery https://spam.example".into();
        assert!(matches!(
            f.service.create(&f.alice, spam).await,
            Err(CommentServiceError::ValidationError(_))
        ));

        let mut missing = input(&f, None);
        missing.object_id = 999;
        assert!(matches!(
            f.service.create(&f.alice, missing).await,
            Err(CommentServiceError::TargetNotFound)
        ));
    }

    #[tokio::test]
    async fn test_third_flag_auto_flags_and_duplicates_rejected() {
        let f = setup().await;
        let c = f.service.create(&f.alice, input(&f, None)).await.unwrap();
        let carol = f
            .users
            .create(&User::new("carol".into(), "carol@example.com".into(), String::new()), false)
            .await
            .unwrap();
        let flag = || FlagCommentInput {
            reason: FlagReason::Spam,
            description: String::new(),
        };

        let first = f.service.flag(&f.bob, c.comment.id, flag()).await.unwrap();
        assert_eq!(first, FlagOutcome { flag_count: 1, is_flagged: false });
        assert!(matches!(
            f.service.flag(&f.bob, c.comment.id, flag()).await,
            Err(CommentServiceError::AlreadyFlagged)
        ));
        f.service.flag(&carol, c.comment.id, flag()).await.unwrap();
        let third = f.service.flag(&f.owner, c.comment.id, flag()).await.unwrap();
        assert_eq!(third, FlagOutcome { flag_count: 3, is_flagged: true });
        assert!(f.service.get(c.comment.id).await.unwrap().is_flagged);
    }

    #[tokio::test]
    async fn test_like_toggle_per_user() {
        let f = setup().await;
        let c = f.service.create(&f.alice, input(&f, None)).await.unwrap();

        let on = f.service.toggle_like(&f.bob, c.comment.id).await.unwrap();
        assert_eq!(on, LikeToggle { liked: true, like_count: 1 });
        let other = f.service.toggle_like(&f.owner, c.comment.id).await.unwrap();
        assert_eq!(other.like_count, 2);
        let off = f.service.toggle_like(&f.bob, c.comment.id).await.unwrap();
        assert_eq!(off, LikeToggle { liked: false, like_count: 1 });
    }

    #[tokio::test]
    async fn test_edit_window() {
        let f = setup().await;
        let c = f.service.create(&f.alice, input(&f, None)).await.unwrap();
        let comment = c.comment;

        let later = comment.created_at + ChronoDuration::minutes(16);
        assert!(f.service.check_can_edit(&f.alice, &comment, Utc::now()).is_ok());
        assert!(matches!(
            f.service.check_can_edit(&f.alice, &comment, later),
            Err(CommentServiceError::Forbidden(_))
        ));
        assert!(f.service.check_can_edit(&f.owner, &comment, later).is_ok());
        assert!(f.service.check_can_edit(&f.bob, &comment, Utc::now()).is_err());

        let edited = f
            .service
            .update(
                &f.alice,
                comment.id,
                UpdateCommentInput {
                    comment: "A rewritten but still ordinary comment.".into(),
                },
            )
            .await
            .unwrap();
        assert!(edited.comment.is_edited);
    }

    #[tokio::test]
    async fn test_delete_permissions_and_cascade() {
        let f = setup().await;
        let root = f.service.create(&f.alice, input(&f, None)).await.unwrap();
        let reply = f
            .service
            .create(&f.bob, input(&f, Some(root.comment.id)))
            .await
            .unwrap();

        assert!(matches!(
            f.service.delete(&f.bob, root.comment.id).await,
            Err(CommentServiceError::Forbidden(_))
        ));
        f.service.delete(&f.alice, root.comment.id).await.unwrap();
        assert!(matches!(
            f.service.get(reply.comment.id).await,
            Err(CommentServiceError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_thread_is_cached_and_invalidated() {
        let f = setup().await;
        let root = f.service.create(&f.alice, input(&f, None)).await.unwrap();
        f.service
            .create(&f.bob, input(&f, Some(root.comment.id)))
            .await
            .unwrap();

        let thread = f.service.thread(ContentType::Post, f.post_id).await.unwrap();
        assert_eq!(thread.len(), 1);
        assert_eq!(thread[0].replies.len(), 1);
        assert_eq!(thread[0].replies[0].depth, 1);

        f.service.create(&f.bob, input(&f, None)).await.unwrap();
        let thread = f.service.thread(ContentType::Post, f.post_id).await.unwrap();
        assert_eq!(thread.len(), 2);

        f.service
            .moderate(&f.owner, root.comment.id, ModerationAction::Reject)
            .await
            .unwrap();
        let thread = f.service.thread(ContentType::Post, f.post_id).await.unwrap();
        assert_eq!(thread.len(), 1);
        let stats = f.service.stats(ContentType::Post, f.post_id).await.unwrap();
        assert_eq!(stats.pending_comments, 1);
    }

    #[tokio::test]
    async fn test_reply_and_mention_notifications() {
        let f = setup().await;
        let mut bob_profile = f.users.get_profile(f.bob.id).await.unwrap().unwrap();
        bob_profile.email_on_reply = false;
        f.users.update_profile(&bob_profile).await.unwrap();

        let root = f.service.create(&f.alice, input(&f, None)).await.unwrap();
        f.mailer.clear();

        let mut reply = input(&f, Some(root.comment.id));
        reply.comment = "Replying here, and @bob @bob @nobody should see it.".into();
        f.service.create(&f.owner, reply).await.unwrap();

        let sent = f.mailer.sent();
        let recipients: Vec<&str> = sent.iter().map(|m| m.to[0].as_str()).collect();
        assert!(recipients.contains(&"alice@example.com"));
        assert_eq!(
            recipients.iter().filter(|r| **r == "bob@example.com").count(),
            1
        );
        assert!(sent
            .iter()
            .any(|m| m.subject == "You were mentioned in a comment by owner"));
    }

    #[tokio::test]
    async fn test_search_snippets() {
        let f = setup().await;
        let mut long = input(&f, None);
        long.comment = format!("needle {}", "word ".repeat(40));
        f.service.create(&f.alice, long).await.unwrap();

        assert!(matches!(
            f.service.search("n").await,
            Err(CommentServiceError::ValidationError(_))
        ));
        let hits = f.service.search("needle").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].content.ends_with("..."));
        assert_eq!(hits[0].content.chars().count(), 103);
        assert_eq!(hits[0].object_title, "Hello");
    }

    fn view(id: i64, parent_id: Option<i64>, minutes: i64) -> CommentView {
        let mut comment = Comment::new(ContentType::Post, 1, parent_id, 1, format!("c{}", id));
        comment.id = id;
        comment.created_at = Utc::now() + ChronoDuration::minutes(minutes);
        CommentView {
            comment,
            author: CommentAuthor {
                id: 1,
                username: "u".into(),
                display_name: "u".into(),
                avatar: None,
            },
            like_count: 0,
            flag_count: 0,
        }
    }

    #[test]
    fn test_build_tree_ordering() {
        let views = vec![
            view(1, None, 0),
            view(2, None, 1),
            view(3, Some(1), 2),
            view(4, Some(1), 3),
            view(5, Some(3), 4),
            view(6, Some(99), 5),
        ];
        let tree = build_tree(views);
        assert_eq!(tree.iter().map(|n| n.comment.id).collect::<Vec<_>>(), vec![2, 1]);
        let first = &tree[1];
        assert_eq!(
            first.replies.iter().map(|n| n.comment.id).collect::<Vec<_>>(),
            vec![3, 4]
        );
        assert_eq!(first.replies[0].replies[0].depth, 2);
        assert_eq!(tree.iter().map(CommentNode::count).sum::<usize>(), 5);
    }

    #[test]
    fn test_extract_mentions() {
        assert_eq!(
            extract_mentions("hi @ann and @bob_2, also @ann"),
            vec!["ann".to_string(), "bob_2".to_string()]
        );
        assert!(extract_mentions("email me at nobody").is_empty());
    }
}
