//! Comment model
//!
//! Comments attach to any content object through a (`content_type`,
//! `object_id`) pair and nest through `parent_id`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of object a comment thread hangs off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Post,
    Page,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Post => "post",
            ContentType::Page => "page",
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ContentType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "post" => Ok(ContentType::Post),
            "page" => Ok(ContentType::Page),
            _ => Err(anyhow::anyhow!("Invalid content type: {}", s)),
        }
    }
}

/// Why a user reported a comment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagReason {
    Spam,
    Abuse,
    Harassment,
    Inappropriate,
    OffTopic,
    Other,
}

impl FlagReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlagReason::Spam => "spam",
            FlagReason::Abuse => "abuse",
            FlagReason::Harassment => "harassment",
            FlagReason::Inappropriate => "inappropriate",
            FlagReason::OffTopic => "off_topic",
            FlagReason::Other => "other",
        }
    }
}

impl std::fmt::Display for FlagReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for FlagReason {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "spam" => Ok(FlagReason::Spam),
            "abuse" => Ok(FlagReason::Abuse),
            "harassment" => Ok(FlagReason::Harassment),
            "inappropriate" => Ok(FlagReason::Inappropriate),
            "off_topic" => Ok(FlagReason::OffTopic),
            "other" => Ok(FlagReason::Other),
            _ => Err(anyhow::anyhow!("Invalid flag reason: {}", s)),
        }
    }
}

/// A stored comment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub content_type: ContentType,
    pub object_id: i64,
    pub parent_id: Option<i64>,
    pub user_id: i64,
    /// Sanitized text
    pub comment: String,
    pub is_edited: bool,
    pub is_approved: bool,
    pub is_flagged: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Comment {
    pub fn new(
        content_type: ContentType,
        object_id: i64,
        parent_id: Option<i64>,
        user_id: i64,
        comment: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            content_type,
            object_id,
            parent_id,
            user_id,
            comment,
            is_edited: false,
            is_approved: true,
            is_flagged: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_reply(&self) -> bool {
        self.parent_id.is_some()
    }

    /// Cache key of the thread this comment belongs to
    pub fn thread_key(&self) -> String {
        thread_cache_key(self.content_type, self.object_id)
    }
}

pub fn thread_cache_key(content_type: ContentType, object_id: i64) -> String {
    format!("comments:{}:{}", content_type, object_id)
}

/// Public view of a comment's author
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentAuthor {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub avatar: Option<String>,
}

/// One node of a rendered comment thread
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentNode {
    pub comment: Comment,
    pub author: CommentAuthor,
    pub depth: u32,
    pub like_count: i64,
    pub replies: Vec<CommentNode>,
}

impl CommentNode {
    /// Number of comments in this subtree, including this one
    pub fn count(&self) -> usize {
        1 + self.replies.iter().map(CommentNode::count).sum::<usize>()
    }
}

/// Comment joined with author and like data, used by list endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentView {
    #[serde(flatten)]
    pub comment: Comment,
    pub author: CommentAuthor,
    pub like_count: i64,
    pub flag_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentFlag {
    pub id: i64,
    pub comment_id: i64,
    pub user_id: i64,
    pub reason: FlagReason,
    pub description: String,
    pub is_reviewed: bool,
    pub created_at: DateTime<Utc>,
}

/// Flag joined with the reporting user's name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlagView {
    #[serde(flatten)]
    pub flag: CommentFlag,
    pub reporter: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentLike {
    pub id: i64,
    pub comment_id: i64,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCommentInput {
    pub content_type: ContentType,
    pub object_id: i64,
    #[serde(default)]
    pub parent_id: Option<i64>,
    pub comment: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateCommentInput {
    pub comment: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlagCommentInput {
    pub reason: FlagReason,
    #[serde(default)]
    pub description: String,
}

/// Moderator decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationAction {
    Approve,
    Reject,
}

/// Moderation queue filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModerationFilter {
    #[default]
    Pending,
    Flagged,
    All,
}

/// Result of toggling a like
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LikeToggle {
    pub liked: bool,
    pub like_count: i64,
}

/// Per-object counters
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommentStats {
    pub total_comments: i64,
    pub approved_comments: i64,
    pub pending_comments: i64,
    pub flagged_comments: i64,
    pub unique_commenters: i64,
}

/// Short search hit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentSearchHit {
    pub id: i64,
    pub content: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub content_type: ContentType,
    pub object_id: i64,
    pub object_title: String,
    pub depth: u32,
    pub is_reply: bool,
}

/// Site-wide engagement figures
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngagementStats {
    pub total_comments: i64,
    pub unique_commenters: i64,
    pub avg_comments_per_user: f64,
    pub reply_percentage: f64,
    pub most_active_commenter: Option<CommenterCount>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommenterCount {
    pub username: String,
    pub count: i64,
}

/// Object with the most comments in a recent window
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrendingObject {
    pub content_type: ContentType,
    pub object_id: i64,
    pub comment_count: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserCommentStats {
    pub total_comments: i64,
    pub total_replies: i64,
    pub comments_received: i64,
    pub avg_comment_length: f64,
    pub most_commented_object: Option<TrendingObject>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentAnalyticsReport {
    pub engagement: EngagementStats,
    pub trending: Vec<TrendingObject>,
    pub top_commenters: Vec<CommenterCount>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_parse() {
        assert_eq!("POST".parse::<ContentType>().unwrap(), ContentType::Post);
        assert_eq!("page".parse::<ContentType>().unwrap(), ContentType::Page);
        assert!("video".parse::<ContentType>().is_err());
    }

    #[test]
    fn test_flag_reason_serde_matches_display() {
        let json = serde_json::to_string(&FlagReason::OffTopic).unwrap();
        assert_eq!(json, "\"off_topic\"");
        assert_eq!(FlagReason::OffTopic.to_string(), "off_topic");
        assert_eq!("off_topic".parse::<FlagReason>().unwrap(), FlagReason::OffTopic);
    }

    #[test]
    fn test_thread_key() {
        let comment = Comment::new(ContentType::Post, 42, None, 1, "hello world!".into());
        assert_eq!(comment.thread_key(), "comments:post:42");
        assert!(comment.is_approved);
        assert!(!comment.is_reply());
    }
}
