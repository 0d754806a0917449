//! Data models
//!
//! Plain entity structs mirroring the database tables, plus the input
//! types services accept.

pub mod category;
pub mod comment;
pub mod page;
pub mod post;
pub mod session;
pub mod settings;
pub mod tag;
pub mod user;

pub use category::{
    Category, CategoryPosts, CategoryWithCount, CreateCategoryInput, UpdateCategoryInput,
};
pub use comment::{
    thread_cache_key, Comment, CommentAnalyticsReport, CommentAuthor, CommentFlag, CommentLike,
    CommentNode, CommentSearchHit, CommentStats, CommentView, CommenterCount, ContentType,
    CreateCommentInput, EngagementStats, FlagCommentInput, FlagReason, FlagView, LikeToggle,
    ModerationAction, ModerationFilter, TrendingObject, UpdateCommentInput, UserCommentStats,
};
pub use page::{CreatePageInput, Page, UpdatePageInput};
pub use post::{
    CreatePostInput, ListParams, PagedResult, Post, PostDetail, PostFlagsInput, PostSummary,
    PublishStatus, SeoMeta, UpdatePostInput,
};
pub use session::{Session, SESSION_LIFETIME_DAYS};
pub use settings::{
    CreateSocialLinkInput, SiteSettings, SocialLink, UpdateSettingsInput, UpdateSocialLinkInput,
};
pub use tag::{Tag, TagWithCount};
pub use user::{
    CreateUserInput, Profile, SocialAccount, SocialIdentity, UpdateProfileInput, UpdateUserInput,
    User,
};
