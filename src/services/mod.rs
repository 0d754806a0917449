//! Services layer - Business logic
//!
//! Services sit between the HTTP handlers and the repositories. They are
//! responsible for:
//! - Implementing business rules and validation
//! - Coordinating repositories, the cache and the mailer
//! - Mapping failures onto typed errors

pub mod category;
pub mod comment;
pub mod comment_analytics;
pub mod email;
pub mod homepage;
pub mod image;
pub mod markdown;
pub mod newsletter;
pub mod page;
pub mod password;
pub mod post;
pub mod rate_limiter;
pub mod settings;
pub mod sitemap;
pub mod slug;
pub mod social;
pub mod spam;
pub mod tag;
pub mod user;

pub use category::{CategoryService, CategoryServiceError};
pub use comment::{build_tree, CommentService, CommentServiceError, FlagOutcome};
pub use comment_analytics::CommentAnalyticsService;
pub use email::{create_mailer, Mailer, OutgoingEmail, RecordingMailer, SmtpMailer};
pub use homepage::{ClearScope, HomepageData, HomepageService, WarmReport};
pub use image::{ImageService, ImageServiceError, OptimizeOptions, OptimizeReport};
pub use markdown::MarkdownRenderer;
pub use newsletter::{DispatchReport, NewsletterService};
pub use page::{PageService, PageServiceError, RenderedPage};
pub use password::{hash_password, verify_password};
pub use post::{PostService, PostServiceError};
pub use rate_limiter::{CommentRateLimiter, LoginRateLimiter};
pub use settings::{SettingsService, SettingsServiceError};
pub use sitemap::SitemapService;
pub use slug::generate_slug;
pub use social::{SocialAuthError, SocialAuthService};
pub use tag::{TagService, TagServiceError};
pub use user::{LoginInput, SocialLogin, UserService, UserServiceError};
