//! Services layer - Business logic
//!
//! Services validate input, enforce the blog's rules and coordinate the
//! repositories. Each one has its own error enum which the API and web layers
//! map onto HTTP statuses.

pub mod analytics;
pub mod comment;
pub mod markdown;
pub mod message;
pub mod password;
pub mod post;
pub mod rate_limiter;
pub mod tag;
pub mod user;

pub use analytics::{AnalyticsService, AnalyticsServiceError};
pub use comment::{CommentService, CommentServiceError};
pub use markdown::MarkdownRenderer;
pub use message::{MessageService, MessageServiceError};
pub use password::{hash_password, verify_password};
pub use post::{PostService, PostServiceError};
pub use rate_limiter::LoginRateLimiter;
pub use tag::{generate_tag_slug, TagService, TagServiceError};
pub use user::{UserService, UserServiceError};
