//! Database repositories
//!
//! One repository per table group. Each exposes a trait plus an sqlx
//! implementation that dispatches on the pool's driver.

pub mod analytics;
pub mod comment;
pub mod message;
pub mod post;
pub mod session;
pub mod tag;
pub mod user;

pub use analytics::{AnalyticsRepository, DayTotals, SqlxAnalyticsRepository};
pub use comment::{CommentRepository, SqlxCommentRepository};
pub use message::{MessageRepository, SqlxMessageRepository};
pub use post::{PostRepository, PostTags, SqlxPostRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use tag::{SqlxTagRepository, TagRepository};
pub use user::{SqlxUserRepository, UserRepository};
