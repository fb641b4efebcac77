//! Data models
//!
//! Database entities (Post, Tag, Comment, Message, User, Session), the
//! analytics records written by the daily job, and the input types services
//! accept.

mod analytics;
mod comment;
mod message;
mod pagination;
mod post;
mod session;
mod tag;
mod user;

pub use analytics::{DailyRunReport, DailyStat, Dashboard, PostRanking, PostViewStat, TagRanking};
pub use comment::{Comment, CreateCommentInput, ANONYMOUS_AUTHOR};
pub use message::{CreateMessageInput, Message};
pub use pagination::{ListParams, PagedResult};
pub use post::{
    parse_post_date, parse_tag_list, CreatePostInput, Post, PostDetail, PostSummary,
    UpdatePostInput, POST_DATE_FORMAT,
};
pub use session::Session;
pub use tag::{Tag, TagWithCount};
pub use user::{User, UserRole};
