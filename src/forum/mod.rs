//! Usage: Board resources (posts, comments, categories) and list presentation helpers.

pub mod author;
pub mod categories;
pub mod comments;
pub mod listing;
pub mod posts;
