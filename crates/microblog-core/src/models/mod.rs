//! Domain records of the microblog.
//!
//! Only [`Post`] implements [`crate::search::Searchable`]; users, messages and
//! notifications never reach the search index.

mod message;
mod notification;
mod post;
mod user;

pub use message::Message;
pub use notification::Notification;
pub use post::Post;
pub use user::User;
