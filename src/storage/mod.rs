mod feeds;
mod schema;
mod types;

pub use feeds::delete_invalid_feed;
pub use schema::Database;
pub use types::{DatabaseError, StoredFeed};
