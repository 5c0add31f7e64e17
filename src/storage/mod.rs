mod articles;
mod feeds;
mod schema;
mod search;
mod types;

pub use schema::Database;
pub use types::{Article, Enclosure, Feed, StorageError, TitledLink};
