mod articles;
mod preferences;
mod schema;
mod types;

pub use preferences::{Settings, DEFAULT_FEED_URL};
pub use schema::Database;
pub use types::{Article, StoreError};
