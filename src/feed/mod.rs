//! Feed retrieval and parsing.
//!
//! - [`fetcher`] - HTTP retrieval with fixed timeouts, streaming body
//! - [`parser`] - single-pass RSS parser producing [`crate::storage::Article`]s

pub mod fetcher;
pub mod parser;

pub use fetcher::{FeedFetcher, FetchError};
pub use parser::{parse, ParseError};
