//! Article image caching.

pub mod cache;

pub use cache::{ImageCache, SyncReport};
