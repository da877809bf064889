use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Storage-layer errors with user-friendly messages.
///
/// A store failure is fatal to the ingestion attempt that triggered it:
/// callers must not continue a compound operation (delete + upsert + prune)
/// past a failed step. Prior store contents remain the last known good state.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another process has the database locked
    #[error("Another instance of newsreel appears to be running. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl StoreError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5): database is locked
        // SQLITE_LOCKED (6): database table is locked
        // SQLITE_CANTOPEN (14): unable to open database file
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return StoreError::InstanceLocked;
        }

        StoreError::Other(err)
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// One feed entry, keyed by the feed-provided GUID.
///
/// String fields are empty when the source feed omitted the tag.
/// Re-ingesting an article with the same `id` overwrites every field
/// (upsert semantics) and never produces a duplicate row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    /// Feed-provided GUID, primary key in the store
    pub id: String,
    pub title: String,
    pub description: String,
    /// `dc:creator` in the source feed
    pub author: String,
    /// Link to the full article
    pub link: String,
    /// URL of the `media:content` entry whose medium contains "image"
    pub image_url: String,
    /// Publication time as unix seconds; ingestion time when the feed's
    /// date string could not be parsed
    pub published: i64,
    /// `category` tags in feed order
    pub keywords: Vec<String>,
}

/// Internal row type for article queries (used by sqlx FromRow).
/// The keywords column holds a JSON array; a corrupt value decodes to
/// an empty list rather than failing the whole query.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ArticleRow {
    pub id: String,
    pub title: String,
    pub description: String,
    pub author: String,
    pub link: String,
    pub image_url: String,
    pub published: i64,
    pub keywords: String,
}

impl ArticleRow {
    pub(crate) fn into_article(self) -> Article {
        let keywords = serde_json::from_str(&self.keywords).unwrap_or_default();
        Article {
            id: self.id,
            title: self.title,
            description: self.description,
            author: self.author,
            link: self.link,
            image_url: self.image_url,
            published: self.published,
            keywords,
        }
    }
}
