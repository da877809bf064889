//! Notification surface.
//!
//! The pipeline reports newly discovered articles through the [`Notifier`]
//! trait; what "notifying" means is up to the host. The built-in
//! [`LogNotifier`] writes them to the log, which is the whole surface a
//! headless deployment needs.

use std::path::PathBuf;

use crate::storage::Article;

/// One user-facing announcement of a newly discovered article.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub article_id: String,
    /// Locally cached image to attach, when one exists
    pub image: Option<PathBuf>,
}

impl Notification {
    pub fn for_article(article: &Article, image: Option<PathBuf>) -> Self {
        Self {
            title: article.title.clone(),
            article_id: article.id.clone(),
            image,
        }
    }
}

/// Sink for new-article announcements.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification);
}

/// Notifier that emits announcements as log events.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) {
        tracing::info!(
            article_id = %notification.article_id,
            title = %notification.title,
            has_image = notification.image.is_some(),
            "new article"
        );
    }
}
