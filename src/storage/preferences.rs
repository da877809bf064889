use super::schema::Database;
use super::types::StoreError;

/// Feed fetched when the user has not configured one
pub const DEFAULT_FEED_URL: &str = "https://www.engadget.com/rss.xml";

const KEY_FEED_URL: &str = "feed.url";
const KEY_SHOW_IMAGES: &str = "images.show";
const KEY_DOWNLOAD_IMAGES: &str = "images.download_in_background";

/// User-facing settings blob persisted in the preferences table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub feed_url: String,
    pub show_images: bool,
    /// Whether the background refresh also mirrors article images into the
    /// on-disk cache
    pub download_images_in_background: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            feed_url: DEFAULT_FEED_URL.to_string(),
            show_images: true,
            download_images_in_background: true,
        }
    }
}

impl Database {
    // ========================================================================
    // User Preferences Operations
    // ========================================================================

    /// Get a single preference value by key.
    ///
    /// Keys use dotted convention: `feed.url`, `images.show`, etc.
    pub async fn get_preference(&self, key: &str) -> Result<Option<String>, StoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM user_preferences WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(value,)| value))
    }

    /// Set a preference value (UPSERT).
    pub async fn set_preference(&self, key: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO user_preferences (key, value, updated_at)
            VALUES (?, ?, datetime('now'))
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Load the typed settings blob, falling back to defaults for any key
    /// that has never been written. An unreadable boolean falls back to its
    /// default rather than failing the load.
    pub async fn load_settings(&self) -> Result<Settings, StoreError> {
        let defaults = Settings::default();

        let feed_url = self
            .get_preference(KEY_FEED_URL)
            .await?
            .filter(|url| !url.is_empty())
            .unwrap_or(defaults.feed_url);
        let show_images = self
            .get_preference(KEY_SHOW_IMAGES)
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.show_images);
        let download_images_in_background = self
            .get_preference(KEY_DOWNLOAD_IMAGES)
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.download_images_in_background);

        Ok(Settings {
            feed_url,
            show_images,
            download_images_in_background,
        })
    }

    /// Persist the full settings blob.
    pub async fn save_settings(&self, settings: &Settings) -> Result<(), StoreError> {
        self.set_preference(KEY_FEED_URL, &settings.feed_url)
            .await?;
        self.set_preference(KEY_SHOW_IMAGES, &settings.show_images.to_string())
            .await?;
        self.set_preference(
            KEY_DOWNLOAD_IMAGES,
            &settings.download_images_in_background.to_string(),
        )
        .await?;
        Ok(())
    }
}
