use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{Article, ArticleRow, StoreError};

/// Batch size for upserts. 8 columns * 100 rows = 800 bound parameters,
/// under SQLite's 999 parameter limit.
const BATCH_SIZE: usize = 100;

impl Database {
    // ========================================================================
    // Article Mutations
    // ========================================================================

    /// Insert or replace articles by id.
    ///
    /// Every field of an existing row is overwritten by the incoming article
    /// (the feed is authoritative for article content). No rows are deleted;
    /// Full-mode replacement is `delete_all` followed by this call.
    pub async fn upsert_all(&self, articles: &[Article]) -> Result<(), StoreError> {
        if articles.is_empty() {
            return Ok(());
        }

        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        for chunk in articles.chunks(BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "INSERT INTO articles (id, title, description, author, link, image_url, published, keywords) ",
            );

            builder.push_values(chunk, |mut b, article| {
                let keywords =
                    serde_json::to_string(&article.keywords).unwrap_or_else(|_| "[]".to_string());
                b.push_bind(&article.id)
                    .push_bind(&article.title)
                    .push_bind(&article.description)
                    .push_bind(&article.author)
                    .push_bind(&article.link)
                    .push_bind(&article.image_url)
                    .push_bind(article.published)
                    .push_bind(keywords);
            });

            builder.push(
                " ON CONFLICT(id) DO UPDATE SET \
                 title = excluded.title, \
                 description = excluded.description, \
                 author = excluded.author, \
                 link = excluded.link, \
                 image_url = excluded.image_url, \
                 published = excluded.published, \
                 keywords = excluded.keywords",
            );

            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        self.bump_revision();
        Ok(())
    }

    /// Clear every stored article (Full-mode refresh does this before upsert)
    pub async fn delete_all(&self) -> Result<u64, StoreError> {
        let _guard = self.write_lock.lock().await;
        let result = sqlx::query("DELETE FROM articles")
            .execute(&self.pool)
            .await?;
        self.bump_revision();
        Ok(result.rows_affected())
    }

    /// Remove articles published strictly before `cutoff` (unix seconds),
    /// returning the number of rows deleted. Used by Incremental-mode
    /// retention pruning after the upsert.
    pub async fn delete_older_than(&self, cutoff: i64) -> Result<u64, StoreError> {
        let _guard = self.write_lock.lock().await;
        let result = sqlx::query("DELETE FROM articles WHERE published < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        self.bump_revision();
        Ok(result.rows_affected())
    }

    // ========================================================================
    // Article Queries
    // ========================================================================

    /// All articles ordered by publication date descending (presentation
    /// order). Ties break on id for a stable ordering.
    pub async fn get_all(&self) -> Result<Vec<Article>, StoreError> {
        let rows = sqlx::query_as::<_, ArticleRow>(
            r#"
            SELECT id, title, description, author, link, image_url, published, keywords
            FROM articles
            ORDER BY published DESC, id ASC
        "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ArticleRow::into_article).collect())
    }

    /// Unordered snapshot of the store, used for novelty diffing.
    /// Must be taken before any mutation of the current ingestion attempt.
    pub async fn get_all_raw(&self) -> Result<Vec<Article>, StoreError> {
        let rows = sqlx::query_as::<_, ArticleRow>(
            "SELECT id, title, description, author, link, image_url, published, keywords FROM articles",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ArticleRow::into_article).collect())
    }

    /// Number of stored articles
    pub async fn count(&self) -> Result<i64, StoreError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM articles")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    pub async fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.count().await? == 0)
    }
}
