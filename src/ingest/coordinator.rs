//! Ingestion orchestration.
//!
//! One coordinator instance per application session owns the store and the
//! fetcher and funnels every trigger path (user refresh, app start, periodic
//! background tick) through a single-flight, latest-wins pipeline.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};

use crate::feed::{parser, FeedFetcher, FetchError, ParseError};
use crate::ingest::differ;
use crate::storage::{Article, Database, StoreError};

/// Articles published more than this many days ago are pruned during
/// Incremental-mode ingestion
pub const RETENTION_DAYS: i64 = 5;

// ============================================================================
// Types
// ============================================================================

/// How an ingestion reconciles the fetched articles with the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestMode {
    /// Clear-then-replace: cold start, or the feed source URL changed
    Full,
    /// Upsert then prune by age: periodic background refresh
    Incremental,
}

/// Observable outcome of the ingestion pipeline.
///
/// `Success` deliberately carries no article payload: the store is the
/// source of truth and consumers re-read it (its revision channel signals
/// the change), so article data and error text are never populated at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestStatus {
    /// Nothing in flight; previously cached store contents are servable
    Cached,
    Loading,
    Success,
    Error { message: String, cause: String },
}

/// Everything that can sink an ingestion attempt.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IngestError {
    /// Short, user-facing description; the cause keeps the detail
    fn describe(&self, url: &str) -> String {
        match self {
            IngestError::Fetch(FetchError::InvalidUrl { .. }) => {
                format!("Cannot fetch from {}", url)
            }
            IngestError::Fetch(_) => "Error occurred while fetching.".to_string(),
            IngestError::Parse(_) => "Error occurred while parsing.".to_string(),
            IngestError::Store(_) => "Error occurred while saving.".to_string(),
        }
    }
}

// ============================================================================
// Coordinator
// ============================================================================

/// Orchestrates fetch → parse → reconcile → prune → notify.
///
/// Concurrency: at most one ingestion is effective at a time. Every call
/// takes a generation ticket; a call that has been superseded while its
/// fetch was in flight neither mutates the store nor publishes a final
/// status (latest wins). The store phase additionally runs under a mutex so
/// compound store operations from overlapping attempts never interleave.
pub struct IngestionCoordinator {
    db: Database,
    fetcher: FeedFetcher,
    status: watch::Sender<IngestStatus>,
    generation: AtomicU64,
    store_phase: Mutex<()>,
    /// Side channel carrying newly discovered articles to the notification
    /// collaborator; not part of the published status
    discoveries: Option<mpsc::Sender<Vec<Article>>>,
}

impl IngestionCoordinator {
    /// Create a coordinator in the `Cached` state so the UI can show
    /// previously stored articles immediately, before any fetch completes.
    pub fn new(db: Database, fetcher: FeedFetcher) -> Self {
        let (status, _) = watch::channel(IngestStatus::Cached);
        Self {
            db,
            fetcher,
            status,
            generation: AtomicU64::new(0),
            store_phase: Mutex::new(()),
            discoveries: None,
        }
    }

    /// Attach the channel that receives newly discovered articles
    pub fn with_discoveries(mut self, tx: mpsc::Sender<Vec<Article>>) -> Self {
        self.discoveries = Some(tx);
        self
    }

    /// Subscribe to ingestion status changes
    pub fn subscribe(&self) -> watch::Receiver<IngestStatus> {
        self.status.subscribe()
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Run one ingestion attempt.
    ///
    /// Publishes `Loading`, then exactly one of `Success` or `Error` --
    /// unless a newer call supersedes this one, in which case this attempt
    /// goes silent and leaves both the store and the status to the newer
    /// call. Fetch and parse failures leave the store untouched; a store
    /// failure aborts mid-pipeline with prior contents still servable.
    pub async fn ingest(&self, url: &str, mode: IngestMode) {
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.publish(ticket, IngestStatus::Loading);
        tracing::info!(url = %url, mode = ?mode, "starting ingest");

        match self.run(ticket, url, mode).await {
            Ok(Some(fresh)) => {
                self.publish(ticket, IngestStatus::Success);
                if !fresh.is_empty() {
                    if let Some(tx) = &self.discoveries {
                        if tx.send(fresh).await.is_err() {
                            tracing::debug!("discovery channel closed, dropping notifications");
                        }
                    }
                }
            }
            Ok(None) => {
                tracing::debug!(url = %url, "ingest superseded by a newer request");
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "ingest failed");
                self.publish(
                    ticket,
                    IngestStatus::Error {
                        message: e.describe(url),
                        cause: e.to_string(),
                    },
                );
            }
        }
    }

    async fn run(
        &self,
        ticket: u64,
        url: &str,
        mode: IngestMode,
    ) -> Result<Option<Vec<Article>>, IngestError> {
        let stream = self.fetcher.fetch(url).await?;
        let articles = parser::parse(stream).await?;

        // Store phase: serialized, and only for the latest request
        let _guard = self.store_phase.lock().await;
        if !self.is_current(ticket) {
            return Ok(None);
        }

        // Snapshot before any mutation; this is what novelty is measured
        // against
        let prior = self.db.get_all_raw().await?;

        if mode == IngestMode::Full {
            let cleared = self.db.delete_all().await?;
            tracing::debug!(cleared = cleared, "full refresh cleared store");
        }

        self.db.upsert_all(&articles).await?;

        if mode == IngestMode::Incremental {
            let cutoff = (Utc::now() - chrono::Duration::days(RETENTION_DAYS)).timestamp();
            let pruned = self.db.delete_older_than(cutoff).await?;
            if pruned > 0 {
                tracing::info!(pruned = pruned, "retention prune removed stale articles");
            }
        }

        let fresh: Vec<Article> = differ::new_articles(&articles, &prior)
            .into_iter()
            .cloned()
            .collect();

        tracing::info!(
            fetched = articles.len(),
            new = fresh.len(),
            "ingest complete"
        );
        Ok(Some(fresh))
    }

    fn is_current(&self, ticket: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket
    }

    /// Publish a status change, unless this attempt has been superseded
    fn publish(&self, ticket: u64, status: IngestStatus) {
        if self.is_current(ticket) {
            // Receivers may all be gone (e.g. headless run); that is fine
            let _ = self.status.send(status);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
