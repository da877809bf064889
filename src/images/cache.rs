//! On-disk cache of article images.
//!
//! Files are named by the SHA-256 of their source URL, so a cache entry is
//! a pure function of the article's `image_url`. Synchronizing against the
//! current article set first sweeps orphan files, then downloads whatever
//! referenced images are missing. Individual download failures are logged
//! and counted, never fatal: the cache is an optimization, not a store.

use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use futures::StreamExt;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;

use crate::storage::Article;

/// Outcome of one cache synchronization pass
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub downloaded: usize,
    pub failed: usize,
    pub deleted_orphans: usize,
}

pub struct ImageCache {
    dir: PathBuf,
    client: reqwest::Client,
}

impl ImageCache {
    pub fn new(dir: impl Into<PathBuf>, client: reqwest::Client) -> Self {
        Self {
            dir: dir.into(),
            client,
        }
    }

    /// Cache file path for an image URL
    pub fn path_for(&self, image_url: &str) -> PathBuf {
        let hash = Sha256::digest(image_url.as_bytes());
        self.dir.join(format!("{:x}", hash))
    }

    /// Cached image path for an article, if the file is already on disk
    pub fn cached_image(&self, article: &Article) -> Option<PathBuf> {
        if article.image_url.is_empty() {
            return None;
        }
        let path = self.path_for(&article.image_url);
        path.exists().then_some(path)
    }

    /// Bring the cache in line with the current article set: delete files
    /// no article references, then download missing referenced images.
    pub async fn sync(&self, articles: &[Article]) -> Result<SyncReport> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating image cache dir {}", self.dir.display()))?;

        let mut report = SyncReport::default();

        let referenced: HashSet<OsString> = articles
            .iter()
            .filter(|a| !a.image_url.is_empty())
            .filter_map(|a| self.path_for(&a.image_url).file_name().map(OsString::from))
            .collect();

        report.deleted_orphans = self.sweep_orphans(&referenced).await?;

        for article in articles {
            if article.image_url.is_empty() {
                continue;
            }
            let path = self.path_for(&article.image_url);
            if path.exists() {
                continue;
            }
            match self.download(&article.image_url, &path).await {
                Ok(()) => report.downloaded += 1,
                Err(e) => {
                    tracing::warn!(
                        url = %article.image_url,
                        error = %e,
                        "image download failed"
                    );
                    report.failed += 1;
                }
            }
        }

        tracing::debug!(
            downloaded = report.downloaded,
            failed = report.failed,
            deleted = report.deleted_orphans,
            "image cache synchronized"
        );
        Ok(report)
    }

    async fn sweep_orphans(&self, referenced: &HashSet<OsString>) -> Result<usize> {
        let mut deleted = 0;
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .with_context(|| format!("listing image cache dir {}", self.dir.display()))?;

        while let Some(entry) = entries.next_entry().await? {
            if referenced.contains(&entry.file_name()) {
                continue;
            }
            if let Err(e) = tokio::fs::remove_file(entry.path()).await {
                tracing::warn!(path = %entry.path().display(), error = %e, "orphan delete failed");
            } else {
                deleted += 1;
            }
        }

        Ok(deleted)
    }

    /// Stream one image to disk. Written to a temp name and renamed so a
    /// failed download never leaves a half-written cache entry behind.
    async fn download(&self, url: &str, path: &Path) -> Result<()> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("image request failed")?
            .error_for_status()
            .context("image request returned an error status")?;

        let tmp = path.with_extension("part");
        let mut file = tokio::fs::File::create(&tmp)
            .await
            .with_context(|| format!("creating {}", tmp.display()))?;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    drop(file);
                    let _ = tokio::fs::remove_file(&tmp).await;
                    return Err(e).context("image body read failed");
                }
            };
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, path)
            .await
            .with_context(|| format!("moving {} into place", tmp.display()))?;
        Ok(())
    }
}
