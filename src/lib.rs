//! Core library for the newsreel RSS reader.
//!
//! The ingestion pipeline runs fetch → parse → reconcile-with-store →
//! prune → notify; the modules below map onto those stages:
//!
//! - [`feed`] - HTTP retrieval and the streaming RSS parser
//! - [`storage`] - durable SQLite article cache and user preferences
//! - [`ingest`] - orchestration, novelty diffing, background scheduling
//! - [`images`] - on-disk cache of article images
//! - [`notify`] - notification surface for newly discovered articles

pub mod config;
pub mod feed;
pub mod images;
pub mod ingest;
pub mod notify;
pub mod storage;
