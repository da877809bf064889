//! Ingestion pipeline: orchestration, novelty diffing, scheduling.

pub mod coordinator;
pub mod differ;
pub mod scheduler;

pub use coordinator::{
    IngestError, IngestMode, IngestStatus, IngestionCoordinator, RETENTION_DAYS,
};
pub use differ::new_articles;
pub use scheduler::{
    AlwaysReady, BatteryProbe, IngestScheduler, DEFAULT_REFRESH_INTERVAL,
};
