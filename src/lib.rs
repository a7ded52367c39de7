//! # Minutely
//!
//! Minute-granularity time-series counter store. Each one-minute bucket holds
//! the number of events in that minute and the running total up to it.
//!
//! ## Features
//!
//! - **Exactly one bucket per minute**: keys derive from the truncated instant
//! - **Ordered access**: `[start, end)` range scans and nearest-previous lookups
//! - **No lost updates**: count updates use per-record optimistic concurrency
//! - **Pluggable storage**: SQLite for durability, in-memory for tests
//!
//! ## Modules
//!
//! - [`storage`]: Bucket store, backends, and query types
//! - [`config`]: TOML + environment configuration
//! - [`logging`]: Tracing subscriber setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use minutely::{open_store, Bucket, Config};
//! use chrono::{Duration, Utc};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default()?;
//!     let store = open_store(&config.storage)?;
//!
//!     let now = Utc::now();
//!     if !store.exists(now).await? {
//!         store.create(Bucket::new(now, 1, 1)?).await?;
//!     }
//!
//!     let last_hour = store.get_range(now - Duration::hours(1), now + Duration::minutes(1)).await?;
//!     println!("{} buckets in the last hour", last_hour.len());
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod logging;
pub mod storage;

// Re-export top-level types for convenience
pub use storage::{
    derive_key, open_store, Bucket, BucketBackend, BucketKey, BucketStore, DeletionQuery,
    MemoryBackend, SqliteBackend, StorageFailure, StoreError, StoreResult,
};

pub use config::{generate_default_config, BackendKind, Config, ConfigError, LoggingConfig, StorageConfig};
