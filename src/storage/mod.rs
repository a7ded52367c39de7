//! Minutely Bucket Storage
//!
//! This module provides the minute-bucket counter store:
//!
//! - **key**: Minute truncation and bucket key derivation
//! - **types**: `Bucket` snapshots and typed query parameters
//! - **backend**: The durable store interface
//! - **memory** / **sqlite**: Backend implementations
//! - **store**: `BucketStore`, the repository callers use
//! - **error**: Error types
//!
//! # Architecture
//!
//! ```text
//! Caller → BucketStore → BucketBackend (SQLite | memory)
//!            │
//!            └─ derive_key(time) = RFC 3339 of the minute
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use minutely::storage::{Bucket, BucketStore, StoreError};
//! use chrono::Utc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), StoreError> {
//!     let store = BucketStore::in_memory();
//!     let now = Utc::now();
//!
//!     let total = match store.get_previous_bucket(now).await {
//!         Ok(prev) => prev.total_count() + 1,
//!         Err(StoreError::NoPreviousBucket(_)) => 1,
//!         Err(e) => return Err(e),
//!     };
//!     store.create(Bucket::new(now, 1, total)?).await?;
//!
//!     assert!(store.has_count_of_one(now).await?);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod key;
pub mod memory;
pub mod sqlite;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use backend::BucketBackend;
pub use error::{BackendResult, StorageFailure, StoreError, StoreResult};
pub use key::{derive_key, truncate_to_minute, BucketKey};
pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;
pub use store::{open_store, BucketStore};
pub use types::{
    Bucket, DeletionQuery, Direction, Field, Filter, Operator, OrderedQuery, RangeQuery,
    StoredBucket,
};
