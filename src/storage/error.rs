//! Bucket store error types
//!
//! Semantic outcomes (missing bucket, no earlier bucket, duplicate minute,
//! lost race) are kept apart from backend failures so callers can branch on
//! them without string matching.

use crate::storage::key::BucketKey;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised by the durable backend itself
#[derive(Error, Debug)]
pub enum StorageFailure {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// SQLite reported an error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Persisted record could not be decoded into a bucket
    #[error("Corrupt record: {0}")]
    Corruption(String),

    /// Lock acquisition failed
    #[error("Lock error: {0}")]
    Lock(String),
}

/// Errors returned by [`BucketStore`](crate::storage::BucketStore) operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// An update or probe addressed a minute with no bucket
    #[error("Bucket not found: {0}")]
    BucketNotFound(BucketKey),

    /// No bucket exists before the given instant
    #[error("No bucket before {0}")]
    NoPreviousBucket(DateTime<Utc>),

    /// Creation attempted for a minute that already has a bucket
    #[error("Bucket already exists: {0}")]
    DuplicateBucket(BucketKey),

    /// The bucket changed between read and write
    #[error("Bucket {0} was modified concurrently")]
    ConcurrentModification(BucketKey),

    /// Negative counts or unrepresentable instants
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Backend failure, surfaced unchanged
    #[error("Storage failure: {0}")]
    StorageFailure(#[from] StorageFailure),
}

impl StoreError {
    /// Whether this is an expected control-flow outcome rather than a failure
    pub fn is_semantic(&self) -> bool {
        !matches!(
            self,
            StoreError::StorageFailure(_) | StoreError::InvalidArgument(_)
        )
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::StorageFailure(StorageFailure::Io(err))
    }
}

/// Result type alias for backend operations
pub type BackendResult<T> = Result<T, StorageFailure>;

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;
