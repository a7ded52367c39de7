//! Durable store interface
//!
//! The bucket store never talks to a database directly. It issues typed
//! queries against a [`BucketBackend`], which is injected at construction.
//! Implementations must be safe to share across tasks.

use crate::storage::error::BackendResult;
use crate::storage::key::BucketKey;
use crate::storage::types::{Bucket, DeletionQuery, OrderedQuery, RangeQuery, StoredBucket};
use async_trait::async_trait;

/// Ordered key-value store holding minute buckets
///
/// Every write bumps the record's version. `compare_and_put` is the single-key
/// optimistic-concurrency primitive used for read-modify-write updates.
#[async_trait]
pub trait BucketBackend: Send + Sync {
    /// Point lookup by primary key
    async fn get(&self, key: &BucketKey) -> BackendResult<Option<StoredBucket>>;

    /// Create or overwrite unconditionally
    async fn put(&self, key: &BucketKey, bucket: &Bucket) -> BackendResult<()>;

    /// Insert only if `key` is absent; returns false if it already exists
    async fn insert(&self, key: &BucketKey, bucket: &Bucket) -> BackendResult<bool>;

    /// Overwrite only if the stored version still equals `expected_version`
    ///
    /// Returns false if the record is missing or was modified since it was read.
    async fn compare_and_put(
        &self,
        key: &BucketKey,
        bucket: &Bucket,
        expected_version: u64,
    ) -> BackendResult<bool>;

    /// All buckets matching the range, in no particular order
    async fn range_filter(&self, query: &RangeQuery) -> BackendResult<Vec<StoredBucket>>;

    /// First bucket matching the filter in the requested order
    async fn first_ordered(&self, query: &OrderedQuery) -> BackendResult<Option<StoredBucket>>;

    /// Key existence probe
    async fn exists(&self, key: &BucketKey) -> BackendResult<bool>;

    /// Remove every bucket matching the query, returning how many were removed
    async fn delete_matching(&self, query: &DeletionQuery) -> BackendResult<u64>;

    /// Number of stored buckets
    async fn count(&self) -> BackendResult<u64>;
}
