//! Minute bucket store
//!
//! Translates instants into bucket keys, issues typed queries against the
//! injected backend, and hands back immutable [`Bucket`] snapshots.
//!
//! ```text
//! Read path:   instant → derive_key / RangeQuery / OrderedQuery → backend → Bucket
//! Update path: get (bucket + version) → with_counts → compare_and_put(version)
//! Create path: exists(key)? → insert-if-absent
//! ```

use crate::config::{BackendKind, StorageConfig};
use crate::storage::backend::BucketBackend;
use crate::storage::error::{StoreError, StoreResult};
use crate::storage::key::{derive_key, truncate_to_minute, BucketKey};
use crate::storage::memory::MemoryBackend;
use crate::storage::sqlite::SqliteBackend;
use crate::storage::types::{Bucket, DeletionQuery, OrderedQuery, RangeQuery};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// Repository of minute buckets over a shared backend
///
/// Cheap to clone; clones share the backend.
#[derive(Clone)]
pub struct BucketStore {
    backend: Arc<dyn BucketBackend>,
}

impl BucketStore {
    pub fn new(backend: Arc<dyn BucketBackend>) -> Self {
        Self { backend }
    }

    /// Store over a fresh in-memory backend
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// Key of the bucket covering `time`
    pub fn derive_key(time: DateTime<Utc>) -> StoreResult<BucketKey> {
        derive_key(time)
    }

    /// Buckets with `start <= time < end`, ascending by time
    ///
    /// An empty or inverted range yields no buckets.
    pub async fn get_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<Bucket>> {
        if start >= end {
            return Ok(Vec::new());
        }

        let mut buckets: Vec<Bucket> = self
            .backend
            .range_filter(&RangeQuery::new(start, end))
            .await?
            .into_iter()
            .map(|s| s.bucket)
            .collect();

        // Backends make no ordering promise for scans
        buckets.sort_by_key(|b| b.time());

        tracing::debug!("Range [{}, {}) returned {} buckets", start, end, buckets.len());
        Ok(buckets)
    }

    /// Whether a bucket exists for the minute containing `time`
    pub async fn exists(&self, time: DateTime<Utc>) -> StoreResult<bool> {
        let key = derive_key(time)?;
        Ok(self.backend.exists(&key).await?)
    }

    /// Whether the bucket at `time` has a count of exactly one
    ///
    /// Fails with `BucketNotFound` if there is no bucket at `time`.
    pub async fn has_count_of_one(&self, time: DateTime<Utc>) -> StoreResult<bool> {
        let key = derive_key(time)?;
        match self.backend.get(&key).await? {
            Some(stored) => Ok(stored.bucket.count() == 1),
            None => Err(StoreError::BucketNotFound(key)),
        }
    }

    /// Overwrite the counters of an existing bucket
    ///
    /// Never creates. The write only lands if nobody modified the bucket since
    /// it was read; otherwise `ConcurrentModification` is returned and the
    /// caller decides whether to retry. `total_count` is stored as given.
    pub async fn set_count(
        &self,
        time: DateTime<Utc>,
        count: i64,
        total_count: i64,
    ) -> StoreResult<Bucket> {
        let key = derive_key(time)?;
        let stored = self
            .backend
            .get(&key)
            .await?
            .ok_or_else(|| StoreError::BucketNotFound(key.clone()))?;

        let updated = stored.bucket.with_counts(count, total_count)?;
        if !self
            .backend
            .compare_and_put(&key, &updated, stored.version)
            .await?
        {
            tracing::warn!("Concurrent modification of bucket {}", key);
            return Err(StoreError::ConcurrentModification(key));
        }

        tracing::info!(
            "Set bucket {} count={} total_count={}",
            key,
            count,
            total_count
        );
        Ok(updated)
    }

    /// Point lookup; absence is `None`
    pub async fn get_exact(&self, time: DateTime<Utc>) -> StoreResult<Option<Bucket>> {
        let key = derive_key(time)?;
        Ok(self.backend.get(&key).await?.map(|s| s.bucket))
    }

    /// Latest bucket strictly before the minute containing `time`
    ///
    /// Fails with `NoPreviousBucket` when `time` is at or before the earliest
    /// bucket, which is expected for the very first recorded minute.
    pub async fn get_previous_bucket(&self, time: DateTime<Utc>) -> StoreResult<Bucket> {
        let minute = truncate_to_minute(time)?;
        let previous = self
            .backend
            .first_ordered(&OrderedQuery::latest_before(minute))
            .await?
            .map(|s| s.bucket)
            .ok_or(StoreError::NoPreviousBucket(minute))?;

        tracing::info!(
            "Previous bucket before {}: {} total_count={}",
            minute,
            previous.key(),
            previous.total_count()
        );
        Ok(previous)
    }

    /// Create a bucket, refusing if its minute is already taken
    pub async fn create(&self, bucket: Bucket) -> StoreResult<Bucket> {
        let key = bucket.key();
        if self.backend.exists(&key).await? {
            return Err(StoreError::DuplicateBucket(key));
        }

        // A racing creator can still win between the probe and the insert
        if !self.backend.insert(&key, &bucket).await? {
            return Err(StoreError::DuplicateBucket(key));
        }

        tracing::debug!(
            "Created bucket {} count={} total_count={}",
            key,
            bucket.count(),
            bucket.total_count()
        );
        Ok(bucket)
    }

    /// Bulk-delete buckets matching `query`, returning how many were removed
    pub async fn delete_matching(&self, query: &DeletionQuery) -> StoreResult<u64> {
        let removed = self.backend.delete_matching(query).await?;
        tracing::info!("Deleted {} buckets", removed);
        Ok(removed)
    }

    /// Number of stored buckets
    pub async fn len(&self) -> StoreResult<u64> {
        Ok(self.backend.count().await?)
    }

    pub async fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len().await? == 0)
    }
}

/// Build a store over the backend selected in `config`
pub fn open_store(config: &StorageConfig) -> StoreResult<BucketStore> {
    let backend: Arc<dyn BucketBackend> = match config.backend {
        BackendKind::Memory => Arc::new(MemoryBackend::new()),
        BackendKind::Sqlite => Arc::new(SqliteBackend::open(
            &config.data_dir,
            Duration::from_millis(config.busy_timeout_ms),
        )?),
    };

    tracing::info!("Opened {} bucket store", config.backend);
    Ok(BucketStore::new(backend))
}
