//! In-memory bucket backend
//!
//! Backed by a `BTreeMap` behind a Tokio `RwLock`. Nothing survives the
//! process; used for tests and throwaway runs.

use crate::storage::backend::BucketBackend;
use crate::storage::error::BackendResult;
use crate::storage::key::BucketKey;
use crate::storage::types::{
    Bucket, DeletionQuery, Direction, Filter, Operator, OrderedQuery, RangeQuery, StoredBucket,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::ops::Bound;
use tokio::sync::RwLock;

type Span = (Bound<DateTime<Utc>>, Bound<DateTime<Utc>>);

#[derive(Default)]
pub struct MemoryBackend {
    buckets: RwLock<BTreeMap<BucketKey, StoredBucket>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Key span selected by a single filter
fn span(filter: &Filter) -> Span {
    match filter.operator {
        Operator::LessThan => (Bound::Unbounded, Bound::Excluded(filter.bound)),
        Operator::LessOrEqual => (Bound::Unbounded, Bound::Included(filter.bound)),
        Operator::GreaterThan => (Bound::Excluded(filter.bound), Bound::Unbounded),
        Operator::GreaterOrEqual => (Bound::Included(filter.bound), Bound::Unbounded),
    }
}

/// Intersection of the spans of a range's two filters, or `None` if empty
///
/// `BTreeMap::range` panics on an inverted span, so those are caught here.
fn range_span(query: &RangeQuery) -> Option<Span> {
    let (lower_start, lower_end) = span(&query.lower);
    let (upper_start, upper_end) = span(&query.upper);
    let start = tighter(lower_start, upper_start, true);
    let end = tighter(lower_end, upper_end, false);

    let empty = match (&start, &end) {
        (Bound::Included(s) | Bound::Excluded(s), Bound::Included(e) | Bound::Excluded(e)) => {
            s > e || (s == e && !matches!((&start, &end), (Bound::Included(_), Bound::Included(_))))
        }
        _ => false,
    };

    (!empty).then_some((start, end))
}

fn tighter(a: Bound<DateTime<Utc>>, b: Bound<DateTime<Utc>>, lower: bool) -> Bound<DateTime<Utc>> {
    let value = |bound: &Bound<DateTime<Utc>>| match bound {
        Bound::Included(t) | Bound::Excluded(t) => Some(*t),
        Bound::Unbounded => None,
    };

    match (value(&a), value(&b)) {
        (None, _) => b,
        (_, None) => a,
        (Some(x), Some(y)) if x == y => {
            if matches!(a, Bound::Excluded(_)) {
                a
            } else {
                b
            }
        }
        (Some(x), Some(y)) => {
            if (x > y) == lower {
                a
            } else {
                b
            }
        }
    }
}

#[async_trait]
impl BucketBackend for MemoryBackend {
    async fn get(&self, key: &BucketKey) -> BackendResult<Option<StoredBucket>> {
        Ok(self.buckets.read().await.get(key).copied())
    }

    async fn put(&self, key: &BucketKey, bucket: &Bucket) -> BackendResult<()> {
        let mut buckets = self.buckets.write().await;
        let version = buckets.get(key).map(|s| s.version + 1).unwrap_or(1);
        buckets.insert(
            key.clone(),
            StoredBucket {
                bucket: *bucket,
                version,
            },
        );
        Ok(())
    }

    async fn insert(&self, key: &BucketKey, bucket: &Bucket) -> BackendResult<bool> {
        let mut buckets = self.buckets.write().await;
        if buckets.contains_key(key) {
            return Ok(false);
        }
        buckets.insert(
            key.clone(),
            StoredBucket {
                bucket: *bucket,
                version: 1,
            },
        );
        Ok(true)
    }

    async fn compare_and_put(
        &self,
        key: &BucketKey,
        bucket: &Bucket,
        expected_version: u64,
    ) -> BackendResult<bool> {
        let mut buckets = self.buckets.write().await;
        match buckets.get_mut(key) {
            Some(stored) if stored.version == expected_version => {
                stored.bucket = *bucket;
                stored.version += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn range_filter(&self, query: &RangeQuery) -> BackendResult<Vec<StoredBucket>> {
        let Some(span) = range_span(query) else {
            return Ok(Vec::new());
        };

        let buckets = self.buckets.read().await;
        Ok(buckets
            .range::<DateTime<Utc>, _>(span)
            .map(|(_, s)| *s)
            .collect())
    }

    async fn first_ordered(&self, query: &OrderedQuery) -> BackendResult<Option<StoredBucket>> {
        let buckets = self.buckets.read().await;
        let mut candidates = buckets.range::<DateTime<Utc>, _>(span(&query.filter));

        let first = match query.direction {
            Direction::Ascending => candidates.next(),
            Direction::Descending => candidates.next_back(),
        };
        Ok(first.map(|(_, s)| *s))
    }

    async fn exists(&self, key: &BucketKey) -> BackendResult<bool> {
        Ok(self.buckets.read().await.contains_key(key))
    }

    async fn delete_matching(&self, query: &DeletionQuery) -> BackendResult<u64> {
        let mut buckets = self.buckets.write().await;
        let before = buckets.len();
        buckets.retain(|_, s| !query.matches(&s.bucket));
        Ok((before - buckets.len()) as u64)
    }

    async fn count(&self) -> BackendResult<u64> {
        Ok(self.buckets.read().await.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn bucket(m: u32, count: i64, total: i64) -> Bucket {
        Bucket::new(Utc.with_ymd_and_hms(2024, 3, 1, 10, m, 0).unwrap(), count, total).unwrap()
    }

    #[tokio::test]
    async fn test_versions_bump_on_write() {
        let backend = MemoryBackend::new();
        let b = bucket(0, 1, 1);

        assert!(backend.insert(&b.key(), &b).await.unwrap());
        assert_eq!(backend.get(&b.key()).await.unwrap().unwrap().version, 1);

        backend.put(&b.key(), &b.with_counts(2, 2).unwrap()).await.unwrap();
        assert_eq!(backend.get(&b.key()).await.unwrap().unwrap().version, 2);
    }

    #[tokio::test]
    async fn test_insert_refuses_existing_key() {
        let backend = MemoryBackend::new();
        let b = bucket(0, 1, 1);

        assert!(backend.insert(&b.key(), &b).await.unwrap());
        assert!(!backend.insert(&b.key(), &b.with_counts(9, 9).unwrap()).await.unwrap());

        let stored = backend.get(&b.key()).await.unwrap().unwrap();
        assert_eq!(stored.bucket.count(), 1);
    }

    #[tokio::test]
    async fn test_compare_and_put_rejects_stale_version() {
        let backend = MemoryBackend::new();
        let b = bucket(0, 1, 1);
        backend.insert(&b.key(), &b).await.unwrap();

        assert!(backend
            .compare_and_put(&b.key(), &b.with_counts(2, 2).unwrap(), 1)
            .await
            .unwrap());
        assert!(!backend
            .compare_and_put(&b.key(), &b.with_counts(3, 3).unwrap(), 1)
            .await
            .unwrap());

        let stored = backend.get(&b.key()).await.unwrap().unwrap();
        assert_eq!(stored.bucket.count(), 2);
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn test_first_ordered_both_directions() {
        let backend = MemoryBackend::new();
        for b in [bucket(0, 1, 1), bucket(2, 1, 2), bucket(5, 1, 3)] {
            backend.insert(&b.key(), &b).await.unwrap();
        }

        let bound = Utc.with_ymd_and_hms(2024, 3, 1, 10, 5, 0).unwrap();
        let latest = backend
            .first_ordered(&OrderedQuery::latest_before(bound))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.bucket, bucket(2, 1, 2));

        let bound = Utc.with_ymd_and_hms(2024, 3, 1, 10, 1, 0).unwrap();
        let earliest = backend
            .first_ordered(&OrderedQuery::earliest_from(bound))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(earliest.bucket, bucket(2, 1, 2));

        let bound = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        assert!(backend
            .first_ordered(&OrderedQuery::latest_before(bound))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_range_filter_bounds() {
        let backend = MemoryBackend::new();
        for b in [bucket(0, 1, 1), bucket(2, 1, 2), bucket(5, 1, 3)] {
            backend.insert(&b.key(), &b).await.unwrap();
        }
        let t = |m| Utc.with_ymd_and_hms(2024, 3, 1, 10, m, 0).unwrap();

        let found = backend.range_filter(&RangeQuery::new(t(0), t(5))).await.unwrap();
        let found: Vec<Bucket> = found.into_iter().map(|s| s.bucket).collect();
        assert_eq!(found, vec![bucket(0, 1, 1), bucket(2, 1, 2)]);

        // Off-minute bounds still select by bucket time
        let start = t(1) + chrono::Duration::seconds(30);
        let found = backend.range_filter(&RangeQuery::new(start, t(6))).await.unwrap();
        assert_eq!(found.len(), 2);

        // Empty and inverted spans are empty, not a panic
        assert!(backend.range_filter(&RangeQuery::new(t(2), t(2))).await.unwrap().is_empty());
        assert!(backend.range_filter(&RangeQuery::new(t(5), t(0))).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_matching() {
        let backend = MemoryBackend::new();
        for b in [bucket(0, 1, 1), bucket(2, 1, 2), bucket(5, 1, 3)] {
            backend.insert(&b.key(), &b).await.unwrap();
        }

        let cutoff = Utc.with_ymd_and_hms(2024, 3, 1, 10, 3, 0).unwrap();
        let removed = backend
            .delete_matching(&DeletionQuery::older_than(cutoff))
            .await
            .unwrap();

        assert_eq!(removed, 2);
        assert_eq!(backend.count().await.unwrap(), 1);
        assert_eq!(backend.delete_matching(&DeletionQuery::new()).await.unwrap(), 0);
    }
}
