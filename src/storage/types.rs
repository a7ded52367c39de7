//! Core data types for the bucket store
//!
//! - `Bucket`: immutable snapshot of one minute's counters
//! - `StoredBucket`: a bucket plus the backend's optimistic-concurrency version
//! - `Filter`, `RangeQuery`, `OrderedQuery`, `DeletionQuery`: typed query
//!   parameters handed to a [`BucketBackend`](crate::storage::BucketBackend)

use crate::storage::error::{StoreError, StoreResult};
use crate::storage::key::{truncate_to_minute, BucketKey};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Counters for a single minute
///
/// Fields are private so a snapshot handed to a caller cannot drift from what
/// was persisted. Ordering is by `time` first, which is unique per bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    time: DateTime<Utc>,
    count: i64,
    total_count: i64,
}

impl Bucket {
    /// Create a bucket for the minute containing `time`
    ///
    /// Rejects negative counters. `total_count` is kept as given; chaining it
    /// from the previous bucket is the caller's job.
    pub fn new(time: DateTime<Utc>, count: i64, total_count: i64) -> StoreResult<Self> {
        validate_counts(count, total_count)?;
        Ok(Self {
            time: truncate_to_minute(time)?,
            count,
            total_count,
        })
    }

    /// Minute-truncated instant of this bucket
    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    /// Events recorded within this minute
    pub fn count(&self) -> i64 {
        self.count
    }

    /// Events recorded up to and including this minute
    pub fn total_count(&self) -> i64 {
        self.total_count
    }

    /// Primary key of this bucket
    pub fn key(&self) -> BucketKey {
        BucketKey::from_minute(self.time)
    }

    /// Copy of this bucket with new counters; `time` never changes
    pub fn with_counts(&self, count: i64, total_count: i64) -> StoreResult<Self> {
        validate_counts(count, total_count)?;
        Ok(Self {
            time: self.time,
            count,
            total_count,
        })
    }
}

fn validate_counts(count: i64, total_count: i64) -> StoreResult<()> {
    if count < 0 {
        return Err(StoreError::InvalidArgument(format!(
            "count must be non-negative, got {}",
            count
        )));
    }
    if total_count < 0 {
        return Err(StoreError::InvalidArgument(format!(
            "total_count must be non-negative, got {}",
            total_count
        )));
    }
    Ok(())
}

/// A bucket as held by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredBucket {
    pub bucket: Bucket,
    /// Bumped on every successful write
    pub version: u64,
}

/// Indexed field a filter applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Time,
}

impl Field {
    /// Column name in the SQLite backend
    pub fn column(&self) -> &'static str {
        match self {
            Field::Time => "time",
        }
    }
}

/// Comparison operator for a filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
}

impl Operator {
    pub fn sql(&self) -> &'static str {
        match self {
            Operator::LessThan => "<",
            Operator::LessOrEqual => "<=",
            Operator::GreaterThan => ">",
            Operator::GreaterOrEqual => ">=",
        }
    }
}

/// A single `{field, operator, bound}` predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Filter {
    pub field: Field,
    pub operator: Operator,
    pub bound: DateTime<Utc>,
}

impl Filter {
    pub fn time(operator: Operator, bound: DateTime<Utc>) -> Self {
        Self {
            field: Field::Time,
            operator,
            bound,
        }
    }

    /// Check if a bucket satisfies this predicate
    pub fn matches(&self, bucket: &Bucket) -> bool {
        let value = match self.field {
            Field::Time => bucket.time(),
        };

        match self.operator {
            Operator::LessThan => value < self.bound,
            Operator::LessOrEqual => value <= self.bound,
            Operator::GreaterThan => value > self.bound,
            Operator::GreaterOrEqual => value >= self.bound,
        }
    }
}

/// Half-open scan over the time index: `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeQuery {
    pub lower: Filter,
    pub upper: Filter,
}

impl RangeQuery {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            lower: Filter::time(Operator::GreaterOrEqual, start),
            upper: Filter::time(Operator::LessThan, end),
        }
    }

    pub fn matches(&self, bucket: &Bucket) -> bool {
        self.lower.matches(bucket) && self.upper.matches(bucket)
    }
}

/// Sort direction on the time index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

impl Direction {
    pub fn sql(&self) -> &'static str {
        match self {
            Direction::Ascending => "ASC",
            Direction::Descending => "DESC",
        }
    }
}

/// Filtered, ordered lookup returning at most one bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderedQuery {
    pub filter: Filter,
    pub direction: Direction,
}

impl OrderedQuery {
    /// Latest bucket strictly before `bound`
    pub fn latest_before(bound: DateTime<Utc>) -> Self {
        Self {
            filter: Filter::time(Operator::LessThan, bound),
            direction: Direction::Descending,
        }
    }

    /// Earliest bucket at or after `bound`
    ///
    /// No store operation issues this today; backends still have to answer
    /// ascending lookups because `first_ordered` covers both directions.
    pub fn earliest_from(bound: DateTime<Utc>) -> Self {
        Self {
            filter: Filter::time(Operator::GreaterOrEqual, bound),
            direction: Direction::Ascending,
        }
    }
}

/// Conjunction of filters selecting buckets for bulk deletion
///
/// An empty filter list matches nothing; wiping the store must be spelled out
/// with an explicit predicate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionQuery {
    pub filters: Vec<Filter>,
}

impl DeletionQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buckets strictly older than `time`
    pub fn older_than(time: DateTime<Utc>) -> Self {
        Self::new().filter(Filter::time(Operator::LessThan, time))
    }

    /// Buckets within `[start, end)`
    pub fn within(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        let range = RangeQuery::new(start, end);
        Self::new().filter(range.lower).filter(range.upper)
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn matches(&self, bucket: &Bucket) -> bool {
        !self.filters.is_empty() && self.filters.iter().all(|f| f.matches(bucket))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, m, s).unwrap()
    }

    #[test]
    fn test_bucket_truncates_time() {
        let bucket = Bucket::new(at(10, 2, 45), 5, 8).unwrap();
        assert_eq!(bucket.time(), at(10, 2, 0));
        assert_eq!(bucket.key().as_str(), "2024-03-01T10:02:00Z");
    }

    #[test]
    fn test_bucket_rejects_negative_counts() {
        assert!(matches!(
            Bucket::new(at(10, 0, 0), -1, 3),
            Err(StoreError::InvalidArgument(_))
        ));
        assert!(matches!(
            Bucket::new(at(10, 0, 0), 1, -3),
            Err(StoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_total_count_kept_as_given() {
        // inconsistent chaining is the caller's problem
        let bucket = Bucket::new(at(10, 0, 0), 7, 2).unwrap();
        assert_eq!(bucket.count(), 7);
        assert_eq!(bucket.total_count(), 2);
    }

    #[test]
    fn test_with_counts_keeps_time() {
        let bucket = Bucket::new(at(10, 0, 0), 3, 3).unwrap();
        let updated = bucket.with_counts(4, 9).unwrap();
        assert_eq!(updated.time(), bucket.time());
        assert_eq!(updated.count(), 4);
        assert_eq!(updated.total_count(), 9);
    }

    #[test]
    fn test_bucket_serialization_layout() {
        let bucket = Bucket::new(at(10, 2, 0), 5, 8).unwrap();
        let json = serde_json::to_value(bucket).unwrap();

        assert_eq!(json["count"], 5);
        assert_eq!(json["totalCount"], 8);
        assert_eq!(json["time"], "2024-03-01T10:02:00Z");
    }

    #[test]
    fn test_range_query_is_half_open() {
        let range = RangeQuery::new(at(10, 0, 0), at(10, 3, 0));

        assert!(range.matches(&Bucket::new(at(10, 0, 0), 1, 1).unwrap()));
        assert!(range.matches(&Bucket::new(at(10, 2, 0), 1, 1).unwrap()));
        assert!(!range.matches(&Bucket::new(at(10, 3, 0), 1, 1).unwrap()));
        assert!(!range.matches(&Bucket::new(at(9, 59, 0), 1, 1).unwrap()));
    }

    #[test]
    fn test_deletion_query() {
        let old = Bucket::new(at(9, 0, 0), 1, 1).unwrap();
        let new = Bucket::new(at(11, 0, 0), 1, 2).unwrap();

        let query = DeletionQuery::older_than(at(10, 0, 0));
        assert!(query.matches(&old));
        assert!(!query.matches(&new));

        // Empty query never matches
        assert!(!DeletionQuery::new().matches(&old));
    }
}
