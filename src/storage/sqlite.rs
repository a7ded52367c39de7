//! SQLite bucket backend
//!
//! One row per minute bucket, keyed by the bucket key, with a B-tree index on
//! the time column for range scans and nearest-previous lookups.
//!
//! # Performance
//! - Point lookup / upsert: O(log n)
//! - Range scan: O(log n + k) where k = results
//! - Previous bucket: O(log n) via `ORDER BY time DESC LIMIT 1`

use crate::storage::backend::BucketBackend;
use crate::storage::error::{BackendResult, StorageFailure};
use crate::storage::key::BucketKey;
use crate::storage::types::{
    Bucket, DeletionQuery, Filter, Operator, OrderedQuery, RangeQuery, StoredBucket,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Raw row: (time millis, count, total_count, version)
type BucketRow = (i64, i64, i64, i64);

/// SQLite-backed bucket table
///
/// The connection lives behind a `std::sync::Mutex` because `Connection` is
/// not `Sync`. The guard is never held across an `.await`.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl SqliteBackend {
    /// Create or open `buckets.db` inside `data_dir`
    pub fn open(data_dir: &Path, busy_timeout: Duration) -> BackendResult<Self> {
        std::fs::create_dir_all(data_dir)?;
        let path = data_dir.join("buckets.db");

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(busy_timeout)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            ",
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS buckets (
                key TEXT PRIMARY KEY,
                time INTEGER NOT NULL,
                count INTEGER NOT NULL,
                total_count INTEGER NOT NULL,
                version INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_buckets_time ON buckets(time)",
            [],
        )?;

        tracing::debug!("Opened bucket database at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Get the database file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Force checkpoint for WAL mode
    pub fn checkpoint(&self) -> BackendResult<()> {
        self.lock()?
            .execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    }

    fn lock(&self) -> BackendResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StorageFailure::Lock(format!("Failed to acquire connection lock: {}", e)))
    }
}

fn decode(row: BucketRow) -> BackendResult<StoredBucket> {
    let (millis, count, total_count, version) = row;
    let time = DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| StorageFailure::Corruption(format!("time out of range: {}", millis)))?;
    let bucket = Bucket::new(time, count, total_count)
        .map_err(|e| StorageFailure::Corruption(e.to_string()))?;

    Ok(StoredBucket {
        bucket,
        version: version as u64,
    })
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<BucketRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

/// Millisecond bound equivalent to `filter` for whole-millisecond column values
fn bound_millis(filter: &Filter) -> i64 {
    let floor = filter.bound.timestamp_millis();
    let has_fraction = filter.bound.timestamp_subsec_nanos() % 1_000_000 != 0;

    match filter.operator {
        Operator::LessThan | Operator::GreaterOrEqual if has_fraction => floor + 1,
        _ => floor,
    }
}

fn predicate(filter: &Filter) -> String {
    format!("{} {} ?", filter.field.column(), filter.operator.sql())
}

#[async_trait]
impl BucketBackend for SqliteBackend {
    async fn get(&self, key: &BucketKey) -> BackendResult<Option<StoredBucket>> {
        let row = {
            let conn = self.lock()?;
            let mut stmt = conn.prepare_cached(
                "SELECT time, count, total_count, version FROM buckets WHERE key = ?1",
            )?;
            let row = stmt.query_row(params![key.as_str()], read_row).optional()?;
            row
        };

        row.map(decode).transpose()
    }

    async fn put(&self, key: &BucketKey, bucket: &Bucket) -> BackendResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO buckets (key, time, count, total_count, version)
             VALUES (?1, ?2, ?3, ?4, 1)
             ON CONFLICT(key) DO UPDATE SET
                count = excluded.count,
                total_count = excluded.total_count,
                version = buckets.version + 1",
            params![
                key.as_str(),
                bucket.time().timestamp_millis(),
                bucket.count(),
                bucket.total_count()
            ],
        )?;
        Ok(())
    }

    async fn insert(&self, key: &BucketKey, bucket: &Bucket) -> BackendResult<bool> {
        let conn = self.lock()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO buckets (key, time, count, total_count, version)
             VALUES (?1, ?2, ?3, ?4, 1)",
            params![
                key.as_str(),
                bucket.time().timestamp_millis(),
                bucket.count(),
                bucket.total_count()
            ],
        )?;
        Ok(inserted == 1)
    }

    async fn compare_and_put(
        &self,
        key: &BucketKey,
        bucket: &Bucket,
        expected_version: u64,
    ) -> BackendResult<bool> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE buckets
             SET count = ?1, total_count = ?2, version = version + 1
             WHERE key = ?3 AND version = ?4",
            params![
                bucket.count(),
                bucket.total_count(),
                key.as_str(),
                expected_version as i64
            ],
        )?;
        Ok(updated == 1)
    }

    async fn range_filter(&self, query: &RangeQuery) -> BackendResult<Vec<StoredBucket>> {
        let rows = {
            let conn = self.lock()?;
            let sql = format!(
                "SELECT time, count, total_count, version FROM buckets WHERE {} AND {}",
                predicate(&query.lower),
                predicate(&query.upper)
            );
            let mut stmt = conn.prepare_cached(&sql)?;
            let rows = stmt.query_map(
                params![bound_millis(&query.lower), bound_millis(&query.upper)],
                read_row,
            )?;
            let collected = rows.collect::<rusqlite::Result<Vec<_>>>()?;
            collected
        };

        rows.into_iter().map(decode).collect()
    }

    async fn first_ordered(&self, query: &OrderedQuery) -> BackendResult<Option<StoredBucket>> {
        let row = {
            let conn = self.lock()?;
            let sql = format!(
                "SELECT time, count, total_count, version FROM buckets
                 WHERE {}
                 ORDER BY {} {}
                 LIMIT 1",
                predicate(&query.filter),
                query.filter.field.column(),
                query.direction.sql()
            );
            let mut stmt = conn.prepare_cached(&sql)?;
            let row = stmt
                .query_row(params![bound_millis(&query.filter)], read_row)
                .optional()?;
            row
        };

        row.map(decode).transpose()
    }

    async fn exists(&self, key: &BucketKey) -> BackendResult<bool> {
        let conn = self.lock()?;
        let exists = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM buckets WHERE key = ?1)",
            params![key.as_str()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    async fn delete_matching(&self, query: &DeletionQuery) -> BackendResult<u64> {
        if query.is_empty() {
            return Ok(0);
        }

        let clause = query
            .filters
            .iter()
            .map(predicate)
            .collect::<Vec<_>>()
            .join(" AND ");
        let bounds: Vec<i64> = query.filters.iter().map(bound_millis).collect();

        let conn = self.lock()?;
        let removed = conn.execute(
            &format!("DELETE FROM buckets WHERE {}", clause),
            params_from_iter(bounds),
        )?;
        Ok(removed as u64)
    }

    async fn count(&self) -> BackendResult<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM buckets", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
