//! Bucket key derivation
//!
//! Every instant maps to exactly one minute bucket. The key is the
//! minute-truncated instant rendered as RFC 3339 UTC with second precision,
//! e.g. `2024-03-01T10:02:00Z`. Keys are written and later looked up from
//! independently computed instants, so the rendering must never change.

use crate::storage::error::{StoreError, StoreResult};
use chrono::{DateTime, SecondsFormat, Timelike, Utc};
use std::borrow::Borrow;
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

/// Primary key of a minute bucket
///
/// Compares, orders and hashes by the minute it names, so keys sort in time
/// order for every representable year (the text form does not past 9999).
#[derive(Debug, Clone)]
pub struct BucketKey {
    minute: DateTime<Utc>,
    text: String,
}

impl BucketKey {
    /// Key for an instant already aligned to a minute boundary
    pub(crate) fn from_minute(minute: DateTime<Utc>) -> Self {
        BucketKey {
            minute,
            text: minute.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Start of the minute this key names
    pub fn minute(&self) -> DateTime<Utc> {
        self.minute
    }
}

impl PartialEq for BucketKey {
    fn eq(&self, other: &Self) -> bool {
        self.minute == other.minute
    }
}

impl Eq for BucketKey {}

impl PartialOrd for BucketKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BucketKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.minute.cmp(&other.minute)
    }
}

impl Hash for BucketKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.minute.hash(state);
    }
}

// Lets ordered maps keyed by `BucketKey` be range-scanned with raw instants
impl Borrow<DateTime<Utc>> for BucketKey {
    fn borrow(&self) -> &DateTime<Utc> {
        &self.minute
    }
}

impl std::fmt::Display for BucketKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(&self.text)
    }
}

impl AsRef<str> for BucketKey {
    fn as_ref(&self) -> &str {
        &self.text
    }
}

/// Truncate an instant to the start of its minute
///
/// Works on calendar fields, so it holds across chrono's whole date range.
pub fn truncate_to_minute(time: DateTime<Utc>) -> StoreResult<DateTime<Utc>> {
    time.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .ok_or_else(|| StoreError::InvalidArgument(format!("cannot truncate {}", time)))
}

/// Derive the bucket key for the minute containing `time`
pub fn derive_key(time: DateTime<Utc>) -> StoreResult<BucketKey> {
    Ok(BucketKey::from_minute(truncate_to_minute(time)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_truncate_drops_seconds_and_nanos() {
        let time = Utc
            .with_ymd_and_hms(2024, 3, 1, 10, 2, 30)
            .unwrap()
            .checked_add_signed(chrono::Duration::milliseconds(250))
            .unwrap();

        let minute = truncate_to_minute(time).unwrap();
        assert_eq!(minute, Utc.with_ymd_and_hms(2024, 3, 1, 10, 2, 0).unwrap());
    }

    #[test]
    fn test_key_format() {
        let time = Utc.with_ymd_and_hms(2024, 3, 1, 10, 2, 59).unwrap();
        assert_eq!(derive_key(time).unwrap().as_str(), "2024-03-01T10:02:00Z");
    }

    #[test]
    fn test_same_minute_same_key() {
        let a = Utc.with_ymd_and_hms(2024, 3, 1, 10, 2, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2024, 3, 1, 10, 2, 59).unwrap();
        let c = Utc.with_ymd_and_hms(2024, 3, 1, 10, 3, 0).unwrap();

        assert_eq!(derive_key(a).unwrap(), derive_key(b).unwrap());
        assert_ne!(derive_key(b).unwrap(), derive_key(c).unwrap());
    }

    #[test]
    fn test_pre_epoch_truncates_downward() {
        let time = Utc.with_ymd_and_hms(1969, 12, 31, 23, 59, 30).unwrap();
        assert_eq!(derive_key(time).unwrap().as_str(), "1969-12-31T23:59:00Z");
    }

    #[test]
    fn test_far_past_and_future_instants() {
        let late = Utc.with_ymd_and_hms(2300, 1, 1, 0, 0, 30).unwrap();
        assert_eq!(derive_key(late).unwrap().as_str(), "2300-01-01T00:00:00Z");

        let early = Utc.with_ymd_and_hms(1600, 6, 15, 12, 34, 56).unwrap();
        assert_eq!(derive_key(early).unwrap().as_str(), "1600-06-15T12:34:00Z");
    }

    #[test]
    fn test_keys_order_by_time() {
        let a = derive_key(Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 0).unwrap()).unwrap();
        let b = derive_key(Utc.with_ymd_and_hms(10000, 1, 1, 0, 0, 0).unwrap()).unwrap();

        assert!(a < b);
        assert!(a.as_str() > b.as_str());
    }
}
