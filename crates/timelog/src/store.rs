//! Named time-series log store.
//!
//! A [`Store`] owns the data file `<name>.db` and the index file
//! `<name>.index` inside the configured data directory.
//!
//! # Write path
//!
//! ```text
//! append_data → AppendLog::append → SparseIndex::append
//! ```
//!
//! # Read path
//!
//! ```text
//! get_data → SparseIndex::get_offsets → RangeScan (fresh handle) → DataScan
//! ```
//!
//! # Ordering
//!
//! Records must be appended in non-decreasing timestamp order. This is not
//! checked; with out-of-order input a query may miss records whose
//! timestamp sorts before an earlier indexed key.

use crate::append_log::AppendLog;
use crate::clock::{Clock, SystemClock};
use crate::config::StoreConfig;
use crate::error::{Result, TimelogError};
use crate::index::SparseIndex;
use crate::record::{validate_payload, Timestamp, ToEpochSeconds};
use crate::scan::{DataFilter, DataScan, RangeScan};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Data file extension.
pub const DATA_EXTENSION: &str = "db";

/// Index file extension.
pub const INDEX_EXTENSION: &str = "index";

/// Handle on one named store.
pub struct Store {
    /// Logical database name.
    name: String,
    /// Configuration the store was opened with.
    config: StoreConfig,
    /// Data file.
    log: AppendLog,
    /// Sparse index over `log`.
    index: SparseIndex,
    /// Source of "now" for appends without an explicit time.
    clock: Arc<dyn Clock>,
}

impl Store {
    /// Opens (or creates) the store `name` under `config.data_dir`.
    ///
    /// The data directory is created if missing, both files are opened,
    /// and the index is replayed before the handle is returned. Index
    /// entries pointing past the end of the data file (index flushed
    /// ahead of data before a crash) are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`TimelogError::InvalidArgument`] if `name` is empty or
    /// contains a path separator, or an I/O error if the files cannot be
    /// opened.
    pub fn open(name: &str, config: StoreConfig) -> Result<Self> {
        validate_name(name)?;
        fs::create_dir_all(&config.data_dir)?;

        let data_path = config.data_dir.join(format!("{name}.{DATA_EXTENSION}"));
        let index_path = config.data_dir.join(format!("{name}.{INDEX_EXTENSION}"));

        let log = AppendLog::open(&data_path, config.write_buffer_size)?;
        let mut index = SparseIndex::open(&index_path, config.index_policy)?;
        let dropped = index.truncate_to_data_len(log.position())?;
        if dropped > 0 {
            warn!("Store {}: index was ahead of data by {} entries", name, dropped);
        }

        debug!(
            "Opened store {} ({} data bytes, {} index entries, {:?})",
            name,
            log.position(),
            index.len(),
            config.index_policy
        );

        Ok(Self {
            name: name.to_string(),
            config,
            log,
            index,
            clock: Arc::new(SystemClock),
        })
    }

    /// Replaces the clock used for appends without an explicit time.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Appends `payload` stamped with `record_time`, or the current time if `None`.
    ///
    /// # Errors
    ///
    /// Returns [`TimelogError::InvalidArgument`] if the payload is empty or
    /// contains `\r` or `\n`. Nothing is written in that case.
    pub fn append_data(
        &mut self,
        payload: &str,
        record_time: Option<DateTime<Utc>>,
    ) -> Result<()> {
        match record_time {
            Some(time) => self.append_at(payload, time),
            None => {
                let now = self.clock.now();
                self.append_at(payload, now)
            }
        }
    }

    /// Appends `payload` stamped with `record_time`.
    ///
    /// If the index write fails after the data write succeeded, the data
    /// record is rolled back so both files agree.
    pub fn append_at(&mut self, payload: &str, record_time: impl ToEpochSeconds) -> Result<()> {
        validate_payload(payload)?;
        let timestamp = record_time.to_epoch_seconds()?;
        let offset = self.log.append(timestamp, payload)?;
        if let Err(e) = self.index.append(timestamp, offset) {
            // A record ahead of every index key would fall outside all brackets.
            if let Err(undo) = self.log.rollback(offset) {
                warn!("Store {}: failed to roll back data record: {}", self.name, undo);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Returns the payloads of records in `[begin_time, end_time]`, in append order.
    ///
    /// If `data_filter` is given, only payloads for which it returns true
    /// are yielded. The filter sees the payload without the timestamp
    /// prefix. Buffered appends on this handle are flushed first so the
    /// scan sees them.
    ///
    /// # Errors
    ///
    /// Returns [`TimelogError::InvalidArgument`] if either bound is not a
    /// valid date/time. I/O errors during the scan are yielded as items.
    pub fn get_data(
        &mut self,
        begin_time: impl ToEpochSeconds,
        end_time: impl ToEpochSeconds,
        data_filter: Option<DataFilter>,
    ) -> Result<DataScan> {
        let records = self.get_records(begin_time, end_time)?;
        Ok(DataScan::new(records, data_filter))
    }

    /// Returns the records in `[begin_time, end_time]` with their timestamps.
    pub fn get_records(
        &mut self,
        begin_time: impl ToEpochSeconds,
        end_time: impl ToEpochSeconds,
    ) -> Result<RangeScan> {
        let begin = begin_time.to_epoch_seconds()?;
        let end = end_time.to_epoch_seconds()?;
        self.scan(begin, end)
    }

    fn scan(&mut self, begin: Timestamp, end: Timestamp) -> Result<RangeScan> {
        if begin > end {
            return Ok(RangeScan::empty());
        }
        self.log.flush()?;

        let bracket = self.index.get_offsets(begin, end);
        RangeScan::open(
            self.log.path(),
            begin,
            end,
            bracket,
            self.config.read_buffer_size,
        )
    }

    /// Pushes buffered data and index writes to the OS.
    pub fn flush(&mut self) -> Result<()> {
        self.log.flush()?;
        self.index.flush()
    }

    /// Flushes and fsyncs both files.
    pub fn sync(&mut self) -> Result<()> {
        self.log.sync()?;
        self.index.sync()
    }

    /// Returns the store name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the configuration the store was opened with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns the sparse index.
    pub fn index(&self) -> &SparseIndex {
        &self.index
    }

    /// Logical size of the data file in bytes, buffered writes included.
    pub fn data_len(&self) -> u64 {
        self.log.position()
    }

    /// Path of the data file.
    pub fn data_path(&self) -> &Path {
        self.log.path()
    }

    /// Path of the index file.
    pub fn index_path(&self) -> &Path {
        self.index.path()
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        // Best effort to flush remaining writes
        if let Err(e) = self.flush() {
            warn!("Failed to flush store {} on drop: {:?}", self.name, e);
        }
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(TimelogError::invalid("store name is empty"));
    }
    if name.contains(|c| c == '/' || c == '\\') || name == "." || name == ".." {
        return Err(TimelogError::invalid(format!(
            "store name {name:?} must be a plain file name"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::config::IndexPolicy;
    use chrono::TimeZone;
    use std::time::{Duration, UNIX_EPOCH};
    use tempfile::TempDir;

    fn create_test_store(policy: IndexPolicy) -> (TempDir, Store) {
        let temp_dir = TempDir::new().unwrap();
        let config = StoreConfig::new(temp_dir.path()).with_index_policy(policy);
        let store = Store::open("test", config).unwrap();
        (temp_dir, store)
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn collect(scan: DataScan) -> Vec<String> {
        scan.map(|r| r.unwrap()).collect()
    }

    #[test]
    fn test_open_creates_files() {
        let temp_dir = TempDir::new().unwrap();
        let data_dir = temp_dir.path().join("nested").join("data");
        let store = Store::open("metrics", StoreConfig::new(&data_dir)).unwrap();

        assert_eq!(store.name(), "metrics");
        assert!(data_dir.join("metrics.db").exists());
        assert!(data_dir.join("metrics.index").exists());
        assert_eq!(store.data_path(), data_dir.join("metrics.db"));
        assert_eq!(store.index_path(), data_dir.join("metrics.index"));
    }

    #[test]
    fn test_open_rejects_bad_names() {
        let temp_dir = TempDir::new().unwrap();
        for name in ["", "a/b", "..", "a\\b"] {
            let err = Store::open(name, StoreConfig::new(temp_dir.path())).err().unwrap();
            assert!(err.is_invalid_argument(), "{name:?}");
        }
    }

    #[test]
    fn test_append_and_query_same_handle() {
        let (_dir, mut store) = create_test_store(IndexPolicy::Dense);
        for (ts, payload) in [(100, "a"), (200, "b"), (300, "c"), (400, "d"), (500, "e")] {
            store.append_data(payload, Some(at(ts))).unwrap();
        }

        let out = collect(store.get_data(at(150), at(350), None).unwrap());
        assert_eq!(out, vec!["b", "c"]);
    }

    #[test]
    fn test_append_uses_clock_when_time_absent() {
        let (_dir, store) = create_test_store(IndexPolicy::Dense);
        let clock = Arc::new(MockClock::with_time(UNIX_EPOCH + Duration::from_secs(1_000)));
        let mut store = store.with_clock(clock.clone());

        store.append_data("first", None).unwrap();
        clock.advance(Duration::from_secs(60));
        store.append_data("second", None).unwrap();

        let records: Vec<_> = store
            .get_records(at(0), at(2_000))
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].timestamp, 1_000);
        assert_eq!(records[1].timestamp, 1_060);
        assert_eq!(records[1].payload, "second");
    }

    #[test]
    fn test_invalid_payload_writes_nothing() {
        let (_dir, mut store) = create_test_store(IndexPolicy::Dense);

        assert!(store
            .append_data("", Some(at(1)))
            .unwrap_err()
            .is_invalid_argument());
        assert!(store
            .append_data("line1\nline2", Some(at(1)))
            .unwrap_err()
            .is_invalid_argument());

        assert_eq!(store.data_len(), 0);
        assert!(store.index().is_empty());
    }

    #[test]
    fn test_reversed_bounds_yield_nothing() {
        let (_dir, mut store) = create_test_store(IndexPolicy::Dense);
        store.append_data("a", Some(at(100))).unwrap();

        assert!(collect(store.get_data(at(200), at(100), None).unwrap()).is_empty());
    }

    #[test]
    fn test_open_drops_index_entries_past_data() {
        let temp_dir = TempDir::new().unwrap();
        let config = StoreConfig::new(temp_dir.path());
        {
            let mut store = Store::open("crash", config.clone()).unwrap();
            store.append_data("a", Some(at(100))).unwrap();
            store.append_data("b", Some(at(200))).unwrap();
        }

        // Simulate the index reaching disk while the last record did not.
        fs::write(temp_dir.path().join("crash.db"), "100 a\n").unwrap();

        let mut store = Store::open("crash", config).unwrap();
        assert_eq!(store.index().len(), 1);

        store.append_data("c", Some(at(300))).unwrap();
        let out = collect(store.get_data(at(0), at(1_000), None).unwrap());
        assert_eq!(out, vec!["a", "c"]);
    }
}
