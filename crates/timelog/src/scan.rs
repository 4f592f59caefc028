//! Range scans over the data file.
//!
//! A scan starts at the left offset of the index bracket and reads forward
//! line by line on its own file handle. The right offset only sets a byte
//! budget: the scan stops once the budget is spent *and* a record past
//! `end` is seen, so an under-estimated bracket never cuts results short.
//!
//! Scans are lazy, single-pass, and bounded by the file length observed
//! when the scan was opened. The file handle is released as soon as the
//! scan ends, fails, or is dropped.

use crate::error::Result;
use crate::record::{leading_timestamp, strip_terminator, Record, Timestamp};
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Take};
use std::iter::FusedIterator;
use std::path::Path;
use tracing::debug;

/// Predicate over record payloads used to filter [`DataScan`] output.
pub type DataFilter = Box<dyn FnMut(&str) -> bool>;

/// Lazy iterator over the records of a time range.
pub struct RangeScan {
    /// Read handle, `None` once the scan has ended.
    reader: Option<Take<BufReader<File>>>,
    /// Inclusive lower bound.
    begin: Timestamp,
    /// Inclusive upper bound.
    end: Timestamp,
    /// Bytes the index bracket expects the scan to cover.
    budget: u64,
    /// Bytes consumed so far.
    bytes_read: u64,
    /// Whether a record at or after `begin` has been reached.
    found_begin: bool,
    /// Line buffer reused across reads.
    buf: Vec<u8>,
}

impl RangeScan {
    /// Opens a scan of `path` for records in `[begin, end]`.
    ///
    /// `bracket` is the `(begin_offset, end_offset)` pair from
    /// [`SparseIndex::get_offsets`](crate::SparseIndex::get_offsets).
    pub fn open(
        path: &Path,
        begin: Timestamp,
        end: Timestamp,
        bracket: (u64, u64),
        read_buffer_size: usize,
    ) -> Result<Self> {
        let (begin_offset, end_offset) = bracket;
        let mut file = File::open(path)?;
        let file_len = file.metadata()?.len();
        file.seek(SeekFrom::Start(begin_offset))?;
        let reader = BufReader::with_capacity(read_buffer_size.max(1), file)
            .take(file_len.saturating_sub(begin_offset));

        debug!(
            "Scanning {} for [{}, {}] from offset {} (budget {} bytes, file {} bytes)",
            path.display(),
            begin,
            end,
            begin_offset,
            end_offset.saturating_sub(begin_offset),
            file_len
        );

        Ok(Self {
            reader: Some(reader),
            begin,
            end,
            budget: end_offset.saturating_sub(begin_offset),
            bytes_read: 0,
            found_begin: false,
            buf: Vec::new(),
        })
    }

    /// A scan that yields nothing.
    pub fn empty() -> Self {
        Self {
            reader: None,
            begin: 0,
            end: -1,
            budget: 0,
            bytes_read: 0,
            found_begin: false,
            buf: Vec::new(),
        }
    }

    /// Bytes read from the data file so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Reads the next complete line into `buf`. Returns false at end of input.
    fn read_line(&mut self) -> Result<bool> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(false);
        };
        self.buf.clear();
        let n = reader.read_until(b'\n', &mut self.buf)?;
        self.bytes_read += n as u64;
        Ok(n > 0)
    }

    fn finish(&mut self) {
        self.reader = None;
    }
}

impl Iterator for RangeScan {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.read_line() {
                Ok(true) => {}
                Ok(false) => {
                    self.finish();
                    return None;
                }
                Err(e) => {
                    self.finish();
                    return Some(Err(e));
                }
            }

            let Some(line) = std::str::from_utf8(&self.buf)
                .ok()
                .and_then(strip_terminator)
            else {
                debug!("Skipping unterminated or non-UTF-8 data line");
                continue;
            };
            let Some(ts) = leading_timestamp(line) else {
                debug!("Skipping data line without timestamp: {:?}", line);
                continue;
            };

            if !self.found_begin {
                if ts < self.begin {
                    continue;
                }
                self.found_begin = true;
            }
            if self.bytes_read >= self.budget && ts > self.end {
                self.finish();
                return None;
            }
            // Out-of-order records inside the bracket are trimmed, not yielded.
            if ts < self.begin || ts > self.end {
                continue;
            }

            match Record::parse_line(line) {
                Ok(record) => return Some(Ok(record)),
                Err(e) => debug!("Skipping data line: {}", e),
            }
        }
    }
}

impl FusedIterator for RangeScan {}

/// Lazy iterator over the payloads of a time range, optionally filtered.
pub struct DataScan {
    records: RangeScan,
    filter: Option<DataFilter>,
}

impl DataScan {
    pub(crate) fn new(records: RangeScan, filter: Option<DataFilter>) -> Self {
        Self { records, filter }
    }
}

impl Iterator for DataScan {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let record = match self.records.next()? {
                Ok(record) => record,
                Err(e) => return Some(Err(e)),
            };
            let keep = match self.filter.as_mut() {
                Some(filter) => filter(&record.payload),
                None => true,
            };
            if keep {
                return Some(Ok(record.payload));
            }
        }
    }
}

impl FusedIterator for DataScan {}
