//! Sparse time index over the data file.
//!
//! The index maps sampled record timestamps to the byte offset at which the
//! record starts in the data file. It lives in memory as two parallel
//! vectors and is mirrored to a text file, one entry per line:
//!
//! ```text
//! <epoch-seconds> <byte-offset>\n
//! ```
//!
//! The index only brackets a query. [`SparseIndex::get_offsets`] returns a
//! byte range that starts at or before the first matching record; the scan
//! in [`crate::scan`] re-checks every record against the real bounds.
//!
//! Keys are sorted only if records were appended in non-decreasing
//! timestamp order. That ordering is the caller's responsibility.

use crate::config::IndexPolicy;
use crate::error::{Result, TimelogError};
use crate::file::open_for_append;
use crate::record::{strip_terminator, Timestamp, LINE_TERMINATOR};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A single persisted index entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Timestamp of the sampled record.
    pub key: Timestamp,
    /// Byte offset of the sampled record in the data file.
    pub offset: u64,
}

impl IndexEntry {
    /// Parses one index line with the terminator already stripped.
    ///
    /// A well-formed line has exactly two whitespace-separated tokens.
    pub fn parse_line(line: &str) -> Result<Self> {
        let mut tokens = line.split_whitespace();
        let (Some(key), Some(offset), None) = (tokens.next(), tokens.next(), tokens.next()) else {
            return Err(TimelogError::malformed(line, "expected exactly two tokens"));
        };
        let key = key
            .parse()
            .map_err(|_| TimelogError::malformed(line, "key is not an integer"))?;
        let offset = offset
            .parse()
            .map_err(|_| TimelogError::malformed(line, "offset is not an unsigned integer"))?;
        Ok(Self { key, offset })
    }

    /// Writes the entry with a single `write_all`, so a buffered writer
    /// either takes the whole line or none of it.
    fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let line = format!("{} {}{}", self.key, self.offset, LINE_TERMINATOR);
        writer.write_all(line.as_bytes())?;
        Ok(())
    }
}

/// In-memory sparse index backed by an append-only index file.
pub struct SparseIndex {
    /// Path of the index file.
    path: PathBuf,
    /// Append handle on the index file.
    writer: BufWriter<File>,
    /// Sampled keys, index-aligned with `offsets`.
    keys: Vec<Timestamp>,
    /// Data file offsets of the sampled records.
    offsets: Vec<u64>,
    /// Sampling policy.
    policy: IndexPolicy,
    /// Appends seen since open, sampled or not.
    append_count: u64,
}

impl SparseIndex {
    /// Opens (or creates) the index file at `path` and replays it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created, read, or repaired.
    /// Malformed lines are not errors; they are skipped.
    pub fn open(path: impl AsRef<Path>, policy: IndexPolicy) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = open_for_append(&path)?;

        let mut index = Self {
            path,
            writer: BufWriter::new(file),
            keys: Vec::new(),
            offsets: Vec::new(),
            policy,
            append_count: 0,
        };
        index.load()?;
        Ok(index)
    }

    /// Replays the index file from the start into memory.
    ///
    /// Any previously loaded state is replaced. Lines that do not parse as
    /// exactly two tokens, or that lack a terminator, are dropped silently.
    pub fn load(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.keys.clear();
        self.offsets.clear();

        let mut reader = BufReader::new(File::open(&self.path)?);
        let mut buf = Vec::new();
        let mut skipped = 0usize;

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            let parsed = std::str::from_utf8(&buf)
                .ok()
                .and_then(strip_terminator)
                .map(IndexEntry::parse_line);
            match parsed {
                Some(Ok(entry)) => {
                    self.keys.push(entry.key);
                    self.offsets.push(entry.offset);
                }
                Some(Err(e)) => {
                    debug!("Skipping index line: {}", e);
                    skipped += 1;
                }
                None => {
                    debug!(
                        "Skipping unterminated or non-UTF-8 index line ({} bytes) in {}",
                        buf.len(),
                        self.path.display()
                    );
                    skipped += 1;
                }
            }
        }

        debug!(
            "Loaded {} index entries from {} ({} skipped)",
            self.keys.len(),
            self.path.display(),
            skipped
        );
        Ok(())
    }

    /// Records that a record with timestamp `key` starts at `offset`.
    ///
    /// Under [`IndexPolicy::Dense`] every call is stored. Under
    /// [`IndexPolicy::Sampled`] only calls 0, N, 2N, ... since open are
    /// stored, so the first record appended after open is always indexed.
    /// The entry is buffered; nothing is flushed here.
    ///
    /// On error neither the counter nor the in-memory entries change, so a
    /// retried record is sampled the same way.
    pub fn append(&mut self, key: Timestamp, offset: u64) -> Result<()> {
        if self.append_count % self.policy.interval() == 0 {
            IndexEntry { key, offset }.write_to(&mut self.writer)?;
            self.keys.push(key);
            self.offsets.push(offset);
        }
        self.append_count += 1;
        Ok(())
    }

    /// Returns a `(begin_offset, end_offset)` bracket for `[begin_key, end_key]`.
    ///
    /// Both ends start from a lower-bound search (first position whose key
    /// is `>= target`) and step back one position, clamped to the valid
    /// range. Stepping back on the left guarantees the scan starts at or
    /// before the first record `>= begin_key`, even between two samples.
    /// The right end is clamped to the last entry and never wraps to 0.
    ///
    /// An empty index yields `(0, 0)`.
    pub fn get_offsets(&self, begin_key: Timestamp, end_key: Timestamp) -> (u64, u64) {
        let Some(last) = self.keys.len().checked_sub(1) else {
            return (0, 0);
        };

        let left = self.keys.partition_point(|k| *k < begin_key).saturating_sub(1);
        let right = self
            .keys
            .partition_point(|k| *k < end_key)
            .saturating_sub(1)
            .min(last);

        debug!(
            "Index bracket for [{}, {}]: keys {}..={} positions {}..={} of {}",
            begin_key,
            end_key,
            self.keys[0],
            self.keys[last],
            left,
            right,
            self.keys.len()
        );
        (self.offsets[left], self.offsets[right])
    }

    /// Drops entries whose offset is at or past `data_len` and rewrites the file.
    ///
    /// Used on open when the index file was flushed further than the data
    /// file before a crash. Returns the number of entries dropped.
    pub fn truncate_to_data_len(&mut self, data_len: u64) -> Result<usize> {
        let keep = self.offsets.partition_point(|&o| o < data_len);
        let dropped = self.offsets.len() - keep;
        if dropped == 0 {
            return Ok(0);
        }

        warn!(
            "Dropping {} index entries past data length {} in {}",
            dropped,
            data_len,
            self.path.display()
        );
        self.keys.truncate(keep);
        self.offsets.truncate(keep);
        self.rewrite()?;
        Ok(dropped)
    }

    /// Atomically replaces the index file with the in-memory entries.
    fn rewrite(&mut self) -> Result<()> {
        self.writer.flush()?;

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp_path = self.path.with_file_name(format!("{file_name}.tmp"));
        {
            let mut tmp = BufWriter::new(File::create(&tmp_path)?);
            for entry in self.entries() {
                entry.write_to(&mut tmp)?;
            }
            tmp.flush()?;
            tmp.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            File::open(dir)?.sync_all()?;
        }

        self.writer = BufWriter::new(open_for_append(&self.path)?);
        Ok(())
    }

    /// Iterates over the in-memory entries in file order.
    pub fn entries(&self) -> impl Iterator<Item = IndexEntry> + '_ {
        self.keys
            .iter()
            .zip(&self.offsets)
            .map(|(&key, &offset)| IndexEntry { key, offset })
    }

    /// Number of entries held in memory.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if no entries are held.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Returns the sampling policy.
    pub fn policy(&self) -> IndexPolicy {
        self.policy
    }

    /// Returns the path of the index file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Pushes buffered entries to the OS.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Flushes and fsyncs the index file.
    pub fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        Ok(())
    }
}
