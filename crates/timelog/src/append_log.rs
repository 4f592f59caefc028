//! Append-only data file.
//!
//! Records are written as text lines (see [`crate::record`]) through a
//! buffered writer. The log tracks its logical end position itself, so the
//! byte offset of a record is known before the write without flushing or
//! querying the OS.

use crate::error::{Result, TimelogError};
use crate::file::open_for_append;
use crate::record::{encode_line, Timestamp};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Append handle on a data file.
pub struct AppendLog {
    /// Path of the data file.
    path: PathBuf,
    /// Buffered append handle.
    writer: BufWriter<File>,
    /// Logical end of file, buffered bytes included.
    position: u64,
    /// Set when a failed write could not be undone.
    needs_recovery: bool,
}

impl AppendLog {
    /// Opens (or creates) the data file at `path` for appending.
    ///
    /// A partial trailing line left by an interrupted write is discarded
    /// so that the next record starts on a fresh line.
    pub fn open(path: impl AsRef<Path>, write_buffer_size: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = open_for_append(&path)?;
        let position = file.metadata()?.len();
        debug!("Opened data file {} at offset {}", path.display(), position);

        Ok(Self {
            path,
            writer: BufWriter::with_capacity(write_buffer_size.max(1), file),
            position,
            needs_recovery: false,
        })
    }

    /// Appends one record and returns the offset at which it starts.
    ///
    /// The payload must already be validated. A line is either buffered
    /// whole or, if it is at least as large as the buffer, written straight
    /// to the file. If that direct write fails the file is cut back to the
    /// record's offset, so a failed append never leaves a fragment for the
    /// next record to be glued onto.
    ///
    /// # Errors
    ///
    /// Returns [`TimelogError::NeedsRecovery`] once a failed write could
    /// not be rolled back.
    pub fn append(&mut self, timestamp: Timestamp, payload: &str) -> Result<u64> {
        if self.needs_recovery {
            return Err(TimelogError::NeedsRecovery(self.path.clone()));
        }
        let offset = self.position;
        let line = encode_line(timestamp, payload);
        let bytes = line.as_bytes();

        // Drain earlier records first so the buffer never holds part of this line.
        if bytes.len() > self.writer.capacity() - self.writer.buffer().len() {
            self.writer.flush()?;
        }
        if bytes.len() < self.writer.capacity() {
            self.writer.write_all(bytes)?;
        } else if let Err(e) = self.writer.get_mut().write_all(bytes) {
            if let Err(undo) = self.rollback(offset) {
                warn!(
                    "Failed to roll back {} to offset {}: {}",
                    self.path.display(),
                    offset,
                    undo
                );
            }
            return Err(e.into());
        }

        self.position += bytes.len() as u64;
        Ok(offset)
    }

    /// Cuts the data file back to `offset`, discarding every record from there on.
    ///
    /// Buffered records are flushed first. If the file cannot be restored,
    /// further appends fail with [`TimelogError::NeedsRecovery`].
    pub fn rollback(&mut self, offset: u64) -> Result<()> {
        if offset > self.position {
            return Err(TimelogError::invalid(format!(
                "rollback offset {} is past the end of {} ({})",
                offset,
                self.path.display(),
                self.position
            )));
        }
        let result = self.truncate(offset);
        self.needs_recovery = result.is_err();
        result
    }

    fn truncate(&mut self, offset: u64) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().set_len(offset)?;
        self.position = offset;
        Ok(())
    }

    /// Returns true if a failed write left the file in an unknown state.
    pub fn needs_recovery(&self) -> bool {
        self.needs_recovery
    }

    /// Logical length of the data file, buffered bytes included.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Returns the path of the data file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Pushes buffered records to the OS.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Flushes and fsyncs the data file.
    pub fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        Ok(())
    }
}
