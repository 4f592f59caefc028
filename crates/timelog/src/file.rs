//! Line-oriented append files.
//!
//! Both the data file and the index file are newline-terminated text that
//! only ever grows at the end. An interrupted write can leave the last line
//! without its terminator; [`open_for_append`] cuts such a fragment off so
//! that every file handed out ends on a line boundary.

use crate::error::Result;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use tracing::warn;

/// Read size for the backward search of the last terminator.
const CHUNK: u64 = 4096;

/// Opens `path` for appending, creating it if needed.
///
/// An unterminated trailing fragment left by an interrupted write is cut
/// off, so the file always ends on a line boundary and the next write
/// starts a fresh line.
pub(crate) fn open_for_append(path: &Path) -> Result<File> {
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)?;
    let len = file.metadata()?.len();
    let kept = truncate_to_line_boundary(&file, len)?;
    if kept < len {
        warn!(
            "Discarding {} byte partial line at end of {}",
            len - kept,
            path.display()
        );
    }
    Ok(file)
}

/// Cuts `file` back to the last `\n` at or before `len`.
///
/// Returns the new length.
pub(crate) fn truncate_to_line_boundary(file: &File, len: u64) -> Result<u64> {
    let kept = len - trailing_fragment_len(file, len)?;
    if kept < file.metadata()?.len() {
        file.set_len(kept)?;
    }
    Ok(kept)
}

/// Counts the bytes after the last `\n` of the first `len` bytes of `file`.
pub(crate) fn trailing_fragment_len(mut file: &File, len: u64) -> Result<u64> {
    let mut buf = [0u8; CHUNK as usize];
    let mut end = len;
    while end > 0 {
        let start = end.saturating_sub(CHUNK);
        let chunk = &mut buf[..(end - start) as usize];
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(chunk)?;
        if let Some(pos) = chunk.iter().rposition(|&b| b == b'\n') {
            return Ok(len - (start + pos as u64 + 1));
        }
        end = start;
    }
    Ok(len)
}
