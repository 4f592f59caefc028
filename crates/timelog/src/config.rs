//! Store configuration.
//!
//! All tunables are passed explicitly when a [`Store`](crate::Store) is
//! opened; nothing is read from process-wide state.

use std::path::PathBuf;

/// Default directory holding `<name>.db` and `<name>.index` files.
pub const DEFAULT_DATA_DIR: &str = "./data";

/// Default write buffer size for the data file (10 KiB).
pub const DEFAULT_WRITE_BUFFER_SIZE: usize = 10 * 1024;

/// Default read buffer size for range scans (10 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 10 * 1024;

/// Default number of appends between samples under [`IndexPolicy::Sampled`].
pub const DEFAULT_INDEX_INTERVAL: u64 = 1000;

/// Which appended records get an index entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexPolicy {
    /// Index every record (default). Brackets are exact up to one record.
    #[default]
    Dense,
    /// Index one record out of every `interval` appends.
    ///
    /// Smaller index, wider brackets: a query may scan up to `interval`
    /// extra records on each side.
    Sampled {
        /// Appends between two samples. Zero is treated as one.
        interval: u64,
    },
}

impl IndexPolicy {
    /// Sampling policy with [`DEFAULT_INDEX_INTERVAL`].
    pub fn sampled() -> Self {
        Self::Sampled {
            interval: DEFAULT_INDEX_INTERVAL,
        }
    }

    /// Number of appends between two index entries.
    pub fn interval(self) -> u64 {
        match self {
            Self::Dense => 1,
            Self::Sampled { interval } => interval.max(1),
        }
    }
}

/// Configuration for opening a store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory for the data and index files. Created if absent.
    pub data_dir: PathBuf,

    /// Buffer size for the data file writer.
    ///
    /// Appends become visible to other processes once this buffer is
    /// flushed. Default: 10 KiB.
    pub write_buffer_size: usize,

    /// Buffer size for each range scan's read handle. Default: 10 KiB.
    pub read_buffer_size: usize,

    /// Index sampling policy. Default: [`IndexPolicy::Dense`].
    pub index_policy: IndexPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            write_buffer_size: DEFAULT_WRITE_BUFFER_SIZE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            index_policy: IndexPolicy::default(),
        }
    }
}

impl StoreConfig {
    /// Creates a default configuration rooted at `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Sets the data file write buffer size.
    pub fn with_write_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = size;
        self
    }

    /// Sets the scan read buffer size.
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Sets the index sampling policy.
    pub fn with_index_policy(mut self, policy: IndexPolicy) -> Self {
        self.index_policy = policy;
        self
    }
}
