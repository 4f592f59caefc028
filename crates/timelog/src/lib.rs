//! Timelog - Alopex embedded time-series log store
//!
//! Records are appended as text lines to an append-only data file, keyed by
//! an epoch-seconds timestamp. A sparse index of timestamp → byte offset
//! brackets range queries so they scan only the relevant part of the file.
//!
//! # Components
//!
//! - [`Store`]: Named database handle owning both files
//! - [`AppendLog`]: Buffered append-only data file
//! - [`SparseIndex`]: Sampled timestamp → offset index with lower-bound bracketing
//! - [`RangeScan`] / [`DataScan`]: Lazy range iterators with payload filtering
//!
//! # Example
//!
//! ```rust,no_run
//! use alopex_timelog::{Store, StoreConfig};
//! use chrono::{TimeZone, Utc};
//!
//! # fn main() -> alopex_timelog::Result<()> {
//! let mut store = Store::open("sensors", StoreConfig::new("./data"))?;
//!
//! let t = |s| Utc.timestamp_opt(s, 0).unwrap();
//! store.append_data("21.5 living-room", Some(t(100)))?;
//! store.append_data("19.0 kitchen", Some(t(200)))?;
//!
//! for payload in store.get_data(t(50), t(150), None)? {
//!     println!("{}", payload?);
//! }
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]

pub mod append_log;
pub mod clock;
pub mod config;
pub mod error;
mod file;
pub mod index;
pub mod record;
pub mod scan;
pub mod store;

pub use append_log::AppendLog;
pub use clock::{Clock, MockClock, SystemClock};
pub use config::{IndexPolicy, StoreConfig};
pub use error::{Result, TimelogError};
pub use index::{IndexEntry, SparseIndex};
pub use record::{Record, Timestamp, ToEpochSeconds};
pub use scan::{DataFilter, DataScan, RangeScan};
pub use store::Store;
