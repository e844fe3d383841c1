//! Data sources for the Sluice runner.
//!
//! Every source implements [`sluice_runner::DataSource`] and
//! [`sluice_runner::AsyncDataSource`], so a compiled query can be pulled
//! synchronously or pushed asynchronously against it.

pub mod sources;

pub use sources::memory::{MemoryReader, MemorySource, ReaderStats};
pub use sources::sqlite::{AsyncSqliteReader, SqliteReader, SqliteSource};
