//! Data source seam.
//!
//! A source opens a reader for one sub-query. The reader is advanced one row
//! at a time and exposes the current row by ordinal; the runner closes it
//! exactly once when the session ends.

use async_trait::async_trait;
use sluice_error::Result;
use tokio_util::sync::CancellationToken;

use crate::plan::SubQuery;
use crate::value::Value;

/// Read access to the row a reader is positioned on.
pub trait Row {
    fn column_count(&self) -> usize;

    /// Column `ordinal` of the current row, or `None` past the last column.
    fn value(&self, ordinal: usize) -> Option<&Value>;
}

impl Row for [Value] {
    fn column_count(&self) -> usize {
        self.len()
    }

    fn value(&self, ordinal: usize) -> Option<&Value> {
        self.get(ordinal)
    }
}

impl Row for Vec<Value> {
    fn column_count(&self) -> usize {
        self.len()
    }

    fn value(&self, ordinal: usize) -> Option<&Value> {
        self.get(ordinal)
    }
}

/// An open reader, independent of how it is advanced.
pub trait ReaderHandle: Row + Send {
    /// Releases the reader's resources. The runner calls this exactly once.
    fn close(&mut self);
}

/// A reader advanced synchronously.
pub trait RowReader: ReaderHandle {
    /// Moves to the next row. Returns `false` once the rows are exhausted.
    fn advance(&mut self) -> Result<bool>;
}

/// A reader whose next-row fetch may suspend.
#[async_trait]
pub trait AsyncRowReader: ReaderHandle {
    async fn advance(&mut self) -> Result<bool>;
}

/// Identity of a data source, used in logs and error context.
pub trait SourceDescriptor: Send + Sync {
    fn name(&self) -> &str;
}

/// Opens readers synchronously.
pub trait DataSource: SourceDescriptor {
    type Reader: RowReader;

    /// Opens a reader for `query`. `values` holds the bound placeholder values
    /// in the backend's placeholder order.
    fn open_reader(&self, query: &SubQuery, values: &[Value]) -> Result<Self::Reader>;
}

/// Opens readers through a suspension-capable path.
#[async_trait]
pub trait AsyncDataSource: SourceDescriptor {
    type Reader: AsyncRowReader;

    /// Opens a reader for `query`. Implementations should observe `cancel`
    /// while waiting on the backend.
    async fn open_reader_async(
        &self,
        query: &SubQuery,
        values: &[Value],
        cancel: &CancellationToken,
    ) -> Result<Self::Reader>;
}
