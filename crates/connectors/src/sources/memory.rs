use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use sluice_error::Result;
use sluice_runner::{
    AsyncDataSource, AsyncRowReader, DataSource, ReaderHandle, Row, RowReader, SourceDescriptor,
    SubQuery, Value,
};
use tokio_util::sync::CancellationToken;

/// Reader bookkeeping for a [`MemorySource`].
#[derive(Debug, Default)]
pub struct ReaderStats {
    opened: AtomicU64,
    closed: AtomicU64,
    rows_read: AtomicU64,
}

impl ReaderStats {
    pub fn opened(&self) -> u64 {
        self.opened.load(Ordering::Relaxed)
    }

    pub fn closed(&self) -> u64 {
        self.closed.load(Ordering::Relaxed)
    }

    /// Readers opened and not yet closed.
    pub fn open_readers(&self) -> u64 {
        self.opened().saturating_sub(self.closed())
    }

    pub fn rows_read(&self) -> u64 {
        self.rows_read.load(Ordering::Relaxed)
    }
}

/// Serves the same rows for every statement. The statement text and bound
/// values are ignored.
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    rows: Arc<Vec<Vec<Value>>>,
    stats: Arc<ReaderStats>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            name: name.into(),
            rows: Arc::new(rows),
            stats: Arc::new(ReaderStats::default()),
        }
    }

    pub fn stats(&self) -> &ReaderStats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn reader(&self) -> MemoryReader {
        self.stats.opened.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(source = %self.name, rows = self.rows.len(), "Opened memory reader");
        MemoryReader {
            rows: Arc::clone(&self.rows),
            position: None,
            stats: Arc::clone(&self.stats),
            closed: false,
        }
    }
}

impl SourceDescriptor for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }
}

impl DataSource for MemorySource {
    type Reader = MemoryReader;

    fn open_reader(&self, _query: &SubQuery, _values: &[Value]) -> Result<MemoryReader> {
        Ok(self.reader())
    }
}

#[async_trait]
impl AsyncDataSource for MemorySource {
    type Reader = MemoryReader;

    async fn open_reader_async(
        &self,
        _query: &SubQuery,
        _values: &[Value],
        _cancel: &CancellationToken,
    ) -> Result<MemoryReader> {
        Ok(self.reader())
    }
}

pub struct MemoryReader {
    rows: Arc<Vec<Vec<Value>>>,
    position: Option<usize>,
    stats: Arc<ReaderStats>,
    closed: bool,
}

impl MemoryReader {
    fn step(&mut self) -> bool {
        if self.closed {
            return false;
        }
        let next = self.position.map_or(0, |p| p + 1);
        if next < self.rows.len() {
            self.position = Some(next);
            self.stats.rows_read.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            self.position = Some(self.rows.len());
            false
        }
    }

    fn current(&self) -> Option<&Vec<Value>> {
        self.position.and_then(|p| self.rows.get(p))
    }
}

impl Row for MemoryReader {
    fn column_count(&self) -> usize {
        self.current().map_or(0, Vec::len)
    }

    fn value(&self, ordinal: usize) -> Option<&Value> {
        self.current().and_then(|row| row.get(ordinal))
    }
}

impl ReaderHandle for MemoryReader {
    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.stats.closed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl RowReader for MemoryReader {
    fn advance(&mut self) -> Result<bool> {
        Ok(self.step())
    }
}

#[async_trait]
impl AsyncRowReader for MemoryReader {
    async fn advance(&mut self) -> Result<bool> {
        tokio::task::yield_now().await;
        Ok(self.step())
    }
}

impl Drop for MemoryReader {
    fn drop(&mut self) {
        self.close();
    }
}
