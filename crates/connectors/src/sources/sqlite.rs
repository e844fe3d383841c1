//! SQLite source.
//!
//! Each reader runs its statement on a dedicated worker that owns the
//! `rusqlite` connection and pushes rows into a bounded channel. The
//! synchronous reader uses a `std` thread and `sync_channel`; the asynchronous
//! one uses `spawn_blocking` and a `tokio` channel. Closing a reader drops the
//! receiving end, which stops the worker at its next send.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;

use async_trait::async_trait;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::OpenFlags;
use sluice_common::config::{ExecutionSettings, DEFAULT_READER_BUFFER};
use sluice_error::{ErrorCode, Result, SluiceError};
use sluice_runner::{
    AsyncDataSource, AsyncRowReader, DataSource, PagingCapabilities, ProviderFlags, ReaderHandle,
    Row, RowReader, SourceDescriptor, SubQuery, Value,
};
use tokio_util::sync::CancellationToken;

use super::source_error;

enum Fetched {
    Ready,
    Row(Vec<Value>),
    Failed(SluiceError),
}

/// Everything the worker needs to run one statement.
struct Job {
    source: String,
    path: String,
    statement: String,
    params: Vec<SqlValue>,
}

impl Job {
    fn error(&self, code: ErrorCode, operation: &str, cause: rusqlite::Error) -> SluiceError {
        source_error(code, &self.source, operation, cause)
    }
}

#[derive(Debug, Clone)]
pub struct SqliteSource {
    name: String,
    path: String,
    buffer: usize,
    flags: ProviderFlags,
}

impl SqliteSource {
    /// A source over the database file at `path`. SQLite pages natively, so
    /// skip/take are left to the statement unless settings force emulation.
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            buffer: DEFAULT_READER_BUFFER,
            flags: ProviderFlags::native(),
        }
    }

    pub fn with_settings(mut self, settings: &ExecutionSettings) -> Self {
        self.buffer = settings.reader_buffer.max(1);
        self.flags = ProviderFlags::native().with_settings(settings);
        self
    }

    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn capabilities(&self) -> ProviderFlags {
        self.flags
    }

    fn job(&self, query: &SubQuery, values: &[Value]) -> Job {
        Job {
            source: self.name.clone(),
            path: self.path.clone(),
            statement: query.statement().to_string(),
            params: values.iter().map(to_sqlite).collect(),
        }
    }
}

impl SourceDescriptor for SqliteSource {
    fn name(&self) -> &str {
        &self.name
    }
}

impl PagingCapabilities for SqliteSource {
    fn supports_skip(&self, query: &SubQuery) -> bool {
        self.flags.supports_skip(query)
    }

    fn supports_take(&self, query: &SubQuery) -> bool {
        self.flags.supports_take(query)
    }
}

impl DataSource for SqliteSource {
    type Reader = SqliteReader;

    fn open_reader(&self, query: &SubQuery, values: &[Value]) -> Result<SqliteReader> {
        let job = self.job(query, values);
        let (tx, rx) = mpsc::sync_channel(self.buffer);
        let stop = Arc::new(AtomicBool::new(false));
        let worker_stop = Arc::clone(&stop);

        tracing::debug!(source = %self.name, statement = %job.statement, "Opening SQLite reader");

        let worker = std::thread::Builder::new()
            .name(format!("sluice-sqlite-{}", self.name))
            .spawn(move || stream_rows(&job, &worker_stop, |m| tx.send(m).is_ok()))
            .map_err(|e| source_error(ErrorCode::ReaderUnavailable, &self.name, "spawn worker", e))?;

        let first = rx.recv();
        let reader = SqliteReader {
            rx: Some(rx),
            current: Vec::new(),
            stop,
            worker: Some(worker),
        };

        match first {
            Ok(Fetched::Ready) => Ok(reader),
            Ok(Fetched::Failed(e)) => Err(e),
            _ => Err(worker_gone(&self.name)),
        }
    }
}

#[async_trait]
impl AsyncDataSource for SqliteSource {
    type Reader = AsyncSqliteReader;

    async fn open_reader_async(
        &self,
        query: &SubQuery,
        values: &[Value],
        cancel: &CancellationToken,
    ) -> Result<AsyncSqliteReader> {
        let job = self.job(query, values);
        let (tx, mut rx) = tokio::sync::mpsc::channel(self.buffer);
        let stop = Arc::new(AtomicBool::new(false));
        let worker_stop = Arc::clone(&stop);

        tracing::debug!(source = %self.name, statement = %job.statement, "Opening async SQLite reader");

        tokio::task::spawn_blocking(move || {
            stream_rows(&job, &worker_stop, |m| tx.blocking_send(m).is_ok())
        });

        let first = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            message = rx.recv() => Some(message),
        };

        let reader = AsyncSqliteReader {
            rx: Some(rx),
            current: Vec::new(),
            stop,
        };

        match first {
            None => Err(SluiceError::cancelled(format!(
                "Opening SQLite source '{}' was cancelled",
                self.name
            ))),
            Some(Some(Fetched::Ready)) => Ok(reader),
            Some(Some(Fetched::Failed(e))) => Err(e),
            Some(_) => Err(worker_gone(&self.name)),
        }
    }
}

fn worker_gone(source: &str) -> SluiceError {
    SluiceError::new(
        ErrorCode::ReaderUnavailable,
        format!("SQLite worker for '{}' exited before the statement was ready", source),
    )
}

fn stream_rows<F>(job: &Job, stop: &AtomicBool, mut send: F)
where
    F: FnMut(Fetched) -> bool,
{
    match run_statement(job, stop, &mut send) {
        Ok(rows) => tracing::debug!(source = %job.source, rows, "SQLite worker finished"),
        Err(e) => {
            send(Fetched::Failed(e));
        }
    }
}

fn run_statement<F>(job: &Job, stop: &AtomicBool, send: &mut F) -> Result<u64>
where
    F: FnMut(Fetched) -> bool,
{
    let conn = rusqlite::Connection::open_with_flags(
        &job.path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| job.error(ErrorCode::ReaderUnavailable, "open database", e))?;

    let mut stmt = conn
        .prepare(&job.statement)
        .map_err(|e| job.error(ErrorCode::ReaderUnavailable, "prepare statement", e))?;
    let column_count = stmt.column_count();

    let mut rows = stmt
        .query(rusqlite::params_from_iter(job.params.iter()))
        .map_err(|e| job.error(ErrorCode::ReaderUnavailable, "execute statement", e))?;

    if !send(Fetched::Ready) {
        return Ok(0);
    }

    let mut sent = 0u64;
    while let Some(row) = rows
        .next()
        .map_err(|e| job.error(ErrorCode::SourceFailure, "fetch row", e))?
    {
        if stop.load(Ordering::Acquire) {
            break;
        }

        let mut values = Vec::with_capacity(column_count);
        for i in 0..column_count {
            let raw = row
                .get_ref(i)
                .map_err(|e| job.error(ErrorCode::SourceFailure, "read column", e))?;
            let value = from_sqlite(raw).map_err(|e| {
                source_error(
                    ErrorCode::SourceFailure,
                    &job.source,
                    "read column",
                    format!("column {} holds invalid UTF-8 text: {}", i, e),
                )
            })?;
            values.push(value);
        }

        if !send(Fetched::Row(values)) {
            break;
        }
        sent += 1;
    }
    Ok(sent)
}

/// TEXT must be valid UTF-8; anything else is reported rather than repaired.
fn from_sqlite(value: ValueRef<'_>) -> Result<Value, std::str::Utf8Error> {
    Ok(match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(x) => Value::Float(x),
        ValueRef::Text(bytes) => Value::Text(std::str::from_utf8(bytes)?.to_string()),
        ValueRef::Blob(bytes) => Value::Bytes(bytes.to_vec()),
    })
}

fn to_sqlite(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Int(i) => SqlValue::Integer(*i),
        Value::Float(x) => SqlValue::Real(*x),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Bytes(b) => SqlValue::Blob(b.clone()),
    }
}

/// Synchronous reader over a worker thread.
pub struct SqliteReader {
    rx: Option<mpsc::Receiver<Fetched>>,
    current: Vec<Value>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl Row for SqliteReader {
    fn column_count(&self) -> usize {
        self.current.len()
    }

    fn value(&self, ordinal: usize) -> Option<&Value> {
        self.current.get(ordinal)
    }
}

impl ReaderHandle for SqliteReader {
    fn close(&mut self) {
        self.stop.store(true, Ordering::Release);
        self.rx.take();
        self.current.clear();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("SQLite reader worker panicked");
            }
        }
    }
}

impl RowReader for SqliteReader {
    fn advance(&mut self) -> Result<bool> {
        let Some(rx) = self.rx.as_ref() else {
            return Ok(false);
        };
        loop {
            match rx.recv() {
                Ok(Fetched::Row(values)) => {
                    self.current = values;
                    return Ok(true);
                }
                Ok(Fetched::Failed(e)) => return Err(e),
                Ok(Fetched::Ready) => continue,
                Err(_) => {
                    self.current.clear();
                    return Ok(false);
                }
            }
        }
    }
}

impl Drop for SqliteReader {
    fn drop(&mut self) {
        self.close();
    }
}

/// Asynchronous reader over a blocking task.
pub struct AsyncSqliteReader {
    rx: Option<tokio::sync::mpsc::Receiver<Fetched>>,
    current: Vec<Value>,
    stop: Arc<AtomicBool>,
}

impl Row for AsyncSqliteReader {
    fn column_count(&self) -> usize {
        self.current.len()
    }

    fn value(&self, ordinal: usize) -> Option<&Value> {
        self.current.get(ordinal)
    }
}

impl ReaderHandle for AsyncSqliteReader {
    fn close(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(mut rx) = self.rx.take() {
            rx.close();
        }
        self.current.clear();
    }
}

#[async_trait]
impl AsyncRowReader for AsyncSqliteReader {
    async fn advance(&mut self) -> Result<bool> {
        let Some(rx) = self.rx.as_mut() else {
            return Ok(false);
        };
        loop {
            match rx.recv().await {
                Some(Fetched::Row(values)) => {
                    self.current = values;
                    return Ok(true);
                }
                Some(Fetched::Failed(e)) => return Err(e),
                Some(Fetched::Ready) => continue,
                None => {
                    self.current.clear();
                    return Ok(false);
                }
            }
        }
    }
}

impl Drop for AsyncSqliteReader {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_conversion() {
        assert_eq!(from_sqlite(ValueRef::Integer(3)), Ok(Value::Int(3)));
        assert_eq!(from_sqlite(ValueRef::Text(b"abc")), Ok(Value::Text("abc".into())));
        assert_eq!(from_sqlite(ValueRef::Null), Ok(Value::Null));
        assert!(from_sqlite(ValueRef::Text(b"f\xffo")).is_err());
        assert_eq!(to_sqlite(&Value::Bool(true)), SqlValue::Integer(1));
        assert_eq!(to_sqlite(&Value::Bytes(vec![1])), SqlValue::Blob(vec![1]));
    }

    #[test]
    fn test_settings_force_emulation() {
        let settings = ExecutionSettings {
            emulate_skip: true,
            reader_buffer: 8,
            ..Default::default()
        };
        let source = SqliteSource::new("db", ":memory:").with_settings(&settings);
        let query = SubQuery::new("SELECT 1");
        assert!(!source.supports_skip(&query));
        assert!(source.supports_take(&query));
        assert_eq!(source.buffer, 8);
    }
}
