#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sluice_error::{ErrorCode, Result, SluiceError};
use sluice_runner::{
    AsyncDataSource, AsyncRowReader, DataSource, ReaderHandle, Row, RowReader, SourceDescriptor,
    SubQuery, Value,
};
use tokio_util::sync::CancellationToken;

/// Open/close bookkeeping shared by a fixture source and its readers.
#[derive(Debug, Default)]
pub struct Counters {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub fetched: AtomicUsize,
}

impl Counters {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn fetched(&self) -> usize {
        self.fetched.load(Ordering::SeqCst)
    }
}

/// Serves a fixed table and records every reader it hands out.
pub struct FixtureSource {
    rows: Arc<Vec<Vec<Value>>>,
    pub counters: Arc<Counters>,
    pub bound: Mutex<Vec<Vec<Value>>>,
    fail_open: bool,
}

impl FixtureSource {
    pub fn new(rows: Vec<Vec<Value>>) -> Self {
        Self {
            rows: Arc::new(rows),
            counters: Arc::new(Counters::default()),
            bound: Mutex::new(Vec::new()),
            fail_open: false,
        }
    }

    /// `count` rows of `(id, label)` with ids starting at 1.
    pub fn numbered(count: i64) -> Self {
        Self::new(
            (1..=count)
                .map(|id| vec![Value::Int(id), Value::Text(format!("row-{}", id))])
                .collect(),
        )
    }

    pub fn failing() -> Self {
        Self {
            fail_open: true,
            ..Self::new(Vec::new())
        }
    }

    fn open(&self, values: &[Value]) -> Result<FixtureReader> {
        if self.fail_open {
            return Err(SluiceError::new(
                ErrorCode::ReaderUnavailable,
                "fixture refuses to open",
            ));
        }
        if let Ok(mut bound) = self.bound.lock() {
            bound.push(values.to_vec());
        }
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(FixtureReader {
            rows: Arc::clone(&self.rows),
            current: None,
            next: 0,
            counters: Arc::clone(&self.counters),
        })
    }
}

impl SourceDescriptor for FixtureSource {
    fn name(&self) -> &str {
        "fixture"
    }
}

impl DataSource for FixtureSource {
    type Reader = FixtureReader;

    fn open_reader(&self, _query: &SubQuery, values: &[Value]) -> Result<FixtureReader> {
        self.open(values)
    }
}

#[async_trait]
impl AsyncDataSource for FixtureSource {
    type Reader = FixtureReader;

    async fn open_reader_async(
        &self,
        _query: &SubQuery,
        values: &[Value],
        _cancel: &CancellationToken,
    ) -> Result<FixtureReader> {
        tokio::task::yield_now().await;
        self.open(values)
    }
}

pub struct FixtureReader {
    rows: Arc<Vec<Vec<Value>>>,
    current: Option<usize>,
    next: usize,
    counters: Arc<Counters>,
}

impl FixtureReader {
    fn step(&mut self) -> bool {
        if self.next < self.rows.len() {
            self.current = Some(self.next);
            self.next += 1;
            self.counters.fetched.fetch_add(1, Ordering::SeqCst);
            true
        } else {
            self.current = None;
            false
        }
    }
}

impl Row for FixtureReader {
    fn column_count(&self) -> usize {
        self.current.map_or(0, |i| self.rows[i].len())
    }

    fn value(&self, ordinal: usize) -> Option<&Value> {
        self.current.and_then(|i| self.rows[i].get(ordinal))
    }
}

impl ReaderHandle for FixtureReader {
    fn close(&mut self) {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
    }
}

impl RowReader for FixtureReader {
    fn advance(&mut self) -> Result<bool> {
        Ok(self.step())
    }
}

#[async_trait]
impl AsyncRowReader for FixtureReader {
    async fn advance(&mut self) -> Result<bool> {
        tokio::task::yield_now().await;
        Ok(self.step())
    }
}
