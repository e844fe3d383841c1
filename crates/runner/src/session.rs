//! Execution sessions.
//!
//! A [`Session`] owns the reader of exactly one call. Both drivers advance the
//! reader themselves and then call [`Session::produce`], which runs the row
//! through the paging window and the mapper. The reader is closed exactly once:
//! explicitly through [`Session::release`], or when the session is dropped.

use std::sync::Arc;

use sluice_error::Result;

use crate::context::CallContext;
use crate::mapper::RowMapper;
use crate::paging::{Admission, PageWindow};
use crate::source::ReaderHandle;

/// Per-call state visible to the mapper.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    context: Arc<CallContext>,
    rows_count: u64,
    projection: Option<Arc<str>>,
}

impl SessionInfo {
    pub fn new(context: Arc<CallContext>) -> Self {
        Self {
            context,
            rows_count: 0,
            projection: None,
        }
    }

    pub fn context(&self) -> &CallContext {
        &self.context
    }

    /// Rows read and mapped so far, including rows an emulated skip later
    /// drops.
    pub fn rows_count(&self) -> u64 {
        self.rows_count
    }

    /// Description of the projection the mapper last used in this session.
    pub fn projection(&self) -> Option<&str> {
        self.projection.as_deref()
    }

    pub(crate) fn publish_projection(&mut self, description: &Arc<str>) {
        let current = self.projection.as_ref();
        if !current.is_some_and(|p| Arc::ptr_eq(p, description)) {
            self.projection = Some(Arc::clone(description));
        }
    }
}

/// Outcome of handing one positioned row to the session.
#[derive(Debug)]
pub enum Produced<T> {
    /// Consumed by an emulated skip.
    Skipped,
    Row(T),
    /// The take window is full; stop reading.
    Exhausted,
}

pub struct Session<R: ReaderHandle> {
    info: SessionInfo,
    window: PageWindow,
    reader: Option<R>,
    source: String,
}

impl<R: ReaderHandle> Session<R> {
    pub fn open(
        context: Arc<CallContext>,
        window: PageWindow,
        reader: R,
        source: impl Into<String>,
    ) -> Self {
        let source = source.into();
        tracing::debug!(
            call_id = %context.id(),
            source = %source,
            skip = window.has_skip(),
            take = window.has_take(),
            "Opened execution session"
        );

        Self {
            info: SessionInfo::new(context),
            window,
            reader: Some(reader),
            source,
        }
    }

    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    /// The open reader, or `None` after release.
    pub fn reader_mut(&mut self) -> Option<&mut R> {
        self.reader.as_mut()
    }

    pub fn is_released(&self) -> bool {
        self.reader.is_none()
    }

    /// Whether another row should be read. False once the take window is full
    /// or the reader has been released.
    pub fn wants_more(&self) -> bool {
        self.reader.is_some() && !self.window.is_exhausted()
    }

    /// Handles the row the reader is currently positioned on.
    ///
    /// Every row is mapped and counted before the paging window sees it, so a
    /// row that an emulated skip drops can still switch the mapper to slow
    /// mode or fail the call.
    pub fn produce<T>(&mut self, mapper: &RowMapper<T>) -> Result<Produced<T>> {
        if self.window.is_exhausted() {
            return Ok(Produced::Exhausted);
        }
        let Some(reader) = self.reader.as_ref() else {
            return Ok(Produced::Exhausted);
        };

        let value = mapper.map(&mut self.info, reader)?;
        self.info.rows_count += 1;

        match self.window.admit() {
            Admission::Pass => Ok(Produced::Row(value)),
            Admission::Drop => Ok(Produced::Skipped),
            Admission::Exhausted => Ok(Produced::Exhausted),
        }
    }

    /// Closes the reader. Later calls do nothing.
    pub fn release(&mut self) {
        if let Some(mut reader) = self.reader.take() {
            reader.close();
            tracing::debug!(
                call_id = %self.info.context.id(),
                source = %self.source,
                rows = self.info.rows_count,
                projection = self.info.projection().unwrap_or("none"),
                elapsed_ms = self.info.context.started().elapsed().as_millis() as u64,
                "Released execution session"
            );
        }
    }
}

impl<R: ReaderHandle> Drop for Session<R> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Row;
    use crate::value::{CallArgs, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingReader {
        row: Vec<Value>,
        closed: Arc<AtomicUsize>,
    }

    impl Row for CountingReader {
        fn column_count(&self) -> usize {
            self.row.len()
        }

        fn value(&self, ordinal: usize) -> Option<&Value> {
            self.row.get(ordinal)
        }
    }

    impl ReaderHandle for CountingReader {
        fn close(&mut self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn open_session(window: PageWindow) -> (Session<CountingReader>, Arc<AtomicUsize>) {
        let closed = Arc::new(AtomicUsize::new(0));
        let reader = CountingReader {
            row: vec![Value::Int(7)],
            closed: closed.clone(),
        };
        let context = CallContext::new("test", CallArgs::empty());
        (Session::open(context, window, reader, "memory"), closed)
    }

    #[test]
    fn test_release_is_idempotent_and_runs_on_drop() {
        let (mut session, closed) = open_session(PageWindow::unbounded());
        session.release();
        session.release();
        assert!(session.is_released());
        drop(session);
        assert_eq!(closed.load(Ordering::SeqCst), 1);

        let (session, closed) = open_session(PageWindow::unbounded());
        drop(session);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_produce_applies_window_and_counts_rows() {
        let mapper = RowMapper::<(i64,)>::for_row();
        let (mut session, _closed) = open_session(PageWindow::new(Some(1), Some(1)));

        assert!(matches!(session.produce(&mapper).unwrap(), Produced::Skipped));
        assert_eq!(session.info().rows_count(), 1);
        assert!(session.info().projection().is_some());

        assert!(matches!(session.produce(&mapper).unwrap(), Produced::Row((7,))));
        assert_eq!(session.info().rows_count(), 2);
        assert!(!session.wants_more());

        assert!(matches!(session.produce(&mapper).unwrap(), Produced::Exhausted));
        assert_eq!(session.info().rows_count(), 2);
    }

    #[test]
    fn test_skipped_row_that_cannot_map_fails_the_call() {
        let mapper = RowMapper::<(bool,)>::for_row();
        let (mut session, _closed) = open_session(PageWindow::new(Some(1), None));

        let err = session.produce(&mapper).unwrap_err();
        assert_eq!(err.code, sluice_error::ErrorCode::CoercionFailed);
        assert_eq!(session.info().rows_count(), 0);
    }
}
