//! Execution drivers.
//!
//! [`QueryResults`] pulls rows lazily for the synchronous path; [`drive_async`]
//! pushes rows into a consumer and observes a cancellation token at every
//! fetch. Both hand each positioned row to [`Session::produce`].

use std::iter::FusedIterator;
use std::sync::Arc;

use sluice_error::{Result, SluiceError};
use tokio_util::sync::CancellationToken;

use crate::context::CallContext;
use crate::mapper::RowMapper;
use crate::session::{Produced, Session, SessionInfo};
use crate::source::{AsyncRowReader, RowReader};

/// Lazy sequence of mapped rows from one synchronous call.
///
/// The session is released when the rows run out, when an error is
/// returned, or when the sequence is dropped, whichever comes first. After
/// that the sequence only yields `None`.
pub struct QueryResults<T, R: RowReader> {
    session: Option<Session<R>>,
    mapper: Arc<RowMapper<T>>,
    span: tracing::Span,
    delivered: u64,
}

impl<T, R: RowReader> QueryResults<T, R> {
    pub(crate) fn new(session: Session<R>, mapper: Arc<RowMapper<T>>, span: tracing::Span) -> Self {
        Self {
            session: Some(session),
            mapper,
            span,
            delivered: 0,
        }
    }

    /// Session state while the sequence is still open.
    pub fn info(&self) -> Option<&SessionInfo> {
        self.session.as_ref().map(Session::info)
    }

    /// Rows yielded so far.
    pub fn rows_delivered(&self) -> u64 {
        self.delivered
    }

    pub fn is_finished(&self) -> bool {
        self.session.is_none()
    }
}

impl<T, R: RowReader> Iterator for QueryResults<T, R> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let session = self.session.as_mut()?;
        let _entered = self.span.enter();

        let step = next_row(session, &self.mapper);
        match &step {
            Some(Ok(_)) => self.delivered += 1,
            _ => {
                if let Some(mut session) = self.session.take() {
                    session.release();
                }
            }
        }
        step
    }
}

impl<T, R: RowReader> FusedIterator for QueryResults<T, R> {}

fn next_row<T, R: RowReader>(session: &mut Session<R>, mapper: &RowMapper<T>) -> Option<Result<T>> {
    while session.wants_more() {
        let reader = session.reader_mut()?;
        match reader.advance() {
            Ok(true) => {}
            Ok(false) => return None,
            Err(e) => return Some(Err(e)),
        }

        match session.produce(mapper) {
            Ok(Produced::Skipped) => continue,
            Ok(Produced::Row(value)) => return Some(Ok(value)),
            Ok(Produced::Exhausted) => return None,
            Err(e) => return Some(Err(e)),
        }
    }
    None
}

/// Pushes every mapped row of `session` into `consumer`.
///
/// Returns the number of rows delivered. The session is released before this
/// returns on every path, including cancellation.
pub(crate) async fn drive_async<T, R, F>(
    mut session: Session<R>,
    mapper: &RowMapper<T>,
    mut consumer: F,
    cancel: &CancellationToken,
) -> Result<u64>
where
    R: AsyncRowReader,
    F: FnMut(T) + Send,
    T: Send,
{
    let mut delivered = 0u64;
    let outcome: Result<()> = loop {
        if !session.wants_more() {
            break Ok(());
        }
        let Some(reader) = session.reader_mut() else {
            break Ok(());
        };

        let advanced = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = reader.advance() => Some(result),
        };

        match advanced {
            None => break Err(cancelled(session.info().context(), delivered)),
            Some(Ok(true)) => {}
            Some(Ok(false)) => break Ok(()),
            Some(Err(e)) => break Err(e),
        }

        match session.produce(mapper) {
            Ok(Produced::Skipped) => continue,
            Ok(Produced::Row(value)) => {
                consumer(value);
                delivered += 1;
            }
            Ok(Produced::Exhausted) => break Ok(()),
            Err(e) => break Err(e),
        }
    };

    session.release();

    match outcome {
        Ok(()) => Ok(delivered),
        Err(e) => {
            if e.is_cancelled() {
                tracing::warn!(rows = delivered, "Query execution cancelled");
            }
            Err(e)
        }
    }
}

pub(crate) fn cancelled(context: &CallContext, rows: u64) -> SluiceError {
    SluiceError::cancelled(format!("Query cancelled after {} row(s)", rows))
        .with_trace_id(context.id().to_string())
        .with_hint("The cancellation token was triggered by the caller")
}
