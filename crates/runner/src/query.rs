//! Compiled queries: the unit reused across calls.

use std::sync::Arc;

use sluice_common::config::ExecutionSettings;
use sluice_error::Result;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::binder::bind_placeholders;
use crate::context::CallContext;
use crate::driver::{cancelled, drive_async, QueryResults};
use crate::finalize::{finalize, PlanOptimizer};
use crate::mapper::RowMapper;
use crate::paging::{PagingCapabilities, PagingEmulator};
use crate::plan::{QueryPlan, SubQuery};
use crate::session::Session;
use crate::source::{AsyncDataSource, DataSource};
use crate::value::CallArgs;

/// A finalized single-statement plan together with its paging emulator and
/// row mapper.
///
/// Cheap to share behind an `Arc`; any number of calls may run against one
/// compiled query concurrently.
pub struct CompiledQuery<T> {
    plan: Arc<QueryPlan>,
    paging: PagingEmulator,
    mapper: Arc<RowMapper<T>>,
}

impl<T> CompiledQuery<T> {
    /// Finalizes `plan` and plans paging emulation for its only sub-query.
    pub fn compile(
        plan: QueryPlan,
        optimizer: &dyn PlanOptimizer,
        capabilities: &dyn PagingCapabilities,
        mapper: RowMapper<T>,
    ) -> Result<Self> {
        let plan = finalize(plan, optimizer)?;
        let paging = PagingEmulator::plan(plan.sole_query()?, capabilities)?;

        tracing::debug!(
            emulate_skip = paging.skip().is_some(),
            emulate_take = paging.take().is_some(),
            "Compiled query"
        );

        Ok(Self {
            plan: Arc::new(plan),
            paging,
            mapper: Arc::new(mapper),
        })
    }

    /// Like [`CompiledQuery::compile`], applying the execution settings to the
    /// mapper.
    pub fn compile_with_settings(
        plan: QueryPlan,
        optimizer: &dyn PlanOptimizer,
        capabilities: &dyn PagingCapabilities,
        mapper: RowMapper<T>,
        settings: &ExecutionSettings,
    ) -> Result<Self> {
        let mapper = mapper.with_slow_mode_warnings(settings.slow_mode_warnings);
        Self::compile(plan, optimizer, capabilities, mapper)
    }

    pub fn plan(&self) -> &QueryPlan {
        &self.plan
    }

    pub fn query(&self) -> Result<&SubQuery> {
        self.plan.sole_query()
    }

    pub fn paging(&self) -> &PagingEmulator {
        &self.paging
    }

    pub fn mapper(&self) -> &RowMapper<T> {
        &self.mapper
    }

    /// Runs the query and returns its rows as a lazy sequence.
    ///
    /// A call context is created from the statement and `args` when none is
    /// given. Nothing is read until the sequence is polled.
    pub fn execute<S: DataSource>(
        &self,
        source: &S,
        context: Option<Arc<CallContext>>,
        args: CallArgs,
    ) -> Result<QueryResults<T, S::Reader>> {
        let query = self.plan.sole_query()?;
        let context = context.unwrap_or_else(|| CallContext::new(query.statement(), args.clone()));

        let span = tracing::info_span!(
            "execute_query",
            call_id = %context.id(),
            source = source.name(),
            query = %context.description(),
        );

        let (window, reader) = {
            let _entered = span.enter();
            let window = self.paging.bind(&args)?;
            let values = bind_placeholders(query, &args)?;
            let reader = source
                .open_reader(query, &values)
                .map_err(|e| e.with_trace_id(context.id().to_string()))?;
            (window, reader)
        };

        let session = Session::open(context, window, reader, source.name());
        Ok(QueryResults::new(session, Arc::clone(&self.mapper), span))
    }

    /// Runs the query and pushes every row into `consumer`.
    ///
    /// `cancel` is observed while the reader is acquired and before every row
    /// fetch. A cancelled call returns a cancellation error after the reader
    /// has been closed; rows already delivered stay delivered. Returns the
    /// number of rows delivered.
    pub async fn for_each_async<S, F>(
        &self,
        source: &S,
        context: Option<Arc<CallContext>>,
        args: CallArgs,
        consumer: F,
        cancel: &CancellationToken,
    ) -> Result<u64>
    where
        S: AsyncDataSource,
        F: FnMut(T) + Send,
        T: Send,
    {
        let query = self.plan.sole_query()?;
        let context = context.unwrap_or_else(|| CallContext::new(query.statement(), args.clone()));

        let span = tracing::info_span!(
            "execute_query_async",
            call_id = %context.id(),
            source = source.name(),
            query = %context.description(),
        );

        async move {
            if cancel.is_cancelled() {
                return Err(cancelled(&context, 0));
            }

            let window = self.paging.bind(&args)?;
            let values = bind_placeholders(query, &args)?;

            let reader = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                reader = source.open_reader_async(query, &values, cancel) => Some(reader),
            };
            let reader = match reader {
                Some(reader) => reader.map_err(|e| e.with_trace_id(context.id().to_string()))?,
                None => {
                    tracing::warn!("Query cancelled while acquiring reader");
                    return Err(cancelled(&context, 0));
                }
            };

            let session = Session::open(context, window, reader, source.name());
            drive_async(session, &self.mapper, consumer, cancel).await
        }
        .instrument(span)
        .await
    }
}

impl<T> std::fmt::Debug for CompiledQuery<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledQuery")
            .field("plan", &self.plan)
            .field("paging", &self.paging)
            .field("mapper", &self.mapper)
            .finish()
    }
}
