//! Sluice Runner: executes finalized query plans.
//!
//! A [`QueryPlan`] is finalized and compiled once into a [`CompiledQuery`],
//! which can then be run any number of times, concurrently, against a data
//! source:
//!
//! ```text
//! QueryPlan ──finalize──▶ CompiledQuery ──execute──────────▶ QueryResults (pull)
//!                              │
//!                              └──for_each_async──▶ consumer (push, cancellable)
//! ```
//!
//! Each call opens its own [`Session`]. The session applies in-memory skip/take
//! when the backend cannot page natively, hands rows to the shared
//! [`RowMapper`], and closes the reader exactly once.

pub mod binder;
pub mod context;
pub mod driver;
pub mod finalize;
pub mod mapper;
pub mod paging;
pub mod plan;
pub mod query;
pub mod session;
pub mod source;
pub mod value;

pub use context::CallContext;
pub use driver::QueryResults;
pub use finalize::{finalize, IdentityOptimizer, PlanOptimizer};
pub use mapper::{FromRow, MapMode, ProjectionError, RowMapper, RowView};
pub use paging::{PagingCapabilities, ProviderFlags};
pub use plan::{ParameterAccessor, ParameterId, QueryParameter, QueryPlan, RowLimit, SubQuery};
pub use query::CompiledQuery;
pub use session::{Session, SessionInfo};
pub use source::{
    AsyncDataSource, AsyncRowReader, DataSource, ReaderHandle, Row, RowReader, SourceDescriptor,
};
pub use value::{CallArgs, CoercionFailure, FromValue, Strictness, Value, ValueKind};
