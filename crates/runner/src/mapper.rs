//! Adaptive row mapping.
//!
//! A [`RowMapper`] runs one projection template under two conversion modes.
//! It starts in [`MapMode::Fast`], where columns convert only when their value
//! variant is exactly the requested type and the row matches the shape of the
//! first row the mapper saw. The first coercion failure switches the mapper to
//! [`MapMode::Slow`] for the rest of its life; the failing row is re-projected
//! with lenient conversion and so is every row after it, in every session.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use sluice_common::warnings::add_warning;
use sluice_error::{Result, SluiceError};
use thiserror::Error;

use crate::context::CallContext;
use crate::session::SessionInfo;
use crate::source::Row;
use crate::value::{CoercionFailure, FromValue, Mismatch, Strictness, Value, ValueKind};

/// Which projector a mapper uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapMode {
    Fast,
    Slow,
}

impl fmt::Display for MapMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapMode::Fast => f.write_str("fast"),
            MapMode::Slow => f.write_str("slow"),
        }
    }
}

/// Failure returned by a projection template.
///
/// Only [`ProjectionError::Coercion`] can switch the mapper to slow mode;
/// anything else propagates unchanged.
#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error(transparent)]
    Coercion(#[from] CoercionFailure),

    #[error(transparent)]
    Other(#[from] SluiceError),
}

/// Column kinds of the row a fast projector was specialized to. `None` marks
/// a column whose first value was null.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowShape {
    kinds: Vec<Option<ValueKind>>,
}

impl RowShape {
    pub fn of(row: &dyn Row) -> Self {
        let kinds = (0..row.column_count())
            .map(|ordinal| match row.value(ordinal) {
                Some(value) if !value.is_null() => Some(value.kind()),
                _ => None,
            })
            .collect();
        Self { kinds }
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    pub fn kind(&self, ordinal: usize) -> Option<ValueKind> {
        self.kinds.get(ordinal).copied().flatten()
    }
}

impl fmt::Display for RowShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, kind) in self.kinds.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match kind {
                Some(kind) => write!(f, "{}", kind)?,
                None => f.write_str("?")?,
            }
        }
        f.write_str("]")
    }
}

/// One conversion mode of a mapper.
#[derive(Debug)]
struct Projector {
    strictness: Strictness,
    shape: Option<RowShape>,
    description: Arc<str>,
}

impl Projector {
    fn fast(shape: RowShape) -> Self {
        Self {
            strictness: Strictness::Exact,
            description: format!("exact{}", shape).into(),
            shape: Some(shape),
        }
    }

    fn slow() -> Self {
        Self {
            strictness: Strictness::Lenient,
            shape: None,
            description: Arc::from("lenient"),
        }
    }

    fn project<T>(
        &self,
        template: &ProjectionFn<T>,
        row: &dyn Row,
        info: &SessionInfo,
    ) -> std::result::Result<T, ProjectionError> {
        if let Some(shape) = &self.shape {
            if row.column_count() != shape.len() {
                return Err(CoercionFailure::Shape {
                    ordinal: shape.len().min(row.column_count()),
                    detail: format!(
                        "expected {} column(s), row has {}",
                        shape.len(),
                        row.column_count()
                    ),
                }
                .into());
            }
        }

        template(&RowView {
            row,
            projector: self,
            info,
        })
    }
}

/// The row handed to a projection template. Valid only for the duration of
/// one projection call.
pub struct RowView<'a> {
    row: &'a dyn Row,
    projector: &'a Projector,
    info: &'a SessionInfo,
}

impl<'a> RowView<'a> {
    /// Converts column `ordinal` under the active strictness.
    pub fn get<V: FromValue>(&self, ordinal: usize) -> std::result::Result<V, ProjectionError> {
        let value = self.value(ordinal)?;

        match self.projector.strictness {
            Strictness::Exact => {
                self.check_shape(ordinal, value)?;
                V::from_exact(value).ok_or_else(|| {
                    CoercionFailure::from_mismatch(Mismatch::Cast, ordinal, V::TYPE_NAME, value)
                        .into()
                })
            }
            Strictness::Lenient => V::from_lenient(value).map_err(|mismatch| {
                CoercionFailure::from_mismatch(mismatch, ordinal, V::TYPE_NAME, value).into()
            }),
        }
    }

    /// The raw column value, without conversion.
    pub fn value(&self, ordinal: usize) -> std::result::Result<&'a Value, ProjectionError> {
        self.row.value(ordinal).ok_or_else(|| {
            CoercionFailure::Shape {
                ordinal,
                detail: format!(
                    "column {} requested, row has {}",
                    ordinal,
                    self.row.column_count()
                ),
            }
            .into()
        })
    }

    fn check_shape(&self, ordinal: usize, value: &Value) -> std::result::Result<(), CoercionFailure> {
        let expected = self.projector.shape.as_ref().and_then(|s| s.kind(ordinal));
        match expected {
            Some(kind) if !value.is_null() && value.kind() != kind => Err(CoercionFailure::Shape {
                ordinal,
                detail: format!("column {} was {}, now {}", ordinal, kind, value.kind()),
            }),
            _ => Ok(()),
        }
    }

    pub fn column_count(&self) -> usize {
        self.row.column_count()
    }

    pub fn strictness(&self) -> Strictness {
        self.projector.strictness
    }

    pub fn context(&self) -> &CallContext {
        self.info.context()
    }

    /// Rows delivered by the session before this one.
    pub fn rows_count(&self) -> u64 {
        self.info.rows_count()
    }
}

type ProjectionFn<T> =
    dyn Fn(&RowView<'_>) -> std::result::Result<T, ProjectionError> + Send + Sync;

/// Maps rows to `T`, adapting its conversion mode to the rows it sees.
///
/// One mapper belongs to one compiled query and is shared by every call
/// against it.
pub struct RowMapper<T> {
    template: Arc<ProjectionFn<T>>,
    faulted: AtomicBool,
    fast: OnceLock<Projector>,
    slow: OnceLock<Projector>,
    slow_mode_warnings: bool,
}

impl<T> RowMapper<T> {
    pub fn new<F>(template: F) -> Self
    where
        F: Fn(&RowView<'_>) -> std::result::Result<T, ProjectionError> + Send + Sync + 'static,
    {
        Self {
            template: Arc::new(template),
            faulted: AtomicBool::new(false),
            fast: OnceLock::new(),
            slow: OnceLock::new(),
            slow_mode_warnings: true,
        }
    }

    /// Whether the switch to slow mode is recorded as a query warning.
    pub fn with_slow_mode_warnings(mut self, enabled: bool) -> Self {
        self.slow_mode_warnings = enabled;
        self
    }

    pub fn mode(&self) -> MapMode {
        if self.faulted.load(Ordering::Acquire) {
            MapMode::Slow
        } else {
            MapMode::Fast
        }
    }

    /// Projects the row the reader is positioned on.
    ///
    /// The projection description is published onto `info`. A coercion
    /// failure in fast mode switches the mapper to slow mode and re-projects
    /// the same row; a failure in slow mode is returned.
    pub fn map(&self, info: &mut SessionInfo, row: &dyn Row) -> Result<T> {
        if self.mode() == MapMode::Fast {
            let fast = self.fast.get_or_init(|| Projector::fast(RowShape::of(row)));
            info.publish_projection(&fast.description);

            match fast.project(&*self.template, row, info) {
                Ok(value) => return Ok(value),
                Err(ProjectionError::Coercion(failure)) => self.switch_to_slow(info, &failure),
                Err(ProjectionError::Other(e)) => return Err(e),
            }
        }

        let slow = self.slow.get_or_init(Projector::slow);
        info.publish_projection(&slow.description);

        slow.project(&*self.template, row, info)
            .map_err(|e| match e {
                ProjectionError::Coercion(failure) => failure
                    .to_sluice_error(Some(&slow.description))
                    .with_trace_id(info.context().id().to_string()),
                ProjectionError::Other(e) => e,
            })
    }

    fn switch_to_slow(&self, info: &SessionInfo, failure: &CoercionFailure) {
        if self
            .faulted
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        tracing::info!(
            call_id = %info.context().id(),
            row = info.rows_count() + 1,
            ordinal = failure.ordinal(),
            reason = %failure,
            "Row mapper switched to slow mode"
        );

        if self.slow_mode_warnings {
            add_warning(format!(
                "Row mapper switched to lenient conversion: {}",
                failure
            ));
        }
    }
}

impl<T: FromRow + 'static> RowMapper<T> {
    /// A mapper whose template is `T`'s [`FromRow`] implementation.
    pub fn for_row() -> Self {
        Self::new(T::from_row)
    }
}

impl<T> fmt::Debug for RowMapper<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowMapper")
            .field("mode", &self.mode())
            .field("fast", &self.fast.get().map(|p| &p.description))
            .finish()
    }
}

/// Types that can be built from a whole row.
pub trait FromRow: Sized {
    fn from_row(row: &RowView<'_>) -> std::result::Result<Self, ProjectionError>;
}

impl FromRow for Vec<Value> {
    fn from_row(row: &RowView<'_>) -> std::result::Result<Self, ProjectionError> {
        (0..row.column_count()).map(|i| row.get::<Value>(i)).collect()
    }
}

macro_rules! tuple_from_row {
    ($($name:ident : $idx:tt),+) => {
        impl<$($name: FromValue),+> FromRow for ($($name,)+) {
            fn from_row(row: &RowView<'_>) -> std::result::Result<Self, ProjectionError> {
                Ok(($(row.get::<$name>($idx)?,)+))
            }
        }
    };
}

tuple_from_row!(A: 0);
tuple_from_row!(A: 0, B: 1);
tuple_from_row!(A: 0, B: 1, C: 2);
tuple_from_row!(A: 0, B: 1, C: 2, D: 3);
tuple_from_row!(A: 0, B: 1, C: 2, D: 3, E: 4);
tuple_from_row!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::CallArgs;
    use sluice_common::warnings::collect_warnings_sync;
    use sluice_error::{ErrorCode, ErrorContext};

    fn info() -> SessionInfo {
        SessionInfo::new(CallContext::new("test", CallArgs::empty()))
    }

    #[test]
    fn test_fast_mode_on_uniform_rows() {
        let mapper = RowMapper::<(i64, String)>::for_row();
        let mut info = info();

        let row = vec![Value::Int(1), Value::Text("a".into())];
        assert_eq!(mapper.map(&mut info, &row).unwrap(), (1, "a".to_string()));
        assert_eq!(mapper.mode(), MapMode::Fast);
        assert_eq!(info.projection(), Some("exact[int, text]"));
    }

    #[test]
    fn test_failing_row_is_reprojected_in_slow_mode() {
        let mapper = RowMapper::<(i64,)>::for_row();
        let mut info = info();

        mapper.map(&mut info, &vec![Value::Int(1)]).unwrap();
        let (value, warnings) =
            collect_warnings_sync(|| mapper.map(&mut info, &vec![Value::Text("2".into())]));

        assert_eq!(value.unwrap(), (2,));
        assert_eq!(mapper.mode(), MapMode::Slow);
        assert_eq!(info.projection(), Some("lenient"));
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_slow_mode_is_sticky() {
        let mapper = RowMapper::new(|row: &RowView<'_>| Ok(row.strictness()));
        let mut info = info();

        // Second row has a different column count than the first.
        mapper.map(&mut info, &vec![Value::Int(1)]).unwrap();
        let second = mapper
            .map(&mut info, &vec![Value::Int(1), Value::Int(2)])
            .unwrap();
        let third = mapper.map(&mut info, &vec![Value::Int(3)]).unwrap();

        assert_eq!(second, Strictness::Lenient);
        assert_eq!(third, Strictness::Lenient);
    }

    #[test]
    fn test_shape_change_on_value_column_switches_mode() {
        let mapper = RowMapper::<Vec<Value>>::for_row();
        let mut info = info();

        mapper.map(&mut info, &vec![Value::Int(1)]).unwrap();
        mapper.map(&mut info, &vec![Value::Null]).unwrap();
        assert_eq!(mapper.mode(), MapMode::Fast);

        mapper.map(&mut info, &vec![Value::Float(1.5)]).unwrap();
        assert_eq!(mapper.mode(), MapMode::Slow);
    }

    #[test]
    fn test_slow_failure_propagates() {
        let mapper = RowMapper::<(i64,)>::for_row();
        let mut info = info();

        let err = mapper
            .map(&mut info, &vec![Value::Text("abc".into())])
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::CoercionFailed);
        assert_eq!(err.trace_id, Some(info.context().id().to_string()));
        match err.context {
            Some(ErrorContext::Coercion { projection, .. }) => {
                assert_eq!(projection.as_deref(), Some("lenient"))
            }
            _ => panic!("Expected Coercion context"),
        }
    }

    #[test]
    fn test_other_errors_do_not_switch_mode() {
        let mapper: RowMapper<i64> = RowMapper::new(|_row: &RowView<'_>| {
            Err(SluiceError::new(ErrorCode::NotImplemented, "nope").into())
        });
        let mut info = info();

        let err = mapper.map(&mut info, &vec![Value::Int(1)]).unwrap_err();
        assert_eq!(err.code, ErrorCode::NotImplemented);
        assert_eq!(mapper.mode(), MapMode::Fast);
    }

    #[test]
    fn test_row_shape_display() {
        let shape = RowShape::of(&vec![Value::Int(1), Value::Null, Value::Text("x".into())]);
        assert_eq!(shape.to_string(), "[int, ?, text]");
        assert_eq!(shape.kind(1), None);
    }
}
