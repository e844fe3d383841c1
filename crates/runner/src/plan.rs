//! Backend-bound query plans.
//!
//! A [`QueryPlan`] is produced upstream (SQL already rendered) and is read-only
//! here. It holds one or more [`SubQuery`] descriptors; the execution layer
//! only runs plans that finalize to exactly one.

use std::fmt;
use std::sync::Arc;

use sluice_error::{ErrorCode, ErrorContext, Result, SluiceError};

use crate::value::{CallArgs, Value};

/// Name of a backend placeholder (for example `p0`, `:limit`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParameterId(String);

impl ParameterId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParameterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParameterId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

type AccessorFn = dyn Fn(&CallArgs) -> Result<Value> + Send + Sync;

/// Extracts a parameter's runtime value from the call arguments.
///
/// Accessors are shared by every call against the plan and must not hold
/// per-call state.
#[derive(Clone)]
pub struct ParameterAccessor(Arc<AccessorFn>);

impl ParameterAccessor {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&CallArgs) -> Result<Value> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Reads call argument `position`.
    pub fn argument(position: usize) -> Self {
        Self::new(move |args: &CallArgs| {
            args.get(position).cloned().ok_or_else(|| {
                SluiceError::new(
                    ErrorCode::InvalidParameter,
                    format!(
                        "Call has {} argument(s), parameter reads argument {}",
                        args.len(),
                        position
                    ),
                )
            })
        })
    }

    /// Always yields `value`, whatever the call arguments.
    pub fn constant(value: impl Into<Value>) -> Self {
        let value = value.into();
        Self::new(move |_| Ok(value.clone()))
    }

    pub fn evaluate(&self, args: &CallArgs) -> Result<Value> {
        (self.0)(args)
    }
}

impl fmt::Debug for ParameterAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ParameterAccessor(..)")
    }
}

/// One plan parameter.
#[derive(Debug, Clone)]
pub struct QueryParameter {
    index: usize,
    placeholder: ParameterId,
    accessor: ParameterAccessor,
}

impl QueryParameter {
    /// Stable position in the finalized parameter list.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn placeholder(&self) -> &ParameterId {
        &self.placeholder
    }

    pub fn accessor(&self) -> &ParameterAccessor {
        &self.accessor
    }

    pub(crate) fn set_index(&mut self, index: usize) {
        self.index = index;
    }
}

/// A skip or take descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum RowLimit {
    Literal(i64),
    Parameter(ParameterId),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectClause {
    pub skip: Option<RowLimit>,
    pub take: Option<RowLimit>,
}

/// One statement-level execution unit.
#[derive(Debug, Clone)]
pub struct SubQuery {
    statement: String,
    select: SelectClause,
    placeholders: Vec<ParameterId>,
    parameters: Vec<QueryParameter>,
}

impl SubQuery {
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            select: SelectClause::default(),
            placeholders: Vec::new(),
            parameters: Vec::new(),
        }
    }

    /// Sets the order in which the backend expects placeholder values.
    pub fn with_placeholders<I, P>(mut self, placeholders: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<ParameterId>,
    {
        self.placeholders = placeholders.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_parameter(
        mut self,
        placeholder: impl Into<ParameterId>,
        accessor: ParameterAccessor,
    ) -> Self {
        let index = self.parameters.len();
        self.parameters.push(QueryParameter {
            index,
            placeholder: placeholder.into(),
            accessor,
        });
        self
    }

    pub fn with_skip(mut self, skip: RowLimit) -> Self {
        self.select.skip = Some(skip);
        self
    }

    pub fn with_take(mut self, take: RowLimit) -> Self {
        self.select.take = Some(take);
        self
    }

    pub fn statement(&self) -> &str {
        &self.statement
    }

    pub fn select(&self) -> &SelectClause {
        &self.select
    }

    pub fn placeholders(&self) -> &[ParameterId] {
        &self.placeholders
    }

    pub fn parameters(&self) -> &[QueryParameter] {
        &self.parameters
    }

    pub(crate) fn parameters_mut(&mut self) -> &mut Vec<QueryParameter> {
        &mut self.parameters
    }

    /// Position of `placeholder` in the backend placeholder order.
    pub fn placeholder_position(&self, placeholder: &ParameterId) -> Option<usize> {
        self.placeholders.iter().position(|p| p == placeholder)
    }
}

/// A backend-bound plan made of one or more sub-queries.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    queries: Vec<SubQuery>,
    finalized: bool,
}

impl QueryPlan {
    pub fn new(queries: Vec<SubQuery>) -> Self {
        Self {
            queries,
            finalized: false,
        }
    }

    pub fn from_query(query: SubQuery) -> Self {
        Self::new(vec![query])
    }

    pub fn queries(&self) -> &[SubQuery] {
        &self.queries
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub(crate) fn into_queries(self) -> Vec<SubQuery> {
        self.queries
    }

    pub(crate) fn finalized(queries: Vec<SubQuery>) -> Self {
        Self {
            queries,
            finalized: true,
        }
    }

    /// The only sub-query of this plan.
    ///
    /// Fails with a plan-shape error when the plan holds any other number
    /// of sub-queries.
    pub fn sole_query(&self) -> Result<&SubQuery> {
        match self.queries.as_slice() {
            [query] => Ok(query),
            queries => Err(SluiceError::plan_shape(
                format!(
                    "Expected exactly one sub-query, plan has {}",
                    queries.len()
                ),
                ErrorContext::PlanShape {
                    sub_queries: queries.len(),
                    parameter: None,
                },
            )
            .with_hint("Batch statements must be split before execution")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_assigns_indices_in_insertion_order() {
        let query = SubQuery::new("SELECT * FROM t WHERE a = ? AND b = ?")
            .with_placeholders(["a", "b"])
            .with_parameter("b", ParameterAccessor::argument(1))
            .with_parameter("a", ParameterAccessor::argument(0));

        let indices: Vec<(usize, &str)> = query
            .parameters()
            .iter()
            .map(|p| (p.index(), p.placeholder().as_str()))
            .collect();
        assert_eq!(indices, vec![(0, "b"), (1, "a")]);
        assert_eq!(query.placeholder_position(&"b".into()), Some(1));
        assert_eq!(query.placeholder_position(&"c".into()), None);
    }

    #[test]
    fn test_argument_accessor() {
        let accessor = ParameterAccessor::argument(1);
        let args = CallArgs::new(vec![Value::Int(1), Value::Text("x".into())]);
        assert_eq!(accessor.evaluate(&args).unwrap(), Value::Text("x".into()));

        let err = accessor.evaluate(&CallArgs::empty()).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidParameter);
    }

    #[test]
    fn test_sole_query_rejects_batches() {
        let plan = QueryPlan::new(vec![SubQuery::new("SELECT 1"), SubQuery::new("SELECT 2")]);
        let err = plan.sole_query().unwrap_err();
        assert_eq!(err.code, ErrorCode::PlanShape);
        match err.context {
            Some(ErrorContext::PlanShape { sub_queries, .. }) => assert_eq!(sub_queries, 2),
            _ => panic!("Expected PlanShape context"),
        }

        let empty = QueryPlan::new(vec![]);
        assert!(empty.sole_query().is_err());

        let single = QueryPlan::from_query(SubQuery::new("SELECT 1"));
        assert_eq!(single.sole_query().unwrap().statement(), "SELECT 1");
    }
}
