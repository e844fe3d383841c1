//! Parameter binding.
//!
//! Turns call arguments into the values a backend consumes, and builds the
//! skip/take count resolvers used by paging emulation.

use sluice_error::{ErrorCode, ErrorContext, Result, SluiceError};

use crate::plan::{ParameterAccessor, ParameterId, QueryParameter, RowLimit, SubQuery};
use crate::value::{CallArgs, Value};

/// Index of the parameter bound to `placeholder` in the finalized list.
pub fn parameter_index(query: &SubQuery, placeholder: &ParameterId) -> Result<usize> {
    query
        .parameters()
        .iter()
        .position(|p| p.placeholder() == placeholder)
        .ok_or_else(|| {
            SluiceError::plan_shape(
                format!(
                    "Paging parameter '{}' is not in the parameter list",
                    placeholder
                ),
                ErrorContext::PlanShape {
                    sub_queries: 1,
                    parameter: Some(placeholder.to_string()),
                },
            )
        })
}

/// Evaluates the values for every backend placeholder, in placeholder order.
///
/// Parameters the backend never sees are not evaluated.
pub fn bind_placeholders(query: &SubQuery, args: &CallArgs) -> Result<Vec<Value>> {
    query
        .placeholders()
        .iter()
        .map(|placeholder| {
            let index = query
                .parameters()
                .iter()
                .position(|p| p.placeholder() == placeholder)
                .ok_or_else(|| {
                    SluiceError::plan_shape(
                        format!("Placeholder '{}' has no bound parameter", placeholder),
                        ErrorContext::PlanShape {
                            sub_queries: 1,
                            parameter: Some(placeholder.to_string()),
                        },
                    )
                })?;
            query.parameters()[index].accessor().evaluate(args)
        })
        .collect()
}

/// Produces a skip or take count for one call.
#[derive(Debug, Clone)]
pub enum CountResolver {
    Constant(usize),
    Parameter {
        index: usize,
        placeholder: ParameterId,
        accessor: ParameterAccessor,
    },
}

impl CountResolver {
    /// Builds the resolver for `limit`, or `None` when a literal makes the
    /// limit a no-op (`<= 0`).
    pub fn for_limit(limit: &RowLimit, query: &SubQuery) -> Result<Option<Self>> {
        match limit {
            RowLimit::Literal(n) if *n <= 0 => Ok(None),
            RowLimit::Literal(n) => Ok(Some(CountResolver::Constant(
                usize::try_from(*n).unwrap_or(usize::MAX),
            ))),
            RowLimit::Parameter(placeholder) => {
                let index = parameter_index(query, placeholder)?;
                Ok(Some(Self::from_parameter(&query.parameters()[index])))
            }
        }
    }

    fn from_parameter(parameter: &QueryParameter) -> Self {
        CountResolver::Parameter {
            index: parameter.index(),
            placeholder: parameter.placeholder().clone(),
            accessor: parameter.accessor().clone(),
        }
    }

    /// Resolves the count against the live call arguments. Negative values
    /// resolve to zero.
    pub fn resolve(&self, args: &CallArgs) -> Result<usize> {
        match self {
            CountResolver::Constant(n) => Ok(*n),
            CountResolver::Parameter {
                index,
                placeholder,
                accessor,
            } => {
                let value = accessor.evaluate(args)?;
                count_from_value(&value).ok_or_else(|| {
                    SluiceError::new(
                        ErrorCode::InvalidParameter,
                        format!(
                            "Paging parameter '{}' must be an integer, got {}",
                            placeholder,
                            value.kind()
                        ),
                    )
                    .with_context(ErrorContext::Parameter {
                        index: *index,
                        placeholder: placeholder.to_string(),
                        reason: format!("non-integer value {}", value),
                    })
                })
            }
        }
    }
}

fn count_from_value(value: &Value) -> Option<usize> {
    let n = match value {
        Value::Int(i) => *i,
        Value::Text(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    Some(usize::try_from(n.max(0)).unwrap_or(usize::MAX))
}
