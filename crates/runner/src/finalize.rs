//! Plan finalization.
//!
//! Runs the backend's optimization passes over every sub-query, then orders
//! each parameter list the way the backend will consume placeholder values.

use sluice_error::Result;

use crate::plan::{QueryPlan, SubQuery};

/// Backend-specific rewrite applied to each sub-query during finalization.
pub trait PlanOptimizer: Send + Sync {
    fn name(&self) -> &'static str;

    fn optimize(&self, query: SubQuery) -> Result<SubQuery>;
}

/// Leaves sub-queries untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityOptimizer;

impl PlanOptimizer for IdentityOptimizer {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn optimize(&self, query: SubQuery) -> Result<SubQuery> {
        Ok(query)
    }
}

/// Normalizes `plan` for execution.
///
/// Parameters are stable-sorted by the position of their placeholder in the
/// backend order and then renumbered `0..n`. Parameters whose placeholder the
/// backend never sees (for example an emulated take) sort first. Running this
/// on an already finalized plan yields the same order.
pub fn finalize(plan: QueryPlan, optimizer: &dyn PlanOptimizer) -> Result<QueryPlan> {
    let was_finalized = plan.is_finalized();
    let mut queries = Vec::with_capacity(plan.queries().len());

    for query in plan.into_queries() {
        let mut query = optimizer.optimize(query)?;

        let mut parameters = std::mem::take(query.parameters_mut());
        parameters.sort_by_key(|p| query.placeholder_position(p.placeholder()));
        for (index, parameter) in parameters.iter_mut().enumerate() {
            parameter.set_index(index);
        }
        *query.parameters_mut() = parameters;

        queries.push(query);
    }

    tracing::debug!(
        optimizer = optimizer.name(),
        sub_queries = queries.len(),
        refinalized = was_finalized,
        "Finalized query plan"
    );

    Ok(QueryPlan::finalized(queries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{ParameterAccessor, ParameterId, RowLimit};

    fn order(plan: &QueryPlan) -> Vec<(usize, String)> {
        plan.queries()[0]
            .parameters()
            .iter()
            .map(|p| (p.index(), p.placeholder().to_string()))
            .collect()
    }

    fn sample() -> QueryPlan {
        QueryPlan::from_query(
            SubQuery::new("SELECT * FROM t WHERE a = ? AND b = ?")
                .with_placeholders(["a", "b"])
                .with_parameter("b", ParameterAccessor::argument(1))
                .with_parameter("take", ParameterAccessor::argument(2))
                .with_parameter("a", ParameterAccessor::argument(0))
                .with_take(RowLimit::Parameter(ParameterId::new("take"))),
        )
    }

    #[test]
    fn test_parameters_follow_placeholder_order() {
        let plan = finalize(sample(), &IdentityOptimizer).unwrap();
        assert!(plan.is_finalized());
        assert_eq!(
            order(&plan),
            vec![
                (0, "take".to_string()),
                (1, "a".to_string()),
                (2, "b".to_string())
            ]
        );
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let once = finalize(sample(), &IdentityOptimizer).unwrap();
        let first = order(&once);
        let twice = finalize(once, &IdentityOptimizer).unwrap();
        assert_eq!(order(&twice), first);
    }

    struct ReversePlaceholders;

    impl PlanOptimizer for ReversePlaceholders {
        fn name(&self) -> &'static str {
            "reverse"
        }

        fn optimize(&self, query: SubQuery) -> Result<SubQuery> {
            let mut placeholders = query.placeholders().to_vec();
            placeholders.reverse();
            Ok(query.with_placeholders(placeholders))
        }
    }

    #[test]
    fn test_optimizer_runs_before_sorting() {
        let plan = finalize(sample(), &ReversePlaceholders).unwrap();
        assert_eq!(
            order(&plan),
            vec![
                (0, "take".to_string()),
                (1, "b".to_string()),
                (2, "a".to_string())
            ]
        );
    }

    #[test]
    fn test_finalize_keeps_every_sub_query() {
        let plan = QueryPlan::new(vec![SubQuery::new("SELECT 1"), SubQuery::new("SELECT 2")]);
        let plan = finalize(plan, &IdentityOptimizer).unwrap();
        assert_eq!(plan.queries().len(), 2);
        assert!(plan.sole_query().is_err());
    }
}
