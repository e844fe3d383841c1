//! # Error Contexts
//!
//! Structured metadata attached to errors so callers can react without parsing messages.

use serde::{Deserialize, Serialize};

/// Structured context for errors.
///
/// Each variant provides specific fields relevant to that error type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ErrorContext {
    /// Context for SLUICE-2009 (PlanShape)
    PlanShape {
        sub_queries: usize,
        /// Placeholder of a skip/take parameter that could not be located
        parameter: Option<String>,
    },

    /// Context for SLUICE-2010 (CoercionFailed)
    Coercion {
        ordinal: usize,
        expected: String,
        actual: String,
        /// Description of the projection that was active
        projection: Option<String>,
    },

    /// Context for SLUICE-2011 (InvalidParameter)
    Parameter {
        index: usize,
        placeholder: String,
        reason: String,
    },

    /// Context for data source errors (SLUICE-1001, 1006, 1007)
    Source {
        source_name: String,
        operation: String,
    },

    /// Context for SLUICE-3001/3002 (config errors)
    Config {
        file_path: Option<String>,
        field: Option<String>,
    },
}
