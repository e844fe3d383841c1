//! Data source implementations.
//!
//! | Source | Implementation | Description |
//! |--------|----------------|-------------|
//! | memory | `MemorySource` | Fixed in-process rows; records reader open/close counts |
//! | sqlite | `SqliteSource` | `rusqlite` statement streamed through a bounded channel |

use sluice_error::{ErrorCode, ErrorContext, SluiceError};

pub mod memory;
pub mod sqlite;

/// Builds a source error carrying the source name and failed operation.
pub(crate) fn source_error(
    code: ErrorCode,
    source_name: &str,
    operation: &str,
    cause: impl std::fmt::Display,
) -> SluiceError {
    SluiceError::new(
        code,
        format!("Source '{}' failed to {}: {}", source_name, operation, cause),
    )
    .with_context(ErrorContext::Source {
        source_name: source_name.to_string(),
        operation: operation.to_string(),
    })
}
