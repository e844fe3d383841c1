//! Structured exit codes for scripts that wrap `sluice`.

/// Success (standard convention)
#[allow(dead_code)]
pub const SUCCESS: i32 = 0;

/// General error (fallback for unknown errors)
pub const GENERAL_ERROR: i32 = 1;

/// CLI usage error (invalid arguments, unparsable statement)
pub const USAGE_ERROR: i32 = 2;

/// Configuration error (YAML parse failure, invalid settings)
pub const CONFIG_ERROR: i32 = 3;

/// Source error (database missing or unreadable, fetch failure)
pub const SOURCE_ERROR: i32 = 4;

/// Query error (bad parameter, coercion failure, unsupported plan)
pub const QUERY_ERROR: i32 = 5;

/// The query was cancelled (Ctrl-C during `--async`)
pub const CANCELLED: i32 = 130;
