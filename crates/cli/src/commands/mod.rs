//! CLI command implementations.

mod config;
mod query;

pub use config::show_config;
pub use query::{run_query, QueryArgs};
