//! Common utilities shared across Sluice crates.
//!
//! - **Configuration**: Strongly typed application configuration (`config`).
//! - **Telemetry**: Observability setup (`telemetry`).
//! - **Warnings**: Task-local collection of non-fatal query warnings (`warnings`).
pub mod config;
pub mod telemetry;
pub mod warnings;

pub use crate::config::{AppConfig, ExecutionSettings, TelemetryConfig};
