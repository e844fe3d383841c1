//! Structured output handling for CLI commands.
//!
//! Human output is written by each command while it runs. JSON and YAML
//! output is a single document per invocation wrapped in an [`Envelope`].

use owo_colors::OwoColorize;
use serde::Serialize;
use sluice_error::SluiceError;
use sluice_runner::Value;

#[derive(clap::ValueEnum, Clone, Debug, Default, PartialEq, Eq, Copy)]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
    Yaml,
}

impl OutputFormat {
    /// Returns true if the output format is intended for machine consumption
    pub fn is_machine_readable(&self) -> bool {
        !matches!(self, OutputFormat::Human)
    }
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    Error,
}

#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub message: String,
    pub exit_code: i32,
    /// `SLUICE-XXXX` when the failure came from the runner.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorBody {
    pub fn from_error(e: &anyhow::Error, exit_code: i32) -> Self {
        match e.downcast_ref::<SluiceError>() {
            Some(err) => Self {
                message: err.message.clone(),
                exit_code,
                code: Some(err.code.to_string()),
                hint: err.hint.clone(),
            },
            None => Self {
                message: e.to_string(),
                exit_code,
                code: None,
                hint: None,
            },
        }
    }
}

/// Top-level document for machine-readable output.
#[derive(Serialize)]
pub struct Envelope<T> {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    #[serde(flatten)]
    pub data: Option<T>,
}

fn write_document<T: Serialize>(format: OutputFormat, document: &T) -> anyhow::Result<()> {
    match format {
        OutputFormat::Human => {}
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(document)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(document)?),
    }
    Ok(())
}

pub fn print_success<T: Serialize>(format: OutputFormat, data: T) -> anyhow::Result<()> {
    write_document(
        format,
        &Envelope {
            status: Status::Success,
            error: None,
            data: Some(data),
        },
    )
}

/// Machine formats only. In Human mode main's error handler prints to stderr.
pub fn print_error(format: OutputFormat, error: ErrorBody) -> anyhow::Result<()> {
    write_document(
        format,
        &Envelope::<()> {
            status: Status::Error,
            error: Some(error),
            data: None,
        },
    )
}

/// One tab-separated line per row.
pub fn format_row(row: &[Value]) -> String {
    row.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\t")
}

pub fn print_warnings(warnings: &[String]) {
    for warning in warnings {
        eprintln!("{} {}", "warning:".yellow().bold(), warning);
    }
}
