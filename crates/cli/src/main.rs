//! Sluice CLI: run a parameterized statement against a SQLite database
//! through the Sluice query runner.
//!
//! # Commands
//!
//! - `query`: Compile and run a statement, printing rows as they stream.
//!   `--skip`/`--take` page natively or in memory (`--emulate`), and
//!   `--async` switches to the cancellable push driver.
//! - `config`: Show the effective configuration.

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use owo_colors::OwoColorize;
use sluice_common::config::AppConfig;
use sluice_common::telemetry;
use sluice_error::{ErrorCategory, ErrorCode, SluiceError};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod exit_codes;
mod output;

use output::OutputFormat;

#[derive(Parser)]
#[command(name = "sluice")]
#[command(about = "Run parameterized queries through the Sluice runner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (human, json, yaml)
    #[arg(long, global = true, value_enum, default_value = "human")]
    output: OutputFormat,

    /// Configuration file, layered under SLUICE__* environment variables
    #[arg(long, global = true, env = "SLUICE_CONFIG", default_value = "sluice.yaml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a statement and print its rows
    Query(commands::QueryArgs),
    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    dotenv().ok();

    let cli = Cli::parse();

    let result = run_cli(&cli).await;
    telemetry::shutdown_telemetry();

    if let Err(e) = result {
        let exit_code = map_error_to_exit_code(&e);
        if cli.output.is_machine_readable() {
            output::print_error(cli.output, output::ErrorBody::from_error(&e, exit_code)).ok();
        } else {
            eprintln!("{} {}", "Error:".red().bold(), e);
            if let Some(hint) = e.downcast_ref::<SluiceError>().and_then(|s| s.hint.as_ref()) {
                eprintln!("  {} {}", "hint:".cyan(), hint);
            }
        }
        std::process::exit(exit_code);
    }

    Ok(())
}

fn init_tracing(config: &AppConfig) -> anyhow::Result<()> {
    let telemetry_layer = telemetry::layer_from_config(&config.telemetry)?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(telemetry_layer)
        .try_init()?;
    Ok(())
}

fn map_error_to_exit_code(e: &anyhow::Error) -> i32 {
    if let Some(err) = e.downcast_ref::<SluiceError>() {
        if err.is_cancelled() {
            return exit_codes::CANCELLED;
        }
        if err.code == ErrorCode::SyntaxError {
            return exit_codes::USAGE_ERROR;
        }
        return match err.code.category() {
            ErrorCategory::Source => exit_codes::SOURCE_ERROR,
            ErrorCategory::Query => exit_codes::QUERY_ERROR,
            ErrorCategory::Config => exit_codes::CONFIG_ERROR,
            ErrorCategory::Internal => exit_codes::GENERAL_ERROR,
            _ => exit_codes::GENERAL_ERROR,
        };
    }
    exit_codes::GENERAL_ERROR
}

async fn run_cli(cli: &Cli) -> anyhow::Result<()> {
    let config = AppConfig::from_file(&cli.config)?;
    init_tracing(&config)?;

    match &cli.command {
        Commands::Query(args) => commands::run_query(args, &config, cli.output).await?,
        Commands::Config => commands::show_config(&cli.config, &config, cli.output)?,
    }
    Ok(())
}
