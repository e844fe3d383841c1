use serde::Serialize;
use sluice_common::config::AppConfig;

use crate::output::{self, OutputFormat};

#[derive(Serialize, Default)]
pub struct ConfigReport {
    pub file: String,
    pub emulate_skip: bool,
    pub emulate_take: bool,
    pub reader_buffer: usize,
    pub slow_mode_warnings: bool,
    pub telemetry_enabled: bool,
    pub telemetry_endpoint: String,
    pub service_name: String,
}

impl ConfigReport {
    fn new(file: &str, config: &AppConfig) -> Self {
        Self {
            file: file.to_string(),
            emulate_skip: config.execution.emulate_skip,
            emulate_take: config.execution.emulate_take,
            reader_buffer: config.execution.reader_buffer,
            slow_mode_warnings: config.execution.slow_mode_warnings,
            telemetry_enabled: config.telemetry.enabled,
            telemetry_endpoint: config.telemetry.endpoint.clone(),
            service_name: config.telemetry.service_name.clone(),
        }
    }
}

/// Prints the effective configuration after file and environment layering.
/// Loading already validated it.
pub fn show_config(file: &str, config: &AppConfig, format: OutputFormat) -> anyhow::Result<()> {
    let report = ConfigReport::new(file, config);
    if format.is_machine_readable() {
        return output::print_success(format, report);
    }

    println!("Configuration ({})", report.file);
    println!("  execution.emulate_skip       {}", report.emulate_skip);
    println!("  execution.emulate_take       {}", report.emulate_take);
    println!("  execution.reader_buffer      {}", report.reader_buffer);
    println!("  execution.slow_mode_warnings {}", report.slow_mode_warnings);
    println!("  telemetry.enabled            {}", report.telemetry_enabled);
    println!("  telemetry.endpoint           {}", report.telemetry_endpoint);
    println!("  telemetry.service_name       {}", report.service_name);
    Ok(())
}
