use serde::Deserialize;
use sluice_error::{ErrorContext, Result, SluiceError};
use validator::Validate;

// Default constants
pub const DEFAULT_READER_BUFFER: usize = 256;
pub const DEFAULT_SERVICE_NAME: &str = "sluice";
pub const DEFAULT_TELEMETRY_ENABLED: bool = false;
pub const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4317";
pub const ENV_PREFIX: &str = "SLUICE";

#[derive(Debug, Deserialize, Default, Clone, Validate)]
pub struct AppConfig {
    #[serde(default)]
    #[validate(nested)]
    pub execution: ExecutionSettings,
    #[serde(default)]
    #[validate(nested)]
    pub telemetry: TelemetryConfig,
}

/// Knobs for the execution layer.
#[derive(Debug, Deserialize, Clone, Validate)]
pub struct ExecutionSettings {
    /// Emulate skip in memory even when the backend could do it.
    #[serde(default)]
    pub emulate_skip: bool,

    /// Emulate take in memory even when the backend could do it.
    #[serde(default)]
    pub emulate_take: bool,

    /// Capacity of the bounded channel between a streaming reader and its worker.
    #[serde(default = "default_reader_buffer")]
    #[validate(range(min = 1, max = 65536))]
    pub reader_buffer: usize,

    #[serde(default = "default_slow_mode_warnings")]
    pub slow_mode_warnings: bool,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            emulate_skip: false,
            emulate_take: false,
            reader_buffer: default_reader_buffer(),
            slow_mode_warnings: default_slow_mode_warnings(),
        }
    }
}

fn default_reader_buffer() -> usize {
    DEFAULT_READER_BUFFER
}

fn default_slow_mode_warnings() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone, Validate)]
pub struct TelemetryConfig {
    #[serde(default = "default_telemetry_enabled")]
    pub enabled: bool,

    #[serde(default = "default_otlp_endpoint")]
    #[validate(url)]
    pub endpoint: String,

    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: default_telemetry_enabled(),
            endpoint: default_otlp_endpoint(),
            service_name: default_service_name(),
        }
    }
}

fn default_telemetry_enabled() -> bool {
    DEFAULT_TELEMETRY_ENABLED
}

fn default_otlp_endpoint() -> String {
    DEFAULT_OTLP_ENDPOINT.to_string()
}

fn default_service_name() -> String {
    DEFAULT_SERVICE_NAME.to_string()
}

impl AppConfig {
    /// Loads configuration from `path` (if it exists) layered under
    /// `SLUICE__`-prefixed environment variables, then validates it.
    ///
    /// `SLUICE__EXECUTION__EMULATE_TAKE=true` maps to `execution.emulate_take`.
    pub fn from_file(path: &str) -> Result<Self> {
        let builder = config::Config::builder();

        let builder = if std::path::Path::new(path).exists() {
            builder.add_source(config::File::with_name(path))
        } else {
            builder
        };

        let builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let app_config: AppConfig = builder
            .build()
            .and_then(|cfg| cfg.try_deserialize())
            .map_err(|e| with_file_path(SluiceError::from(e), path))?;

        app_config
            .validate()
            .map_err(|e| with_file_path(SluiceError::from(e), path))?;

        Ok(app_config)
    }
}

fn with_file_path(mut err: SluiceError, path: &str) -> SluiceError {
    if let Some(ErrorContext::Config { file_path, .. }) = &mut err.context {
        *file_path = Some(path.to_string());
    }
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_error::ErrorCode;
    use std::io::Write;

    #[test]
    fn test_app_config_validation() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.execution.reader_buffer, DEFAULT_READER_BUFFER);
        assert!(config.execution.slow_mode_warnings);
    }

    #[test]
    fn test_telemetry_config_validation() {
        let config = TelemetryConfig {
            endpoint: "not_a_url".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reader_buffer_range() {
        let config = ExecutionSettings {
            reader_buffer: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            "execution:\n  emulate_take: true\n  reader_buffer: 16\ntelemetry:\n  service_name: runner-test"
        )
        .unwrap();

        let config = AppConfig::from_file(file.path().to_str().unwrap()).unwrap();
        assert!(config.execution.emulate_take);
        assert!(!config.execution.emulate_skip);
        assert_eq!(config.execution.reader_buffer, 16);
        assert_eq!(config.telemetry.service_name, "runner-test");
    }

    #[test]
    fn test_invalid_file_reports_path() {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .unwrap();
        writeln!(file, "execution:\n  reader_buffer: 0").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let err = AppConfig::from_file(&path).unwrap_err();
        assert_eq!(err.code, ErrorCode::SchemaViolation);
        match err.context {
            Some(ErrorContext::Config { file_path, .. }) => {
                assert_eq!(file_path.as_deref(), Some(path.as_str()))
            }
            _ => panic!("Expected Config context"),
        }
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = AppConfig::from_file("/nonexistent/sluice.yaml").unwrap();
        assert_eq!(config.telemetry.endpoint, DEFAULT_OTLP_ENDPOINT);
    }
}
