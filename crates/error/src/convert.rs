use crate::{ErrorCode, ErrorContext, SluiceError};

impl From<std::io::Error> for SluiceError {
    fn from(err: std::io::Error) -> Self {
        let code = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorCode::SourceNotFound,
            _ => ErrorCode::SourceFailure,
        };
        SluiceError::new(code, err.to_string())
    }
}

impl From<serde_json::Error> for SluiceError {
    fn from(err: serde_json::Error) -> Self {
        SluiceError::new(ErrorCode::SerializationFailed, err.to_string())
    }
}

impl From<config::ConfigError> for SluiceError {
    fn from(err: config::ConfigError) -> Self {
        let field = match &err {
            config::ConfigError::NotFound(key) => Some(key.clone()),
            config::ConfigError::Type { key, .. } => key.clone(),
            _ => None,
        };
        SluiceError::new(ErrorCode::InvalidConfig, err.to_string()).with_context(
            ErrorContext::Config {
                file_path: None,
                field,
            },
        )
    }
}

impl From<validator::ValidationErrors> for SluiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        let field = err.field_errors().keys().next().map(|k| k.to_string());
        SluiceError::new(
            ErrorCode::SchemaViolation,
            format!("Configuration validation failed: {}", err),
        )
        .with_context(ErrorContext::Config {
            file_path: None,
            field,
        })
    }
}
