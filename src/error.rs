//! Unified error handling for the grid bot
//!
//! `TradingError` covers everything that can stop a command outright (bad
//! config, unreachable database, dead stream). Expected exchange rejections
//! travel as [`GatewayError`] and are handled by the order controller instead.

use std::io;

use thiserror::Error;

use crate::clients::GatewayError;
use crate::config::ConfigError;

/// Main error type for the grid bot
#[derive(Debug, Error)]
pub enum TradingError {
    // Configuration errors
    #[error("Configuration file not found: {0}")]
    ConfigNotFound(String),

    #[error("Configuration parse error: {0}")]
    ConfigParse(String),

    #[error("Configuration validation error: {0}")]
    ConfigValidation(String),

    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),

    // Database errors
    #[error("Database connection error: {0}")]
    DatabaseConnection(String),

    #[error("Database query error: {0}")]
    DatabaseQuery(String),

    #[error("Database migration error: {0}")]
    DatabaseMigration(String),

    // Exchange errors
    #[error("API connection error: {0}")]
    ApiConnection(String),

    #[error("API authentication failed: {0}")]
    ApiAuthentication(String),

    #[error("API response error: {0}")]
    ApiResponse(String),

    #[error("Execution report stream closed: {0}")]
    StreamClosed(String),

    // IO errors
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("File read error: {0}")]
    FileRead(String),

    #[error("File write error: {0}")]
    FileWrite(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TradingError {
    /// Get a user-friendly error message with helpful context
    pub fn user_message(&self) -> String {
        match self {
            TradingError::ConfigNotFound(path) => {
                format!(
                    "Configuration file not found: {}\n\n\
                    💡 Quick fix:\n\
                    1. Run: grid-bot init\n\
                    2. Edit config.toml with your API keys and grids\n\
                    3. Try again",
                    path
                )
            }
            TradingError::ConfigValidation(msg) => {
                format!(
                    "Configuration validation error: {}\n\n\
                    💡 Check config.toml for:\n\
                    - step between 0 and 1\n\
                    - positive quote, bounds and ratios\n\
                    - bottom below top",
                    msg
                )
            }
            TradingError::ApiAuthentication(msg) => {
                format!(
                    "API authentication failed: {}\n\n\
                    💡 Check:\n\
                    - API_KEY / API_SECRET environment variables\n\
                    - Keys have spot trading permission\n\
                    - rest_url points at the right environment",
                    msg
                )
            }
            TradingError::DatabaseConnection(msg) => {
                format!(
                    "Database connection failed: {}\n\n\
                    💡 Try:\n\
                    1. Run: grid-bot init\n\
                    2. Check data/ directory permissions",
                    msg
                )
            }
            _ => self.to_string(),
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            TradingError::ConfigNotFound(_)
            | TradingError::ConfigParse(_)
            | TradingError::ConfigValidation(_)
            | TradingError::UnknownSymbol(_) => "config",

            TradingError::DatabaseConnection(_)
            | TradingError::DatabaseQuery(_)
            | TradingError::DatabaseMigration(_) => "database",

            TradingError::ApiConnection(_)
            | TradingError::ApiAuthentication(_)
            | TradingError::ApiResponse(_)
            | TradingError::StreamClosed(_) => "api",

            TradingError::FileNotFound(_)
            | TradingError::FileRead(_)
            | TradingError::FileWrite(_) => "io",

            TradingError::Internal(_) => "internal",
        }
    }
}

impl From<io::Error> for TradingError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => TradingError::FileNotFound(err.to_string()),
            io::ErrorKind::PermissionDenied => TradingError::FileRead(err.to_string()),
            _ => TradingError::Internal(format!("IO error: {}", err)),
        }
    }
}

impl From<rusqlite::Error> for TradingError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(_, Some(msg)) => TradingError::DatabaseQuery(msg),
            rusqlite::Error::SqliteFailure(code, None) => {
                TradingError::DatabaseConnection(code.to_string())
            }
            other => TradingError::DatabaseQuery(other.to_string()),
        }
    }
}

impl From<ConfigError> for TradingError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::FileRead(msg) => TradingError::ConfigNotFound(msg),
            ConfigError::FileWrite(msg) => TradingError::FileWrite(msg),
            ConfigError::Parse(msg) | ConfigError::Serialize(msg) => TradingError::ConfigParse(msg),
            ConfigError::Validation(msg) => TradingError::ConfigValidation(msg),
            ConfigError::UnknownSymbol(symbol) => TradingError::UnknownSymbol(symbol),
        }
    }
}

impl From<GatewayError> for TradingError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Unauthorized(msg) => TradingError::ApiAuthentication(msg),
            GatewayError::Unreachable(msg) => TradingError::ApiConnection(msg),
            other => TradingError::ApiResponse(other.to_string()),
        }
    }
}

/// Result type alias using TradingError
pub type TradingResult<T> = Result<T, TradingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TradingError::ConfigNotFound("config.toml".to_string());
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn test_error_category() {
        assert_eq!(TradingError::ConfigValidation("x".into()).category(), "config");
        assert_eq!(TradingError::DatabaseQuery("x".into()).category(), "database");
        assert_eq!(TradingError::StreamClosed("x".into()).category(), "api");
    }

    #[test]
    fn test_user_message() {
        let msg = TradingError::ConfigNotFound("grid.toml".into()).user_message();
        assert!(msg.contains("grid.toml"));
        assert!(msg.contains("💡"));
    }

    #[test]
    fn test_config_error_conversion() {
        let err: TradingError = ConfigError::UnknownSymbol("FOOUSDT".into()).into();
        assert!(matches!(err, TradingError::UnknownSymbol(ref s) if s == "FOOUSDT"));
    }

    #[test]
    fn test_gateway_error_conversion() {
        let err: TradingError = GatewayError::Unauthorized("code=-2015".into()).into();
        assert!(matches!(err, TradingError::ApiAuthentication(_)));
        assert!(err.user_message().contains("API_KEY"));

        let err: TradingError = GatewayError::Unreachable("connection refused".into()).into();
        assert!(matches!(err, TradingError::ApiConnection(_)));
        assert_eq!(err.category(), "api");

        let err: TradingError = GatewayError::Other("status=503".into()).into();
        assert!(matches!(err, TradingError::ApiResponse(_)));
    }

    #[test]
    fn test_io_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "test");
        let trading_err: TradingError = io_err.into();
        assert!(matches!(trading_err, TradingError::FileNotFound(_)));
    }
}
