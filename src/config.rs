// Configuration management for the grid bot

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Per-symbol grid settings. Every field is optional; the quantizer fills in
/// defaults from the exchange rules and the starting price.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    /// Filled in from the `[grids.<SYMBOL>]` table key.
    #[serde(skip)]
    pub symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bottom: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bottom_ratio: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_ratio: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sell_above: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buy_below: Option<Decimal>,
}

impl GridConfig {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    #[serde(default = "default_rest_url")]
    pub rest_url: String,
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    #[serde(default = "default_recv_window")]
    pub recv_window_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_grace_period")]
    pub grace_period_secs: u64,
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
    #[serde(default = "default_keepalive")]
    pub listen_key_keepalive_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_file_log_level")]
    pub file_level: String,
    #[serde(default = "default_log_dir")]
    pub directory: String,
    #[serde(default = "default_true")]
    pub log_to_file: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_commission_rate")]
    pub commission_rate: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub grids: BTreeMap<String, GridConfig>,
}

// Default value functions
fn default_rest_url() -> String { "https://api.binance.com".to_string() }
fn default_ws_url() -> String { "wss://stream.binance.com:9443/ws".to_string() }
fn default_recv_window() -> u64 { 5000 }
fn default_grace_period() -> u64 { 5 }
fn default_shutdown_grace() -> u64 { 10 }
fn default_keepalive() -> u64 { 30 * 60 }
fn default_db_path() -> String { "data/grid_bot.db".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_file_log_level() -> String { "debug".to_string() }
fn default_log_dir() -> String { "logs".to_string() }
fn default_true() -> bool { true }
fn default_commission_rate() -> Decimal { Decimal::new(1, 3) }

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_secret: String::new(),
            rest_url: default_rest_url(),
            ws_url: default_ws_url(),
            recv_window_ms: default_recv_window(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: default_grace_period(),
            shutdown_grace_secs: default_shutdown_grace(),
            listen_key_keepalive_secs: default_keepalive(),
        }
    }
}

impl EngineConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.listen_key_keepalive_secs)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_db_path() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_level: default_file_log_level(),
            directory: default_log_dir(),
            log_to_file: true,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self { commission_rate: default_commission_rate() }
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut grids = BTreeMap::new();
        grids.insert("BTCUSDT".to_string(), GridConfig::new("BTCUSDT"));
        Self {
            api: ApiConfig::default(),
            engine: EngineConfig::default(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            report: ReportConfig::default(),
            grids,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(&path)
            .map_err(|e| ConfigError::FileRead(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(content)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;

        for (symbol, grid) in config.grids.iter_mut() {
            grid.symbol = symbol.clone();
        }

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        fs::write(path, content)
            .map_err(|e| ConfigError::FileWrite(e.to_string()))?;

        Ok(())
    }

    /// Load configuration from file, or create default if file doesn't exist
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            let config = Self::default();
            config.to_file(&path)?;
            Ok(config)
        }
    }

    /// Credentials from `API_KEY` / `API_SECRET` win over the file
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("API_KEY") {
            self.api.api_key = key;
        }
        if let Ok(secret) = std::env::var("API_SECRET") {
            self.api.api_secret = secret;
        }
    }

    /// Check that credentials are present before going live
    pub fn require_credentials(&self) -> Result<(), ConfigError> {
        if self.api.api_key.trim().is_empty() || self.api.api_secret.trim().is_empty() {
            return Err(ConfigError::Validation(
                "api_key and api_secret must be set (config file or API_KEY/API_SECRET)".to_string(),
            ));
        }
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.grace_period_secs == 0 {
            return Err(ConfigError::Validation("grace_period_secs must be greater than 0".to_string()));
        }

        if self.report.commission_rate < Decimal::ZERO || self.report.commission_rate >= Decimal::ONE {
            return Err(ConfigError::Validation("commission_rate must be in [0, 1)".to_string()));
        }

        for (symbol, grid) in &self.grids {
            validate_grid(symbol, grid)?;
        }

        Ok(())
    }
}

// Conflicting sell_above / buy_below is deliberately not rejected here: the
// engine reports it at startup and leaves that grid idle.
fn validate_grid(symbol: &str, grid: &GridConfig) -> Result<(), ConfigError> {
    if let Some(step) = grid.step {
        if step <= Decimal::ZERO || step >= Decimal::ONE {
            return Err(ConfigError::Validation(format!("{}: step must be in (0, 1)", symbol)));
        }
    }

    let positive = [
        ("quote", grid.quote),
        ("bottom", grid.bottom),
        ("bottom_ratio", grid.bottom_ratio),
        ("top", grid.top),
        ("top_ratio", grid.top_ratio),
        ("sell_above", grid.sell_above),
        ("buy_below", grid.buy_below),
    ];
    for (name, value) in positive {
        if matches!(value, Some(v) if v <= Decimal::ZERO) {
            return Err(ConfigError::Validation(format!("{}: {} must be positive", symbol, name)));
        }
    }

    if let (Some(bottom), Some(top)) = (grid.bottom, grid.top) {
        if bottom >= top {
            return Err(ConfigError::Validation(format!("{}: bottom must be below top", symbol)));
        }
    }

    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(String),

    #[error("Failed to write config file: {0}")]
    FileWrite(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Failed to serialize config: {0}")]
    Serialize(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Symbol {0} is missing from the exchange trading rules")]
    UnknownSymbol(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_grid_symbols_filled_from_keys() {
        let config = Config::from_toml_str(
            r#"
            [grids.ETHUSDT]
            step = 0.01
            quote = "25"

            [grids.DOGEUSDT]
            "#,
        )
        .unwrap();

        let eth = &config.grids["ETHUSDT"];
        assert_eq!(eth.symbol, "ETHUSDT");
        assert_eq!(eth.step, Some(dec!(0.01)));
        assert_eq!(eth.quote, Some(dec!(25)));
        assert_eq!(config.grids["DOGEUSDT"].step, None);
    }

    #[test]
    fn test_defaults_applied() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.engine.grace_period(), Duration::from_secs(5));
        assert_eq!(config.report.commission_rate, dec!(0.001));
        assert!(config.grids.is_empty());
    }

    #[test]
    fn test_invalid_step_rejected() {
        let err = Config::from_toml_str("[grids.BTCUSDT]\nstep = 1.5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_inverted_band_rejected() {
        let err = Config::from_toml_str("[grids.BTCUSDT]\nbottom = 200\ntop = 100\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_conflicting_anchors_still_load() {
        let config = Config::from_toml_str(
            "[grids.BTCUSDT]\nsell_above = 100\nbuy_below = 90\n",
        )
        .unwrap();
        assert!(config.grids["BTCUSDT"].sell_above.is_some());
        assert!(config.grids["BTCUSDT"].buy_below.is_some());
    }

    #[test]
    fn test_missing_credentials() {
        let config = Config::default();
        assert!(config.require_credentials().is_err());
    }
}
