use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, time::Duration};
use validator::{Validate, ValidationError};

use crate::optimizer::SolverKind;

/// Built-in defaults, overridden by the config file and then the environment.
pub const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Config {
    #[validate(nested)]
    pub simulation: SimulationConfig,
    #[validate(nested)]
    pub optimizer: OptimizerConfig,
    #[validate(nested)]
    pub plant: PlantConfig,
    #[validate(nested)]
    pub grid: GridConfig,
    #[validate(nested)]
    pub sinks: SinksConfig,
    #[validate(nested)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

pub const DEFAULT_LOG_FILTER: &str = "info,hyper=warn,reqwest=warn,tower_http=info,minilp=warn";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, used when `RUST_LOG` is unset.
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            format: LogFormat::Json,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SimulationConfig {
    #[validate(range(min = 1))]
    pub duration_minutes: u64,
    #[validate(range(min = 1))]
    pub update_interval_seconds: u64,
    pub random_seed: Option<u64>,
}

impl SimulationConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_minutes * 60)
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct OptimizerConfig {
    /// Plant-wide reduction ceiling, e.g. 0.3 for 30 %.
    #[validate(range(exclusive_min = 0.0, exclusive_max = 1.0))]
    pub max_power_reduction: f64,
    #[serde(default)]
    pub solver: SolverKind,
    /// Only used by the projected-gradient solver.
    #[validate(range(min = 1))]
    pub max_iterations: usize,
    #[validate(range(exclusive_min = 0.0))]
    pub tolerance: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_power_reduction: 0.3,
            solver: SolverKind::LinearProgram,
            max_iterations: 200,
            tolerance: 1e-6,
        }
    }
}

/// Inclusive `[min, max]` range, written as a two-element array in TOML.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange(pub f64, pub f64);

impl ValueRange {
    pub fn min(&self) -> f64 {
        self.0
    }

    pub fn max(&self) -> f64 {
        self.1
    }
}

fn validate_range(range: &ValueRange) -> Result<(), ValidationError> {
    if !range.0.is_finite() || !range.1.is_finite() {
        return Err(ValidationError::new("range_not_finite"));
    }
    if range.0 < 0.0 {
        return Err(ValidationError::new("range_negative"));
    }
    if range.0 > range.1 {
        return Err(ValidationError::new("range_inverted"));
    }
    Ok(())
}

/// Attribute ranges must start above zero: the optimizer scales them.
fn validate_positive_range(range: &ValueRange) -> Result<(), ValidationError> {
    validate_range(range)?;
    if range.0 <= 0.0 {
        return Err(ValidationError::new("range_not_positive"));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PlantConfig {
    pub pump_count: usize,
    #[validate(custom(function = "validate_range"))]
    pub pump_power_range: ValueRange,
    #[validate(custom(function = "validate_positive_range"))]
    pub pump_efficiency_range: ValueRange,
    pub basin_count: usize,
    #[validate(custom(function = "validate_range"))]
    pub basin_power_range: ValueRange,
    #[validate(custom(function = "validate_positive_range"))]
    pub dissolved_oxygen_range: ValueRange,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct GridConfig {
    #[validate(custom(function = "validate_range"))]
    pub demand_range: ValueRange,
    #[validate(custom(function = "validate_range"))]
    pub energy_price_range: ValueRange,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SinksConfig {
    #[validate(nested)]
    pub iot_agent: IotAgentConfig,
    #[validate(nested)]
    pub dashboard: DashboardConfig,
    #[validate(nested)]
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct IotAgentConfig {
    pub enabled: bool,
    #[validate(url)]
    pub base_url: String,
    #[validate(length(min = 1))]
    pub api_key: String,
    pub fiware_service: String,
    pub fiware_servicepath: String,
    #[validate(range(min = 1))]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DashboardConfig {
    pub enabled: bool,
    #[validate(url)]
    pub url: String,
    #[validate(range(min = 1))]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct HistoryConfig {
    #[validate(range(min = 1, max = 87600))]
    pub retention_hours: u64,
    #[validate(range(min = 1))]
    pub max_records: usize,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ServerConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    #[validate(range(min = 1))]
    pub request_timeout_secs: u64,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

impl Config {
    /// Loads defaults, then `$DRT_CONFIG` (or `config/default.toml`), then
    /// `DRT__`-prefixed environment variables.
    pub fn load() -> Result<Self> {
        let path = std::env::var("DRT_CONFIG").unwrap_or_else(|_| "config/default.toml".into());
        let figment = Figment::new()
            .merge(Toml::string(DEFAULT_CONFIG))
            .merge(Toml::file(path))
            .merge(Env::prefixed("DRT__").split("__"));
        Self::from_figment(figment)
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let cfg: Config = figment.extract().context("failed to read configuration")?;
        cfg.validate().context("invalid configuration")?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_override(toml: &str) -> Result<Config> {
        Config::from_figment(
            Figment::new()
                .merge(Toml::string(DEFAULT_CONFIG))
                .merge(Toml::string(toml)),
        )
    }

    #[test]
    fn test_defaults_load() {
        let cfg = with_override("").unwrap();
        assert_eq!(cfg.simulation.duration_minutes, 60);
        assert_eq!(cfg.simulation.update_interval(), Duration::from_secs(60));
        assert_eq!(cfg.optimizer.max_power_reduction, 0.3);
        assert_eq!(cfg.optimizer.solver, SolverKind::LinearProgram);
        assert_eq!(cfg.plant.pump_count, 5);
        assert_eq!(cfg.plant.basin_count, 3);
        assert_eq!(cfg.plant.pump_power_range, ValueRange(50.0, 200.0));
        assert_eq!(cfg.grid.energy_price_range, ValueRange(0.05, 0.20));
        assert_eq!(cfg.sinks.history.retention_hours, 24);
        assert_eq!(cfg.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_override_log_format() {
        let cfg = with_override("[logging]\nfilter = \"debug\"\nformat = \"pretty\"\n").unwrap();
        assert_eq!(cfg.logging.format, LogFormat::Pretty);
        assert_eq!(cfg.logging.filter, "debug");
    }

    #[test]
    fn test_override_solver() {
        let cfg = with_override("[optimizer]\nsolver = \"projected_gradient\"\n").unwrap();
        assert_eq!(cfg.optimizer.solver, SolverKind::ProjectedGradient);
    }

    #[test]
    fn test_rejects_inverted_range() {
        assert!(with_override("[plant]\npump_power_range = [200.0, 50.0]\n").is_err());
    }

    #[test]
    fn test_rejects_non_positive_attribute_range() {
        assert!(with_override("[plant]\ndissolved_oxygen_range = [0.0, 8.0]\n").is_err());
    }

    #[test]
    fn test_rejects_reduction_out_of_bounds() {
        assert!(with_override("[optimizer]\nmax_power_reduction = 1.5\n").is_err());
        assert!(with_override("[optimizer]\nmax_power_reduction = 0.0\n").is_err());
    }

    #[test]
    fn test_rejects_malformed_range() {
        assert!(with_override("[grid]\ndemand_range = [1000.0]\n").is_err());
    }

    #[test]
    fn test_rejects_zero_request_timeout() {
        assert!(with_override("[server]\nrequest_timeout_secs = 0\n").is_err());
    }

    #[test]
    fn test_range_serializes_as_pair() {
        let json = serde_json::to_value(ValueRange(0.5, 8.0)).unwrap();
        assert_eq!(json, serde_json::json!([0.5, 8.0]));
    }

    #[test]
    fn test_socket_addr() {
        let cfg = with_override("").unwrap();
        assert!(cfg.server.socket_addr().is_ok());
    }
}
