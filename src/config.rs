//! Command line configuration.
//!
//! Parsed once at startup and passed by reference into every collector
//! constructor.

use crate::attributes::{HealthCalculation, PowerOnUnit};
use crate::error::ConfigError;
use crate::registry::parse_list;
use clap::{Args, Parser};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Exporter configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "counter-exporter", version, about)]
pub struct Config {
    /// Comma separated list of collectors to enable.
    #[arg(long = "collectors.enabled", default_value = "[defaults]")]
    pub collectors_enabled: String,

    /// Namespace prefixed to every metric name.
    #[arg(long = "namespace", default_value = "windows")]
    pub namespace: String,

    /// JSON fixture to read counters and query results from.
    #[arg(long = "source.fixture")]
    pub fixture: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set.
    #[arg(long = "log.level", default_value = "info")]
    pub log_level: String,

    #[command(flatten)]
    #[allow(missing_docs)]
    pub web: WebConfig,

    #[command(flatten)]
    #[allow(missing_docs)]
    pub net: NetConfig,

    #[command(flatten)]
    #[allow(missing_docs)]
    pub dfsr: DfsrConfig,

    #[command(flatten)]
    #[allow(missing_docs)]
    pub smart: SmartConfig,
}

impl Config {
    /// Returns the requested collector names.
    pub fn enabled_collectors(&self) -> Vec<String> {
        parse_list(&self.collectors_enabled)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::parse_from(["counter-exporter"])
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Args)]
pub struct WebConfig {
    /// Address to listen on for web interface and telemetry.
    #[arg(long = "web.listen-address", default_value = "0.0.0.0:9182")]
    pub listen_address: SocketAddr,

    /// Path under which to expose metrics.
    #[arg(long = "telemetry.path", default_value = "/metrics")]
    pub telemetry_path: String,

    /// Seconds subtracted from the scraper's timeout header.
    #[arg(long = "scrape.timeout-margin", default_value_t = 0.5)]
    pub timeout_margin: f64,

    /// Scrape timeout in seconds when the scraper sends none.
    #[arg(long = "scrape.timeout", default_value_t = 10.0)]
    pub timeout: f64,
}

impl WebConfig {
    /// Check that the telemetry path can be routed next to the health
    /// check and the landing page.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let path = &self.telemetry_path;
        let reason = if !path.starts_with('/') {
            "must start with '/'"
        } else if path == "/health" {
            "reserved for the health check"
        } else if path.contains([':', '*']) {
            "must not contain ':' or '*'"
        } else {
            return Ok(());
        };
        Err(ConfigError::InvalidTelemetryPath {
            path: path.clone(),
            reason,
        })
    }

    /// Returns the margin as duration, zero if negative.
    pub fn margin(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_margin).unwrap_or_default()
    }

    /// Returns the default timeout as duration, `None` if not positive.
    pub fn default_timeout(&self) -> Option<Duration> {
        Duration::try_from_secs_f64(self.timeout)
            .ok()
            .filter(|d| !d.is_zero())
    }
}

/// Settings of the network interface collector.
#[derive(Debug, Clone, Args)]
pub struct NetConfig {
    /// Regexp of NIC names to include. Whole name has to match.
    #[arg(long = "collector.net.nic-whitelist", default_value = ".+")]
    pub nic_whitelist: String,

    /// Regexp of NIC names to exclude. Whole name has to match.
    #[arg(long = "collector.net.nic-blacklist", default_value = "")]
    pub nic_blacklist: String,
}

/// Settings of the DFS replication collector.
#[derive(Debug, Clone, Args)]
pub struct DfsrConfig {
    /// Comma separated list of DFSR perflib sources to use.
    #[arg(
        long = "collectors.dfsr.sources-enabled",
        default_value = "connection,folder,volume"
    )]
    pub sources_enabled: String,
}

/// Settings of the disk health collector.
#[derive(Debug, Clone, Args)]
pub struct SmartConfig {
    /// Unit power-on time is reported in by the disks.
    #[arg(long = "collector.smart.power-on-unit", value_enum, default_value_t = PowerOnUnit::Hour)]
    pub power_on_unit: PowerOnUnit,

    /// Weighting of the health percentage.
    #[arg(
        long = "collector.smart.health-calculation",
        value_enum,
        default_value_t = HealthCalculation::Standard
    )]
    pub health_calculation: HealthCalculation,

    /// Temperature in °C above which a warning is logged.
    #[arg(long = "collector.smart.temperature-warn")]
    pub temperature_warn: Option<f64>,

    /// Temperature in °C above which an error is logged.
    #[arg(long = "collector.smart.temperature-crit")]
    pub temperature_crit: Option<f64>,
}
