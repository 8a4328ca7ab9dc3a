use config::{Config, ConfigError, Environment, File};
use infrastructure::{HttpServerConfig, MonitoringConfig};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub monitoring: MonitoringConfig,
    pub http_server: HttpServerConfig,
    pub porssari: crate::adapter::porssari::PorssariConfig,
    pub controlmyspa: crate::adapter::controlmyspa::ControlMySpaConfig,
    pub control: ControlSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name("config.toml").required(false))
            .add_source(Environment::default().separator("__").list_separator(","));

        let s = builder.build()?;
        s.try_deserialize()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ControlSettings {
    pub temp_low: f64,
    pub temp_high: f64,
    pub temp_override: Option<f64>,
    pub override_duration_s: u64,
    pub poll_interval_s: u64,
}
