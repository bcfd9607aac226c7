use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use chrono::{DateTime, Utc};
use clap::Parser;
use log::warn;
use serde::Deserialize;

use crate::clock::parse_reference_time;
use crate::error::TimeshiftError;

/// The structure of a valid timeshift configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listening port
    pub port: u16,
    /// Address to bind the HTTP listener to
    pub bind_address: IpAddr,
    /// Initial reference time; the process start time is used when unset
    pub start_date: Option<String>,
    /// Largest accepted request body, in bytes
    pub max_upload_bytes: usize,
    /// Answer cross-origin requests from any origin
    pub cors_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 8080,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            start_date: None,
            max_upload_bytes: 32 * 1024 * 1024,
            cors_enabled: true,
        }
    }
}

impl Config {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    /// The configured initial reference time, if any.
    pub fn start_date(&self) -> Result<Option<DateTime<Utc>>, TimeshiftError> {
        self.start_date
            .as_deref()
            .map(parse_reference_time)
            .transpose()
            .map_err(TimeshiftError::InvalidStartDate)
    }
}

pub async fn parse_config<P>(path: P) -> Result<Config, TimeshiftError>
where
    P: AsRef<std::path::Path>,
{
    if let Ok(config_file) = tokio::fs::read_to_string(&path).await {
        Ok(toml::from_str(&config_file).map_err(TimeshiftError::ConfigFileParsingError)?)
    } else {
        warn!(
            "unable to read config file {:?}, using default config",
            path.as_ref()
        );
        Ok(Config::default())
    }
}

/// Serve the CSV timestamp conversion API
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Args {
    /// Path to the TOML config file
    #[arg(default_value = "timeshift.toml")]
    pub config_path: String,

    /// Override the listening port from the config file
    #[arg(short, long)]
    pub port: Option<u16>,
}

impl Args {
    /// Fold command line overrides into a parsed config.
    pub fn apply(&self, mut config: Config) -> Config {
        if let Some(port) = self.port {
            config.port = port;
        }
        config
    }
}
