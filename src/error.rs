use thiserror::Error;

use crate::clock::ClockError;
use crate::convert::ConvertError;

#[derive(Error, Debug)]
pub enum TimeshiftError {
    #[error("Config file parsing error: {0}")]
    ConfigFileParsingError(#[from] toml::de::Error),
    #[error("Invalid start date in config: {0}")]
    InvalidStartDate(#[from] ClockError),
    #[error("Tokio error: {0}")]
    TokioError(#[from] tokio::io::Error),
    #[error("Conversion error: {0}")]
    ConvertError(#[from] ConvertError),
}
