use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
/// Errors that can occur when configuring or talking to the gauge.
pub enum GaugeError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
    #[error("Channel receive error: {0}")]
    ChannelReceive(#[from] crossbeam_channel::RecvError),
    #[error("Thread communication error: {0}")]
    ThreadComm(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
/// Reasons a single protocol line could not be turned into a sample.
pub enum DecodeError {
    #[error("empty line")]
    Empty,
    #[error("not a number: {0:?}")]
    NotANumber(String),
    #[error("not a finite number: {0:?}")]
    NonFinite(String),
}

pub type Result<T> = std::result::Result<T, GaugeError>;
