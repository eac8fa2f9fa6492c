use std::string::FromUtf8Error;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Invalid configuration {0}")]
    InvalidConfig(#[from] figment::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] axum::Error),
    #[error("Send timed out after {0:?}")]
    SendTimeout(Duration),
    #[error("Transport cannot emit a non-final frame")]
    FragmentUnsupported,
    #[error("Text frame is not valid UTF-8: {0}")]
    InvalidText(#[from] FromUtf8Error),
    #[error("Connection already closed")]
    ConnectionClosed,
    #[error("Custom error: {0}")]
    Custom(String),
}

pub type Result<T> = std::result::Result<T, Error>;
