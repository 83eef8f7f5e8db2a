//! Shared error types for the services crate.

use std::path::PathBuf;

use thiserror::Error;

use sign_core::SettingsError;
use sign_core::model::{CatalogError, ObservationError, SymbolError};

/// Errors raised while establishing or using a link to the classifier.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    #[error("connection refused: {0}")]
    Refused(String),
    #[error("connect task failed: {0}")]
    ConnectTask(String),
    #[error(transparent)]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Errors raised while turning a URL into a classifier endpoint.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EndpointError {
    #[error("invalid url {raw}: {source}")]
    InvalidUrl {
        raw: String,
        #[source]
        source: url::ParseError,
    },
    #[error("unsupported url scheme: {0}")]
    UnsupportedScheme(String),
    #[error("url has no host: {0}")]
    MissingHost(String),
}

/// Errors raised while decoding a classifier message.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("finalized message is missing `{0}`")]
    MissingField(&'static str),
    #[error("unexpected binary message ({0} bytes)")]
    UnexpectedBinary(usize),
    #[error(transparent)]
    Label(#[from] SymbolError),
    #[error(transparent)]
    Observation(#[from] ObservationError),
}

/// Errors from the capture device. These end the session.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CaptureError {
    #[error("capture device is not open")]
    NotOpen,
    #[error("capture device has no frames")]
    NoFrames,
    #[error("failed to open frame {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("capture device lost: {0}")]
    DeviceLost(String),
}

/// Per-frame encoding failures; the tick is skipped.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EncodeError {
    #[error("encoder produced no data")]
    Empty,
    #[error(transparent)]
    Image(#[from] image::ImageError),
}

/// Errors raised while loading or validating trainer configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("invalid label mapping for {raw}: {source}")]
    Label {
        raw: String,
        #[source]
        source: SymbolError,
    },
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Endpoint(#[from] EndpointError),
    #[error("sample period must be > 0 ms")]
    InvalidSamplePeriod,
    #[error("frame size must be non-zero, got {width}x{height}")]
    InvalidFrameSize { width: u32, height: u32 },
    #[error("jpeg quality must be in 1..=100, got {0}")]
    InvalidJpegQuality(u8),
    #[error("profile name must not be blank")]
    BlankProfile,
}

/// Errors from the service health probe.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HealthError {
    #[error("health check failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error("service reported status {0:?}")]
    Unhealthy(String),
    #[error(transparent)]
    Endpoint(#[from] EndpointError),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Errors that end a practice session.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionLoopError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error("session task failed: {0}")]
    Task(String),
}
