// src/error.rs

//! Error taxonomy and installer status codes

use thiserror::Error;

/// Errors raised while planning or executing adapter sequences
#[derive(Debug, Error)]
pub enum Error {
    /// Bad declarative row data, bad configuration, or a condition the host
    /// could not evaluate
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Sequence or companion file create/read/write/delete failure
    #[error("I/O error: {0}")]
    IoError(String),

    /// Adapter create/delete failure reported by the driver
    #[error("Adapter operation failed: {0}")]
    ResourceError(String),

    /// Unexpected failure from a host query
    #[error("Installer host error: {0}")]
    HostError(String),

    /// The host asked us to stop
    #[error("Cancelled: {0}")]
    Cancelled(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::ConfigError(err.to_string())
    }
}

impl Error {
    /// Status code to hand back to the installer host
    pub fn status(&self) -> Status {
        match self {
            Self::ConfigError(_) => Status::ConfigurationError,
            Self::IoError(_) => Status::IoError,
            Self::ResourceError(_) => Status::ResourceError,
            Self::HostError(_) => Status::HostProtocolError,
            Self::Cancelled(_) => Status::Cancelled,
        }
    }
}

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Outcome reported to the installer host at the end of a phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    ConfigurationError,
    IoError,
    ResourceError,
    HostProtocolError,
    Cancelled,
}

impl Status {
    /// Map a phase result to its status
    pub fn from_result<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(e) => e.status(),
        }
    }

    /// Windows Installer custom action return code
    ///
    /// ERROR_SUCCESS, ERROR_INVALID_FIELD, ERROR_INSTALL_FAILURE,
    /// ERROR_INVALID_HANDLE and ERROR_INSTALL_USEREXIT respectively.
    pub fn code(self) -> u32 {
        match self {
            Self::Success => 0,
            Self::ConfigurationError => 1616,
            Self::IoError | Self::ResourceError => 1603,
            Self::HostProtocolError => 6,
            Self::Cancelled => 1602,
        }
    }

    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}
