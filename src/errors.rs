//! Error types shared across the crate.

use std::fmt::{Display, Formatter};

/// Shared crate result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Error enumeration covering every failure mode a device can surface.
///
/// Steady-state read and parse failures never reach callers; they are
/// swallowed inside the read loop. The variants below are what `open`,
/// `close`, `write` and configuration loading can return.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// File-system or I/O operation failure.
    Io(String),
    /// Transport-level failure while opening, writing or closing a stream.
    Transport(String),
    /// A line could not be turned into a message.
    Parse(String),
    /// The device does not support the requested operation.
    NotSupported(String),
    /// The operation requires an open device.
    NotOpen(String),
    /// The device is in a lifecycle state that forbids the operation.
    InvalidState(String),
    /// The operation was cancelled by a concurrent close or dispose.
    Cancelled(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Transport(msg) => write!(f, "transport: {msg}"),
            Self::Parse(msg) => write!(f, "parse: {msg}"),
            Self::NotSupported(msg) => write!(f, "not supported: {msg}"),
            Self::NotOpen(msg) => write!(f, "not open: {msg}"),
            Self::InvalidState(msg) => write!(f, "invalid state: {msg}"),
            Self::Cancelled(msg) => write!(f, "cancelled: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
