//! Device and monitor configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::ValueEnum;
use serde::Deserialize;

use crate::{AppError, Result};

/// Default incoming message separator.
pub const DEFAULT_SEPARATOR: &str = "\n";

/// Largest accepted `read_chunk_size` (1 MiB). The read loop allocates one
/// buffer of this size per session.
pub const MAX_READ_CHUNK_SIZE: usize = 1024 * 1024;

/// Tunables for a single device: framing and read-loop pacing.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct DeviceConfig {
    /// Separator between incoming messages.
    #[serde(default = "default_separator")]
    pub separator: String,
    /// Maximum number of bytes requested from the stream per read.
    #[serde(default = "default_read_chunk_size")]
    pub read_chunk_size: usize,
    /// Pause between reads that returned no data.
    #[serde(default = "default_idle_delay_ms")]
    pub idle_delay_ms: u64,
    /// Upper bound for a single read; unset means the read waits for data
    /// or cancellation.
    #[serde(default)]
    pub read_timeout_ms: Option<u64>,
}

fn default_separator() -> String {
    DEFAULT_SEPARATOR.into()
}

fn default_read_chunk_size() -> usize {
    4096
}

fn default_idle_delay_ms() -> u64 {
    50
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            separator: default_separator(),
            read_chunk_size: default_read_chunk_size(),
            idle_delay_ms: default_idle_delay_ms(),
            read_timeout_ms: None,
        }
    }
}

impl DeviceConfig {
    /// Delay applied after a read that produced no bytes.
    #[must_use]
    pub fn idle_delay(&self) -> Duration {
        Duration::from_millis(self.idle_delay_ms)
    }

    /// Optional per-read timeout.
    #[must_use]
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_ms.map(Duration::from_millis)
    }

    /// Check the invariants the framer and read loop rely on.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the separator is empty or the read
    /// chunk size is zero or above [`MAX_READ_CHUNK_SIZE`].
    pub fn validate(&self) -> Result<()> {
        if self.separator.is_empty() {
            return Err(AppError::Config("separator must not be empty".into()));
        }

        if self.read_chunk_size == 0 {
            return Err(AppError::Config(
                "read_chunk_size must be greater than zero".into(),
            ));
        }

        if self.read_chunk_size > MAX_READ_CHUNK_SIZE {
            return Err(AppError::Config(format!(
                "read_chunk_size must not exceed {MAX_READ_CHUNK_SIZE} bytes, got {}",
                self.read_chunk_size
            )));
        }

        Ok(())
    }
}

/// Transport selection for the monitor binary.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportConfig {
    /// Connect to a TCP endpoint (readable and writable).
    Tcp {
        /// `host:port` to connect to.
        address: String,
    },
    /// Follow a file (read-only).
    File {
        /// File to read.
        path: PathBuf,
        /// Skip the existing content and deliver only appended data.
        #[serde(default)]
        from_end: bool,
    },
}

/// Parser selection for the monitor binary.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ParserKind {
    /// Each line is delivered as text.
    #[default]
    Text,
    /// Each line must be a JSON document.
    Json,
}

/// Configuration for the `line-device` monitor, parsed from TOML.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct MonitorConfig {
    /// Where bytes come from.
    pub transport: TransportConfig,
    /// How lines are turned into messages.
    #[serde(default)]
    pub parser: ParserKind,
    /// Framing and read-loop tunables.
    #[serde(default)]
    pub device: DeviceConfig,
}

impl MonitorConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        match &self.transport {
            TransportConfig::Tcp { address } if address.trim().is_empty() => {
                return Err(AppError::Config("transport.address must not be empty".into()));
            }
            TransportConfig::File { path, .. } if path.as_os_str().is_empty() => {
                return Err(AppError::Config("transport.path must not be empty".into()));
            }
            _ => {}
        }

        self.device.validate()
    }
}

/// Expand `\n`, `\r`, `\t`, `\0` and `\\` escapes in a separator typed on a
/// command line. Unknown escapes are kept verbatim.
#[must_use]
pub fn unescape_separator(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
