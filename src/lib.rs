#![forbid(unsafe_code)]

//! Async line-oriented stream devices.
//!
//! A [`Device`] opens a byte stream through a pluggable
//! [`Transport`](transport::Transport), reads it in a background task, splits
//! the bytes into lines on a configurable separator, parses each line with a
//! [`MessageParser`](parser::MessageParser) and publishes the results to
//! subscribers.

pub mod config;
pub mod device;
pub mod errors;
pub mod framer;
pub mod lifecycle;
pub mod notify;
pub mod parser;
pub mod read_loop;
pub mod transport;

pub use config::{DeviceConfig, MonitorConfig};
pub use device::Device;
pub use errors::{AppError, Result};
pub use lifecycle::DeviceState;
