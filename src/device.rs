//! Public device facade.
//!
//! A [`Device`] composes a transport, a [`LineFramer`], a [`MessageParser`]
//! and the [`DeviceLifecycle`]. Callers open and close it, optionally write to
//! it, and [`subscribe`](Device::subscribe) to receive one message per
//! successfully parsed line.
//!
//! # Examples
//!
//! ```rust,no_run
//! use line_device::config::DeviceConfig;
//! use line_device::device::Device;
//! use line_device::parser::TextParser;
//! use line_device::transport::TcpTransport;
//!
//! # async fn demo() -> line_device::Result<()> {
//! let device = Device::new(TcpTransport::new("127.0.0.1:7000"), TextParser, DeviceConfig::default())?;
//! let mut messages = device.subscribe();
//! device.open().await?;
//! device.write(b"STATUS\n").await?;
//! if let Some(line) = messages.recv().await {
//!     println!("{line}");
//! }
//! device.close().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::config::DeviceConfig;
use crate::framer::LineFramer;
use crate::lifecycle::{DeviceLifecycle, DeviceState};
use crate::notify::Subscribers;
use crate::parser::MessageParser;
use crate::read_loop::ReadLoop;
use crate::transport::Transport;
use crate::{AppError, Result};

/// A stream-backed endpoint delivering parsed, separator-delimited messages.
pub struct Device<P: MessageParser> {
    lifecycle: DeviceLifecycle,
    framer: Arc<LineFramer>,
    subscribers: Arc<Subscribers<P::Message>>,
    read_loop: ReadLoop<P>,
}

impl<P: MessageParser> Device<P> {
    /// Build a closed device.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `config` fails validation.
    pub fn new(transport: impl Transport + 'static, parser: P, config: DeviceConfig) -> Result<Self> {
        config.validate()?;

        let framer = Arc::new(LineFramer::new(&config.separator)?);
        let subscribers = Arc::new(Subscribers::new());
        let read_loop = ReadLoop::new(
            Arc::clone(&framer),
            Arc::new(parser),
            Arc::clone(&subscribers),
            &config,
        );

        Ok(Self {
            lifecycle: DeviceLifecycle::new(Box::new(transport)),
            framer,
            subscribers,
            read_loop,
        })
    }

    /// Open the transport and start reading.
    ///
    /// A no-op when the device is already open or opening.
    ///
    /// # Errors
    ///
    /// See [`DeviceLifecycle::open`].
    pub async fn open(&self) -> Result<()> {
        self.lifecycle
            .open(|session_id, stream, cancel| self.read_loop.spawn(session_id, stream, cancel))
            .await
    }

    /// Stop reading and close the transport.
    ///
    /// A no-op when the device is not open.
    ///
    /// # Errors
    ///
    /// Returns the transport's close error; the device is closed regardless.
    pub async fn close(&self) -> Result<()> {
        self.lifecycle.close().await
    }

    /// Whether the device is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.lifecycle.is_open()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> DeviceState {
        self.lifecycle.state()
    }

    /// Identifier of the current session, if any.
    #[must_use]
    pub fn session_id(&self) -> Option<Uuid> {
        self.lifecycle.session_id()
    }

    /// Whether [`write`](Self::write) is supported by the transport.
    #[must_use]
    pub fn can_write(&self) -> bool {
        self.lifecycle.can_write()
    }

    /// Write `data` to the open stream.
    ///
    /// # Errors
    ///
    /// - `AppError::NotSupported` when [`can_write`](Self::can_write) is
    ///   false; the transport is never touched.
    /// - `AppError::NotOpen` when the device is not open.
    /// - Any error from the stream's write path.
    pub async fn write(&self, data: &[u8]) -> Result<()> {
        if !self.can_write() {
            return Err(AppError::NotSupported("device does not support writing".into()));
        }

        let stream = self
            .lifecycle
            .stream()
            .ok_or_else(|| AppError::NotOpen("device is not open".into()))?;

        debug!(bytes = data.len(), "device write");
        stream.write(data).await
    }

    /// Register a subscriber; every parsed message is delivered to it in
    /// framing order.
    #[must_use]
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<P::Message> {
        self.subscribers.subscribe()
    }

    /// Separator between incoming messages.
    #[must_use]
    pub fn incoming_message_separator(&self) -> String {
        self.framer.separator()
    }

    /// Change the separator; applies from the next read onwards.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `separator` is empty.
    pub fn set_incoming_message_separator(&self, separator: &str) -> Result<()> {
        self.framer.set_separator(separator)
    }

    /// Cancel reading and release the stream without waiting.
    ///
    /// Safe to call repeatedly and from any state.
    pub fn dispose(&self) {
        self.lifecycle.dispose();
    }
}

impl<P: MessageParser> Drop for Device<P> {
    fn drop(&mut self) {
        self.dispose();
    }
}
