//! TCP client transport.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::net::TcpStream;
use tracing::debug;

use crate::transport::{ByteStream, IoStream, Transport};
use crate::{AppError, Result};

/// Connects to a TCP endpoint on every open; streams are writable.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    address: String,
}

impl TcpTransport {
    /// Transport for `address` (`host:port`).
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }

    /// The configured endpoint.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }
}

impl Transport for TcpTransport {
    fn open(&self) -> BoxFuture<'_, Result<Arc<dyn ByteStream>>> {
        Box::pin(async move {
            let stream = TcpStream::connect(&self.address).await.map_err(|e| {
                AppError::Transport(format!("connect to {} failed: {e}", self.address))
            })?;
            if let Err(err) = stream.set_nodelay(true) {
                debug!(address = %self.address, %err, "tcp transport: set_nodelay failed");
            }

            let (read, write) = stream.into_split();
            Ok(Arc::new(IoStream::new(read, write)) as Arc<dyn ByteStream>)
        })
    }

    fn can_write(&self) -> bool {
        true
    }
}
