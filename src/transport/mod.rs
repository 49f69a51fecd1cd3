//! Byte-stream transport capability.
//!
//! The device core depends only on the [`Transport`] and [`ByteStream`]
//! traits defined here. A transport knows how to open a stream; the stream
//! knows how to read with cancellation, optionally write, and release itself.
//!
//! Async methods return boxed futures so both traits stay object-safe and a
//! [`Device`](crate::device::Device) can hold any transport as a trait object.
//!
//! Submodules provide concrete transports:
//! - `io`: [`IoStream`] adapter over tokio `AsyncRead`/`AsyncWrite` halves.
//! - `tcp`: [`TcpTransport`], a writable TCP client stream.
//! - `file`: [`FileTransport`], a read-only stream following a file.

pub mod file;
pub mod io;
pub mod tcp;

use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::{AppError, Result};

pub use file::FileTransport;
pub use io::IoStream;
pub use tcp::TcpTransport;

/// An open byte stream.
///
/// One read loop calls [`read`](Self::read) at a time while the foreground
/// caller may [`write`](Self::write) concurrently, so implementations keep
/// their read and write halves independently locked.
pub trait ByteStream: Send + Sync {
    /// Read up to `buf.len()` bytes into `buf`.
    ///
    /// Returns `Ok(0)` at end of stream, when no data is available, or when
    /// `cancel` fires before data arrives.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying read fails. The read loop treats
    /// every such error as transient.
    fn read<'a>(
        &'a self,
        buf: &'a mut [u8],
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<usize>>;

    /// Write all of `data` to the stream.
    ///
    /// # Errors
    ///
    /// The default implementation returns [`AppError::NotSupported`].
    fn write<'a>(&'a self, data: &'a [u8]) -> BoxFuture<'a, Result<()>> {
        let _ = data;
        Box::pin(async { Err(AppError::NotSupported("stream is read-only".into())) })
    }

    /// Flush and release the stream.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Transport`] if shutting the stream down fails.
    fn close(&self) -> BoxFuture<'_, Result<()>>;

    /// Release the stream without waiting. Must not block.
    fn dispose(&self);
}

/// Something that can open a [`ByteStream`]: a socket address, a file, a port.
pub trait Transport: Send + Sync {
    /// Open a new stream.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying resource cannot be opened.
    fn open(&self) -> BoxFuture<'_, Result<Arc<dyn ByteStream>>>;

    /// Whether streams opened by this transport accept writes.
    fn can_write(&self) -> bool {
        false
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn open(&self) -> BoxFuture<'_, Result<Arc<dyn ByteStream>>> {
        (**self).open()
    }

    fn can_write(&self) -> bool {
        (**self).can_write()
    }
}
