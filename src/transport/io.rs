//! [`ByteStream`] adapter over tokio I/O halves.

use futures_util::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, Sink};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::transport::ByteStream;
use crate::{AppError, Result};

/// Wraps a reader and an optional writer as a [`ByteStream`].
///
/// Each half sits behind its own async lock so a blocked read never delays
/// a write. Closing or disposing drops both halves; later reads and writes
/// fail with [`AppError::Transport`].
pub struct IoStream<R, W = Sink> {
    reader: Mutex<Option<R>>,
    writer: Mutex<Option<W>>,
    writable: bool,
}

impl<R, W> IoStream<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Build a readable and writable stream.
    #[must_use]
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: Mutex::new(Some(reader)),
            writer: Mutex::new(Some(writer)),
            writable: true,
        }
    }
}

impl<R> IoStream<R, Sink>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    /// Build a stream whose writes fail with [`AppError::NotSupported`].
    #[must_use]
    pub fn read_only(reader: R) -> Self {
        Self {
            reader: Mutex::new(Some(reader)),
            writer: Mutex::new(None),
            writable: false,
        }
    }
}

impl<R, W> ByteStream for IoStream<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    fn read<'a>(
        &'a self,
        buf: &'a mut [u8],
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<usize>> {
        Box::pin(async move {
            let mut guard = self.reader.lock().await;
            let Some(reader) = guard.as_mut() else {
                return Err(AppError::Transport("stream closed".into()));
            };

            tokio::select! {
                biased;

                () = cancel.cancelled() => Ok(0),
                read = reader.read(buf) => read.map_err(|e| AppError::Transport(format!("read failed: {e}"))),
            }
        })
    }

    fn write<'a>(&'a self, data: &'a [u8]) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if !self.writable {
                return Err(AppError::NotSupported("stream is read-only".into()));
            }

            let mut guard = self.writer.lock().await;
            let Some(writer) = guard.as_mut() else {
                return Err(AppError::Transport("stream closed".into()));
            };

            writer
                .write_all(data)
                .await
                .map_err(|e| AppError::Transport(format!("write failed: {e}")))?;
            writer
                .flush()
                .await
                .map_err(|e| AppError::Transport(format!("flush failed: {e}")))
        })
    }

    fn close(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let writer = self.writer.lock().await.take();
            self.reader.lock().await.take();

            if let Some(mut writer) = writer {
                writer
                    .shutdown()
                    .await
                    .map_err(|e| AppError::Transport(format!("shutdown failed: {e}")))?;
            }
            Ok(())
        })
    }

    fn dispose(&self) {
        // A half that is locked by an in-flight call is dropped together with
        // the last reference to the stream instead.
        match self.writer.try_lock() {
            Ok(mut writer) => drop(writer.take()),
            Err(_) => debug!("io stream: writer busy during dispose"),
        }
        match self.reader.try_lock() {
            Ok(mut reader) => drop(reader.take()),
            Err(_) => debug!("io stream: reader busy during dispose"),
        }
    }
}
