//! Read-only transport following a file.
//!
//! Reads that hit the current end of the file return zero bytes; the read
//! loop then idles and picks up whatever is appended later.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::fs::File;
use tokio::io::AsyncSeekExt;

use crate::transport::{ByteStream, IoStream, Transport};
use crate::{AppError, Result};

/// Opens a file for reading on every open.
#[derive(Debug, Clone)]
pub struct FileTransport {
    path: PathBuf,
    from_end: bool,
}

impl FileTransport {
    /// Transport reading `path` from its beginning.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            from_end: false,
        }
    }

    /// Skip existing content and deliver only data appended after open.
    #[must_use]
    pub fn from_end(mut self, from_end: bool) -> Self {
        self.from_end = from_end;
        self
    }

    /// The file being followed.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Transport for FileTransport {
    fn open(&self) -> BoxFuture<'_, Result<Arc<dyn ByteStream>>> {
        Box::pin(async move {
            let mut file = File::open(&self.path).await.map_err(|e| {
                AppError::Transport(format!("open {} failed: {e}", self.path.display()))
            })?;
            if self.from_end {
                file.seek(SeekFrom::End(0)).await.map_err(|e| {
                    AppError::Transport(format!("seek {} failed: {e}", self.path.display()))
                })?;
            }

            Ok(Arc::new(IoStream::read_only(file)) as Arc<dyn ByteStream>)
        })
    }
}
