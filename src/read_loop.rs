//! Background read loop.
//!
//! Pumps bytes from a [`ByteStream`] into the [`LineFramer`], parses every
//! completed line and publishes the result to subscribers, until the session's
//! cancellation token fires. The loop then fulfils its [`CloseSignal`] so a
//! waiting `close` can release the stream.
//!
//! Read errors, read timeouts and parse errors never end the loop; they are
//! logged at `DEBUG` and the loop carries on. Cancellation is the only exit.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, trace, Instrument};
use uuid::Uuid;

use crate::config::{DeviceConfig, MAX_READ_CHUNK_SIZE};
use crate::framer::LineFramer;
use crate::notify::Subscribers;
use crate::parser::MessageParser;
use crate::transport::ByteStream;

/// Sending half of a close handle, owned by the read loop.
///
/// Consumed by [`complete`](Self::complete), so it can fire at most once. If
/// the loop dies without completing, dropping the signal still wakes the
/// waiter.
#[derive(Debug)]
pub struct CloseSignal(oneshot::Sender<()>);

impl CloseSignal {
    /// Report that the read loop has exited.
    pub fn complete(self) {
        // The receiver is gone when the session was disposed rather than closed.
        let _ = self.0.send(());
    }
}

/// Waiting half of a close handle, held by the lifecycle.
#[derive(Debug)]
#[must_use]
pub struct CloseHandle(oneshot::Receiver<()>);

impl CloseHandle {
    /// Wait until the read loop exits.
    ///
    /// Returns `false` if the loop ended without reporting completion (for
    /// example because a parser panicked).
    pub async fn wait(self) -> bool {
        self.0.await.is_ok()
    }
}

/// Create a linked close signal and handle.
#[must_use]
pub fn close_handle() -> (CloseSignal, CloseHandle) {
    let (tx, rx) = oneshot::channel();
    (CloseSignal(tx), CloseHandle(rx))
}

/// Everything one read loop needs besides the stream: parser, subscribers,
/// pacing, and the framer whose separator each session's buffer shares.
pub struct ReadLoop<P: MessageParser> {
    framer: Arc<LineFramer>,
    parser: Arc<P>,
    subscribers: Arc<Subscribers<P::Message>>,
    chunk_size: usize,
    idle_delay: Duration,
    read_timeout: Option<Duration>,
}

impl<P: MessageParser> Clone for ReadLoop<P> {
    fn clone(&self) -> Self {
        Self {
            framer: Arc::clone(&self.framer),
            parser: Arc::clone(&self.parser),
            subscribers: Arc::clone(&self.subscribers),
            chunk_size: self.chunk_size,
            idle_delay: self.idle_delay,
            read_timeout: self.read_timeout,
        }
    }
}

impl<P: MessageParser> ReadLoop<P> {
    /// Build a loop description; nothing runs until [`spawn`](Self::spawn).
    #[must_use]
    pub fn new(
        framer: Arc<LineFramer>,
        parser: Arc<P>,
        subscribers: Arc<Subscribers<P::Message>>,
        config: &DeviceConfig,
    ) -> Self {
        Self {
            framer,
            parser,
            subscribers,
            chunk_size: config.read_chunk_size.clamp(1, MAX_READ_CHUNK_SIZE),
            idle_delay: config.idle_delay(),
            read_timeout: config.read_timeout(),
        }
    }

    /// Start the loop for one session on the tokio runtime.
    ///
    /// The session frames into a buffer of its own, so bytes left by an
    /// earlier session never reach it. The returned handle resolves once the
    /// loop has observed `cancel` and exited.
    pub fn spawn(
        &self,
        session_id: Uuid,
        stream: Arc<dyn ByteStream>,
        cancel: CancellationToken,
    ) -> CloseHandle {
        let framer = self.framer.fresh();
        let (signal, handle) = close_handle();
        let this = self.clone();

        tokio::spawn(
            async move { this.run(&framer, stream, cancel, signal).await }
                .instrument(info_span!("read_loop", %session_id)),
        );

        handle
    }

    /// Loop body: read, frame, dispatch, idle; exit only on cancellation.
    pub async fn run(
        &self,
        framer: &LineFramer,
        stream: Arc<dyn ByteStream>,
        cancel: CancellationToken,
        done: CloseSignal,
    ) {
        let mut buf = vec![0u8; self.chunk_size];
        debug!("read loop started");

        while !cancel.is_cancelled() {
            let n = tokio::select! {
                biased;

                () = cancel.cancelled() => break,
                n = self.read_chunk(stream.as_ref(), &mut buf, &cancel) => n,
            };

            if cancel.is_cancelled() {
                break;
            }

            if n > 0 {
                for line in framer.feed(&buf[..n]) {
                    // A disposed session may still be mid-batch.
                    if cancel.is_cancelled() {
                        break;
                    }
                    self.dispatch(&line);
                }
            } else {
                tokio::select! {
                    biased;

                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(self.idle_delay) => {}
                }
            }
        }

        debug!("read loop stopped");
        done.complete();
    }

    /// One read; failures and timeouts count as zero bytes.
    async fn read_chunk(
        &self,
        stream: &dyn ByteStream,
        buf: &mut [u8],
        cancel: &CancellationToken,
    ) -> usize {
        let capacity = buf.len();
        let read = stream.read(buf, cancel);

        let result = match self.read_timeout {
            Some(limit) => {
                let Ok(result) = tokio::time::timeout(limit, read).await else {
                    trace!("read loop: read timed out");
                    return 0;
                };
                result
            }
            None => read.await,
        };

        match result {
            Ok(n) => n.min(capacity),
            Err(err) => {
                debug!(error = %err, "read loop: read failed, treating as no data");
                0
            }
        }
    }

    /// Parse one line and publish it; unparsable lines are dropped.
    fn dispatch(&self, line: &str) {
        match self.parser.parse(line) {
            Ok(message) => {
                self.subscribers.publish(&message);
            }
            Err(err) => {
                debug!(error = %err, line, "read loop: dropping unparsable line");
            }
        }
    }
}
