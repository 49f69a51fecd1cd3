//! Device lifecycle state machine.
//!
//! [`DeviceLifecycle`] owns the transport, the current stream handle and the
//! per-session cancellation token, and drives the
//! `Closed → Opening → Open → Closing → Closed` transitions.
//!
//! One lock guards the state and session fields. It is never held across an
//! await point, so `close` waiting on the read loop cannot deadlock with the
//! loop itself.

use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::read_loop::CloseHandle;
use crate::transport::{ByteStream, Transport};
use crate::{AppError, Result};

/// Lifecycle state of a device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeviceState {
    /// No session; the device can be opened.
    #[default]
    Closed,
    /// The transport is being opened.
    Opening,
    /// The stream is open and the read loop is running.
    Open,
    /// The read loop is being stopped and the stream released.
    Closing,
}

impl Display for DeviceState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Closed => "closed",
            Self::Opening => "opening",
            Self::Open => "open",
            Self::Closing => "closing",
        };
        f.write_str(name)
    }
}

/// Per-session resources, created by `open` and torn down by `close`/`dispose`.
struct Session {
    id: Uuid,
    cancel: CancellationToken,
    /// Set once the transport has opened.
    stream: Option<Arc<dyn ByteStream>>,
    /// Set once the read loop has been started.
    closed: Option<CloseHandle>,
}

struct Inner {
    state: DeviceState,
    session: Option<Session>,
}

/// Open/close/dispose coordination for one transport.
pub struct DeviceLifecycle {
    transport: Box<dyn Transport>,
    inner: Mutex<Inner>,
}

impl DeviceLifecycle {
    /// Lifecycle over `transport`, initially [`DeviceState::Closed`].
    #[must_use]
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            inner: Mutex::new(Inner {
                state: DeviceState::Closed,
                session: None,
            }),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> DeviceState {
        self.lock().state
    }

    /// Whether the current state is [`DeviceState::Open`].
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == DeviceState::Open
    }

    /// Whether the transport produces writable streams.
    #[must_use]
    pub fn can_write(&self) -> bool {
        self.transport.can_write()
    }

    /// Identifier of the current session, if any.
    #[must_use]
    pub fn session_id(&self) -> Option<Uuid> {
        self.lock().session.as_ref().map(|session| session.id)
    }

    /// The open stream, available only while [`DeviceState::Open`].
    #[must_use]
    pub fn stream(&self) -> Option<Arc<dyn ByteStream>> {
        let inner = self.lock();
        if inner.state != DeviceState::Open {
            return None;
        }
        inner.session.as_ref().and_then(|session| session.stream.clone())
    }

    /// Open the transport and start a read loop via `start`.
    ///
    /// Returns immediately when the device is already open or opening.
    /// `start` receives the session id, the stream and the session's
    /// cancellation token, and must return the loop's close handle.
    ///
    /// # Errors
    ///
    /// - `AppError::InvalidState` if a close is still in progress.
    /// - Any error from [`Transport::open`]; the device returns to closed.
    /// - `AppError::Cancelled` if the device was closed or disposed while the
    ///   transport was opening; the new stream is closed again.
    pub async fn open<F>(&self, start: F) -> Result<()>
    where
        F: FnOnce(Uuid, Arc<dyn ByteStream>, CancellationToken) -> CloseHandle,
    {
        let (session_id, cancel) = {
            let mut inner = self.lock();
            match inner.state {
                DeviceState::Open | DeviceState::Opening => {
                    debug!(state = %inner.state, "device open ignored");
                    return Ok(());
                }
                DeviceState::Closing => {
                    return Err(AppError::InvalidState("device is closing".into()));
                }
                DeviceState::Closed => {}
            }

            let session_id = Uuid::new_v4();
            let cancel = CancellationToken::new();
            inner.state = DeviceState::Opening;
            inner.session = Some(Session {
                id: session_id,
                cancel: cancel.clone(),
                stream: None,
                closed: None,
            });
            (session_id, cancel)
        };

        info!(%session_id, "device opening");

        let stream = match self.transport.open().await {
            Ok(stream) => stream,
            Err(err) => {
                let mut inner = self.lock();
                if inner.session.as_ref().is_some_and(|s| s.id == session_id) {
                    inner.session = None;
                    inner.state = DeviceState::Closed;
                }
                warn!(%session_id, error = %err, "device open failed");
                return Err(err);
            }
        };

        {
            let mut guard = self.lock();
            let inner = &mut *guard;
            let current = inner
                .session
                .as_mut()
                .filter(|session| session.id == session_id && !cancel.is_cancelled());

            if let Some(session) = current {
                session.closed = Some(start(session_id, Arc::clone(&stream), cancel.clone()));
                session.stream = Some(stream);
                inner.state = DeviceState::Open;
                info!(%session_id, "device open");
                return Ok(());
            }
        }

        debug!(%session_id, "device closed while opening, releasing stream");
        if let Err(err) = stream.close().await {
            debug!(%session_id, error = %err, "stream close after cancelled open failed");
        }
        Err(AppError::Cancelled("device closed while opening".into()))
    }

    /// Stop the read loop, wait for it to exit, then close the stream.
    ///
    /// A no-op when there is no session. Safe to call while an open is still
    /// in flight.
    ///
    /// # Errors
    ///
    /// Returns the error from [`ByteStream::close`]; the device is closed
    /// regardless.
    pub async fn close(&self) -> Result<()> {
        let session = {
            let mut inner = self.lock();
            let Some(session) = inner.session.take() else {
                return Ok(());
            };
            inner.state = DeviceState::Closing;
            session
        };

        let session_id = session.id;
        info!(%session_id, "device closing");
        session.cancel.cancel();

        if let Some(closed) = session.closed {
            if !closed.wait().await {
                warn!(%session_id, "read loop ended without completing its close handle");
            }
        }

        let result = match session.stream {
            Some(stream) => stream.close().await,
            None => Ok(()),
        };

        {
            let mut inner = self.lock();
            if inner.state == DeviceState::Closing {
                inner.state = DeviceState::Closed;
            }
        }

        match result {
            Ok(()) => {
                info!(%session_id, "device closed");
                Ok(())
            }
            Err(err) => {
                warn!(%session_id, error = %err, "stream close failed");
                Err(err)
            }
        }
    }

    /// Cancel the session and release the stream without waiting.
    ///
    /// Idempotent and callable from any state, including from `Drop`.
    pub fn dispose(&self) {
        let session = {
            let mut inner = self.lock();
            inner.state = DeviceState::Closed;
            inner.session.take()
        };

        if let Some(session) = session {
            debug!(session_id = %session.id, "device disposed");
            session.cancel.cancel();
            if let Some(stream) = session.stream {
                stream.dispose();
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
