//! Separator-delimited line framing.
//!
//! [`LineFramer`] accumulates raw bytes in a pending buffer and cuts complete
//! lines out of it whenever the configured separator appears. Partial data
//! stays buffered across [`feed`](LineFramer::feed) calls, so separators and
//! multi-byte UTF-8 sequences split across reads are reassembled naturally.
//!
//! The separator lives in a handle shared by every framer derived with
//! [`fresh`](LineFramer::fresh). Each read loop session frames into its own
//! buffer while a separator change made through any of them reaches all.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::{Buf, BytesMut};

use crate::{AppError, Result};

/// Separator bytes plus a generation bumped on every change.
struct Separator {
    bytes: Vec<u8>,
    generation: u64,
}

struct FramerState {
    pending: BytesMut,
    /// Prefix of `pending` known to hold no separator start.
    searched: usize,
    /// Separator generation `searched` was computed for.
    generation: u64,
}

/// Accumulates bytes and extracts separator-delimited, whitespace-trimmed lines.
///
/// The pending buffer and the separator sit behind separate locks, so changing
/// the separator never waits on framing.
pub struct LineFramer {
    separator: Arc<Mutex<Separator>>,
    state: Mutex<FramerState>,
}

impl LineFramer {
    /// Create a framer splitting on `separator`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `separator` is empty.
    pub fn new(separator: &str) -> Result<Self> {
        let separator = Separator {
            bytes: checked_separator(separator)?,
            generation: 0,
        };
        Ok(Self::with_separator(Arc::new(Mutex::new(separator))))
    }

    /// A framer with an empty buffer that shares this framer's separator.
    #[must_use]
    pub fn fresh(&self) -> Self {
        Self::with_separator(Arc::clone(&self.separator))
    }

    fn with_separator(separator: Arc<Mutex<Separator>>) -> Self {
        Self {
            separator,
            state: Mutex::new(FramerState {
                pending: BytesMut::with_capacity(1024),
                searched: 0,
                generation: 0,
            }),
        }
    }

    /// The separator currently in use.
    #[must_use]
    pub fn separator(&self) -> String {
        String::from_utf8_lossy(&self.lock_separator().bytes).into_owned()
    }

    /// Replace the separator for this framer and every framer sharing it.
    ///
    /// Takes effect on the next [`feed`](Self::feed); data already buffered is
    /// searched with the new separator from then on.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `separator` is empty.
    pub fn set_separator(&self, separator: &str) -> Result<()> {
        let bytes = checked_separator(separator)?;
        let mut current = self.lock_separator();
        current.bytes = bytes;
        current.generation += 1;
        Ok(())
    }

    /// Append `bytes` to the pending buffer and return every complete line.
    ///
    /// Each line is decoded as UTF-8 (invalid sequences are replaced), trimmed
    /// of leading and trailing whitespace, and skipped if nothing remains.
    /// Trailing data without a separator stays buffered; later feeds resume
    /// the search where the previous one stopped.
    #[must_use]
    pub fn feed(&self, bytes: &[u8]) -> Vec<String> {
        let (separator, generation) = {
            let current = self.lock_separator();
            (current.bytes.clone(), current.generation)
        };

        let mut guard = self.lock();
        let state = &mut *guard;

        if state.generation != generation {
            state.generation = generation;
            state.searched = 0;
        }
        state.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = find(&state.pending[state.searched..], &separator) {
            let segment = state.pending.split_to(state.searched + pos);
            state.pending.advance(separator.len());
            state.searched = 0;

            let text = String::from_utf8_lossy(&segment);
            let line = text.trim();
            if !line.is_empty() {
                lines.push(line.to_owned());
            }
        }

        // A separator may straddle the end of the buffer.
        state.searched = state.pending.len().saturating_sub(separator.len() - 1);
        lines
    }

    /// Number of buffered bytes not yet terminated by a separator.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    fn lock(&self) -> MutexGuard<'_, FramerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_separator(&self) -> MutexGuard<'_, Separator> {
        self.separator.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn checked_separator(separator: &str) -> Result<Vec<u8>> {
    if separator.is_empty() {
        return Err(AppError::Config("separator must not be empty".into()));
    }
    Ok(separator.as_bytes().to_vec())
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
