//! Message-received notification registry.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

/// Fan-out of parsed messages to any number of subscribers.
///
/// Every subscriber owns an unbounded channel, so delivery never waits on a
/// slow consumer and each subscriber sees messages in publish order.
/// Subscribers whose receiver has been dropped are pruned on the next publish.
pub struct Subscribers<M> {
    senders: Mutex<Vec<mpsc::UnboundedSender<M>>>,
}

impl<M: Clone + Send + 'static> Subscribers<M> {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            senders: Mutex::new(Vec::new()),
        }
    }

    /// Register a new subscriber and return its receiving end.
    #[must_use]
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<M> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().push(tx);
        rx
    }

    /// Deliver `message` to every live subscriber; returns how many got it.
    pub fn publish(&self, message: &M) -> usize {
        let mut senders = self.lock();
        senders.retain(|tx| tx.send(message.clone()).is_ok());
        senders.len()
    }

    /// Number of subscribers whose receiver is still alive.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().iter().filter(|tx| !tx.is_closed()).count()
    }

    /// Whether no live subscriber is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Vec<mpsc::UnboundedSender<M>>> {
        self.senders.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<M: Clone + Send + 'static> Default for Subscribers<M> {
    fn default() -> Self {
        Self::new()
    }
}
