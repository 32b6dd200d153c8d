//! Thread-safe hand-off into the single dispatch task.

use crate::error::EnvError;
use tokio::sync::mpsc;

/// Creates a connected mailbox pair.
///
/// The sender half is cheap to clone and may be moved to any thread; the
/// receiver half belongs to the task that owns the engine state.
///
/// ```text
/// Source A --post()--\
///                     >-- [queue] --recv()--> dispatch task
/// Source B --post()--/
/// ```
pub fn mailbox<T: Send + 'static>() -> (MailboxSender<T>, MailboxReceiver<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MailboxSender { tx }, MailboxReceiver { rx })
}

/// Posting half of a mailbox.
#[derive(Debug)]
pub struct MailboxSender<T> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T> Clone for MailboxSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T: Send + 'static> MailboxSender<T> {
    /// Queues a message without blocking.
    ///
    /// # Returns
    /// * `Ok(())` - Message queued
    /// * `Err(EnvError::MailboxClosed)` - The receiver was dropped
    pub fn post(&self, msg: T) -> Result<(), EnvError> {
        self.tx
            .send(msg)
            .map_err(|_| EnvError::closed("dispatch receiver dropped"))
    }

    /// Returns true once the receiving side is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving half of a mailbox.
#[derive(Debug)]
pub struct MailboxReceiver<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> MailboxReceiver<T> {
    /// Waits for the next message.
    ///
    /// Returns `None` once every sender has been dropped and the queue is
    /// empty.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Takes the next message if one is already queued.
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Takes every message that is already queued, in arrival order.
    pub fn drain_ready(&mut self) -> Vec<T> {
        let mut out = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            out.push(msg);
        }
        out
    }
}
