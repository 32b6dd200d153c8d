//! Error types for the vsPlay environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// The receiving end of a mailbox has been dropped
    #[error("Mailbox closed: {0}")]
    MailboxClosed(String),

    /// Context operation failed
    #[error("Context error: {0}")]
    ContextError(String),

    /// Operation timed out
    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl EnvError {
    /// Creates a mailbox-closed error.
    pub fn closed(what: impl Into<String>) -> Self {
        Self::MailboxClosed(what.into())
    }

    /// Creates a context error.
    pub fn context(msg: impl Into<String>) -> Self {
        Self::ContextError(msg.into())
    }
}
