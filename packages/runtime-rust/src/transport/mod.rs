//! Transport abstraction over a publish/subscribe broker connection.
//!
//! The transport is the sole owner of the underlying connection: every stub
//! and dispatcher serializes its writes through it. No retries happen at
//! this layer; retry policy belongs to the caller.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use wirebus_core::Envelope;

mod memory;

pub use memory::MemoryBus;

/// Connection-level failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// No reply arrived within the request timeout.
    #[error("request timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },
    /// The connection has been closed.
    #[error("transport is closed")]
    Closed,
    /// The broker rejected the subject (empty, whitespace, or wildcards).
    #[error("broker rejected subject {subject:?}")]
    BadSubject { subject: String },
}

/// A single message delivered to a subscription.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub envelope: Envelope,
    /// Subject to publish the reply to, if the sender expects one.
    pub reply: Option<String>,
}

/// Lazy, cancellable stream of messages for one subject.
///
/// Dropping the subscription cancels delivery: the broker prunes the closed
/// channel on its next publish to the subject.
#[derive(Debug)]
pub struct Subscription {
    subject: String,
    rx: mpsc::Receiver<InboundMessage>,
}

impl Subscription {
    pub(crate) fn new(subject: String, rx: mpsc::Receiver<InboundMessage>) -> Self {
        Self { subject, rx }
    }

    /// Subject this subscription is bound to.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Receives the next message, or `None` once the transport closes.
    pub async fn recv(&mut self) -> Option<InboundMessage> {
        self.rx.recv().await
    }
}

/// Publish/subscribe primitives plus correlated request/reply.
///
/// Implementations wrap one broker connection. The in-process [`MemoryBus`]
/// is the reference implementation; a real broker client plugs in behind
/// the same trait.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Publishes an envelope to a subject. Fire-and-forget.
    ///
    /// # Errors
    ///
    /// Fails with [`TransportError::Closed`] after `close()`, or
    /// [`TransportError::BadSubject`] for rejected subjects.
    async fn publish(&self, subject: &str, envelope: Envelope) -> Result<(), TransportError>;

    /// Sends a request and waits up to `timeout` for the correlated reply.
    ///
    /// A zero timeout expires immediately and deterministically, which makes
    /// intentional-timeout tests reliable. Timeout expiry releases the
    /// internal correlation entry; nothing leaks.
    ///
    /// # Errors
    ///
    /// Fails with [`TransportError::Timeout`] when no reply arrives in time,
    /// [`TransportError::Closed`] if the connection is or becomes closed,
    /// or [`TransportError::BadSubject`] for rejected subjects.
    async fn request(
        &self,
        subject: &str,
        envelope: Envelope,
        timeout: Duration,
    ) -> Result<Envelope, TransportError>;

    /// Subscribes to a subject, returning an infinite cancellable stream.
    ///
    /// # Errors
    ///
    /// Fails with [`TransportError::Closed`] or [`TransportError::BadSubject`].
    async fn subscribe(&self, subject: &str) -> Result<Subscription, TransportError>;
}
