//! In-process broker: the reference [`Transport`] implementation.
//!
//! A `MemoryBus` is a subject table of bounded subscriber channels plus a
//! pending-call table for request/reply correlation. Fan-out is
//! non-blocking: a slow subscriber loses the message rather than stalling
//! the publisher, and closed subscribers are pruned in passing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use wirebus_core::{new_inbox, Envelope};

use super::{InboundMessage, Subscription, Transport, TransportError};
use crate::config::RuntimeConfig;

/// One outstanding client request awaiting its reply.
///
/// Removed on reply arrival or timeout expiry, whichever comes first.
#[derive(Debug)]
struct PendingCall {
    slot: oneshot::Sender<Envelope>,
}

#[derive(Debug)]
struct SubEntry {
    tx: mpsc::Sender<InboundMessage>,
}

#[derive(Debug)]
struct BusInner {
    /// Subject -> active subscriber channels.
    subs: DashMap<String, Vec<SubEntry>>,
    /// Reply subject -> pending request slot.
    pending: DashMap<String, PendingCall>,
    closed: AtomicBool,
    capacity: usize,
}

/// In-process publish/subscribe broker with request/reply correlation.
///
/// Cheaply cloneable; all clones share one broker state, the way every
/// component of a process shares one broker connection.
#[derive(Debug, Clone)]
pub struct MemoryBus {
    inner: Arc<BusInner>,
}

fn validate_subject(subject: &str) -> Result<(), TransportError> {
    let ok = !subject.is_empty()
        && !subject
            .chars()
            .any(|c| c.is_whitespace() || c == '*' || c == '>');
    if ok {
        Ok(())
    } else {
        Err(TransportError::BadSubject {
            subject: subject.to_string(),
        })
    }
}

impl MemoryBus {
    /// Opens a new in-process broker connection.
    #[must_use]
    pub fn connect(config: &RuntimeConfig) -> Self {
        Self {
            inner: Arc::new(BusInner {
                subs: DashMap::new(),
                pending: DashMap::new(),
                closed: AtomicBool::new(false),
                capacity: config.inbound_channel_capacity,
            }),
        }
    }

    /// Closes the bus: all subsequent operations fail with
    /// [`TransportError::Closed`], subscriptions end, and outstanding
    /// requests fail.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.subs.clear();
        // Dropping the slots wakes every waiting request with a recv error.
        self.inner.pending.clear();
    }

    fn check_open(&self) -> Result<(), TransportError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }

    /// Number of requests currently awaiting a reply.
    #[must_use]
    pub fn pending_calls(&self) -> usize {
        self.inner.pending.len()
    }

    fn fan_out(&self, subject: &str, msg: &InboundMessage) {
        // Reply subjects resolve against the pending-call table first.
        if let Some((_, call)) = self.inner.pending.remove(subject) {
            let _ = call.slot.send(msg.envelope.clone());
            return;
        }

        if let Some(mut entry) = self.inner.subs.get_mut(subject) {
            entry.retain(|sub| match sub.tx.try_send(msg.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(subject, "subscriber queue full, dropping message");
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            });
        }
    }
}

#[async_trait::async_trait]
impl Transport for MemoryBus {
    async fn publish(&self, subject: &str, envelope: Envelope) -> Result<(), TransportError> {
        validate_subject(subject)?;
        self.check_open()?;
        self.fan_out(
            subject,
            &InboundMessage {
                envelope,
                reply: None,
            },
        );
        Ok(())
    }

    async fn request(
        &self,
        subject: &str,
        envelope: Envelope,
        timeout: Duration,
    ) -> Result<Envelope, TransportError> {
        validate_subject(subject)?;
        self.check_open()?;

        // A zero timeout expires before any correlation state exists, so it
        // can never hang and can never leak a pending entry.
        if timeout.is_zero() {
            return Err(TransportError::Timeout {
                elapsed: Duration::ZERO,
            });
        }

        let inbox = new_inbox();
        let (slot_tx, slot_rx) = oneshot::channel();
        let start = Instant::now();
        self.inner
            .pending
            .insert(inbox.clone(), PendingCall { slot: slot_tx });

        self.fan_out(
            subject,
            &InboundMessage {
                envelope,
                reply: Some(inbox.clone()),
            },
        );

        match tokio::time::timeout(timeout, slot_rx).await {
            Ok(Ok(reply)) => Ok(reply),
            // Slot dropped without a reply: the bus was closed underneath us.
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => {
                self.inner.pending.remove(&inbox);
                Err(TransportError::Timeout {
                    elapsed: start.elapsed(),
                })
            }
        }
    }

    async fn subscribe(&self, subject: &str) -> Result<Subscription, TransportError> {
        validate_subject(subject)?;
        self.check_open()?;

        let (tx, rx) = mpsc::channel(self.inner.capacity);
        self.inner
            .subs
            .entry(subject.to_string())
            .or_default()
            .push(SubEntry { tx });
        Ok(Subscription::new(subject.to_string(), rx))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
