use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{QueueError, Result};

/// An opaque message envelope carrying `(index, document_id, attempt_count)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub index: String,
    pub document_id: String,
    pub attempt_count: u32,
}

impl Message {
    pub fn new(index: impl Into<String>, document_id: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            document_id: document_id.into(),
            attempt_count: 0,
        }
    }
}

/// A time-bounded exclusive claim on a dequeued message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LeaseToken(Uuid);

impl fmt::Display for LeaseToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What happened as a result of a `nack`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NackOutcome {
    /// Re-scheduled for delivery after the requested delay.
    Requeued,
    /// `attempt_count` exceeded `max_attempts`; the message moved to the
    /// dead-letter area and must not be re-delivered.
    Poisoned,
}

/// Polymorphic capability set: `enqueue`, `dequeue`, `ack`, `nack`.
/// At-least-once delivery, per-(index, document_id) FIFO ordering,
/// visibility-timeout leases, poison/dead-letter handling.
#[async_trait]
pub trait Queue: Send + Sync {
    async fn enqueue(&self, message: Message) -> Result<()>;
    async fn dequeue(&self) -> Result<Option<(Message, LeaseToken)>>;
    async fn ack(&self, lease: &LeaseToken) -> Result<()>;
    async fn nack(&self, lease: &LeaseToken, delay: Duration) -> Result<NackOutcome>;
    /// Returns a leased message to the ready queue without counting it as a
    /// delivery attempt. For orchestrator-side infrastructure failures (e.g.
    /// the state store is unavailable) where the message itself is blameless.
    async fn release(&self, lease: &LeaseToken) -> Result<()>;
    async fn dead_letters(&self, index: &str) -> Result<Vec<Message>>;
}

struct Leased {
    message: Message,
    expires_at: Instant,
}

struct Inner {
    ready: VecDeque<Message>,
    delayed: Vec<(Instant, Message)>,
    leased: HashMap<Uuid, Leased>,
    dead_letters: Vec<Message>,
}

/// Single-process in-memory queue. The reference implementation exercised
/// by tests and the default backend for the shipped binary.
pub struct InMemoryQueue {
    inner: Mutex<Inner>,
    visibility_timeout: Duration,
    max_attempts: u32,
}

impl InMemoryQueue {
    pub fn new(visibility_timeout: Duration, max_attempts: u32) -> Self {
        Self {
            inner: Mutex::new(Inner {
                ready: VecDeque::new(),
                delayed: Vec::new(),
                leased: HashMap::new(),
                dead_letters: Vec::new(),
            }),
            visibility_timeout,
            max_attempts,
        }
    }

    /// Promote delayed messages whose visibility delay has elapsed, and
    /// return expired leases (lease expiry, not an attempt) to visible state.
    fn sweep(inner: &mut Inner) {
        let now = Instant::now();

        let mut still_delayed = Vec::new();
        for (visible_at, message) in inner.delayed.drain(..) {
            if visible_at <= now {
                inner.ready.push_back(message);
            } else {
                still_delayed.push((visible_at, message));
            }
        }
        inner.delayed = still_delayed;

        let expired: Vec<Uuid> = inner
            .leased
            .iter()
            .filter(|(_, leased)| leased.expires_at <= now)
            .map(|(token, _)| *token)
            .collect();

        for token in expired {
            if let Some(leased) = inner.leased.remove(&token) {
                warn!(document_id = %leased.message.document_id, "lease expired, returning message to queue");
                inner.ready.push_front(leased.message);
            }
        }
    }
}

#[async_trait]
impl Queue for InMemoryQueue {
    async fn enqueue(&self, message: Message) -> Result<()> {
        let mut inner = self.inner.lock().await;
        debug!(document_id = %message.document_id, "enqueued message");
        inner.ready.push_back(message);
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<(Message, LeaseToken)>> {
        let mut inner = self.inner.lock().await;
        Self::sweep(&mut inner);

        let Some(message) = inner.ready.pop_front() else {
            return Ok(None);
        };

        let token = Uuid::new_v4();
        inner.leased.insert(
            token,
            Leased {
                message: message.clone(),
                expires_at: Instant::now() + self.visibility_timeout,
            },
        );

        Ok(Some((message, LeaseToken(token))))
    }

    async fn ack(&self, lease: &LeaseToken) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.leased.remove(&lease.0);
        Ok(())
    }

    async fn nack(&self, lease: &LeaseToken, delay: Duration) -> Result<NackOutcome> {
        let mut inner = self.inner.lock().await;
        let Some(leased) = inner.leased.remove(&lease.0) else {
            return Err(QueueError::UnknownLease(lease.to_string()));
        };

        let mut message = leased.message;
        message.attempt_count += 1;

        if message.attempt_count > self.max_attempts {
            warn!(document_id = %message.document_id, attempts = message.attempt_count, "message poisoned");
            inner.dead_letters.push(message);
            return Ok(NackOutcome::Poisoned);
        }

        inner.delayed.push((Instant::now() + delay, message));
        Ok(NackOutcome::Requeued)
    }

    async fn release(&self, lease: &LeaseToken) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let Some(leased) = inner.leased.remove(&lease.0) else {
            return Err(QueueError::UnknownLease(lease.to_string()));
        };
        inner.ready.push_front(leased.message);
        Ok(())
    }

    async fn dead_letters(&self, index: &str) -> Result<Vec<Message>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .dead_letters
            .iter()
            .filter(|m| m.index == index)
            .cloned()
            .collect())
    }
}
