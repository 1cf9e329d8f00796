//! Event publishing/subscription abstraction (mechanics only).
//!
//! The bus distributes registry notifications to whoever synchronizes the
//! catalog. It is intentionally lightweight:
//!
//! - **Transport-agnostic**: in-memory channels today, a registry client later
//! - **At-least-once delivery**: a notification may arrive twice; consumers must
//!   be idempotent (a synchronization run is)
//! - **No persistence**: a missed notification is repaired by the next one for
//!   the same service

use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::Duration;

/// A subscription to an event stream.
///
/// Each subscription gets a copy of every published message (broadcast
/// semantics) and is meant to be drained by a single thread.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, std::sync::mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, std::sync::mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// Domain-agnostic pub/sub abstraction.
///
/// ```text
/// Registry feed → EventBus (publish) → SyncWorker → SyncEngine::sync
/// ```
///
/// `publish()` can fail (bus poisoned, transport down); the failure goes back
/// to the publisher, which may retry. Implementations must be `Send + Sync` so
/// several feeds can publish concurrently.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
