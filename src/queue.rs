//! Bounded, typed per-endpoint queues connecting readers, injectors and
//! writers.
//!
//! Queue identity is `(direction, endpoint_number) -> queue` (`spec.md`
//! §3). The original implementation used one POSIX message queue per
//! direction per of 16 fixed endpoint slots and manual pipe file
//! descriptors for injector "packet ready" signaling; §9 REDESIGN FLAGS
//! replaces both with one typed bounded channel per active endpoint, kept
//! in a map rather than a fixed `[T; 16]` array.

use std::collections::HashMap;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::endpoint::EndpointAddress;
use crate::packet::Packet;

/// The default queue depth for a single endpoint's packet queue. Raised
/// under the `high-throughput-queues` feature for callers relaying
/// high-rate isochronous endpoints, where a shallow queue would shed
/// packets the writer simply hasn't been scheduled to drain yet.
#[cfg(not(feature = "high-throughput-queues"))]
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

#[cfg(feature = "high-throughput-queues")]
pub const DEFAULT_QUEUE_DEPTH: usize = 512;

/// The producing side of one endpoint's queue. Cheap to clone: every
/// reader and every injector bound to this endpoint holds its own clone.
#[derive(Clone)]
pub struct QueueSender {
    inner: SyncSender<Packet>,
}

/// Whether an enqueue attempt succeeded or found the queue full.
#[derive(Debug, Eq, PartialEq)]
pub enum SendOutcome {
    Sent,
    /// The queue was full; the caller's packet was not enqueued and is
    /// returned so the caller can hand it to `full_pipe` (`spec.md` §4.6).
    Full(Packet),
}

impl QueueSender {
    /// Attempts to enqueue without blocking, per `spec.md` §5: "there is
    /// no blocking backpressure on readers (dropping is preferred to
    /// head-of-line blocking the bus)".
    pub fn try_send(&self, packet: Packet) -> SendOutcome {
        match self.inner.try_send(packet) {
            Ok(()) => SendOutcome::Sent,
            Err(TrySendError::Full(packet)) => SendOutcome::Full(packet),
            Err(TrySendError::Disconnected(packet)) => SendOutcome::Full(packet),
        }
    }
}

/// The consuming side of one endpoint's queue, owned by that endpoint's
/// single writer.
pub struct QueueReceiver {
    inner: Receiver<Packet>,
}

impl QueueReceiver {
    /// Blocks for up to `timeout` for the next packet, returning `None` on
    /// timeout so the writer can re-check its halt flag (`spec.md` §5's
    /// "Suspension points ... inside queue dequeue").
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Packet> {
        self.inner.recv_timeout(timeout).ok()
    }
}

/// Creates a new bounded queue of the given depth, returning its sender
/// and receiver halves.
pub fn channel(depth: usize) -> (QueueSender, QueueReceiver) {
    let (tx, rx) = sync_channel(depth);
    (QueueSender { inner: tx }, QueueReceiver { inner: rx })
}

/// The registry of active endpoints' queue senders, keyed by endpoint
/// address. `RelayReader`s and `Injector`s look senders up here;
/// `QueueReceiver`s are not stored here since each belongs to exactly one
/// `RelayWriter` and is moved into that worker's thread directly.
#[derive(Clone, Default)]
pub struct EndpointQueues {
    senders: Arc<Mutex<HashMap<EndpointAddress, QueueSender>>>,
}

impl EndpointQueues {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, address: EndpointAddress, sender: QueueSender) {
        self.senders.lock().unwrap().insert(address, sender);
    }

    pub(crate) fn unregister(&self, address: EndpointAddress) {
        self.senders.lock().unwrap().remove(&address);
    }

    /// Looks up the sender for `address`, if that endpoint is currently
    /// active.
    pub fn sender(&self, address: EndpointAddress) -> Option<QueueSender> {
        self.senders.lock().unwrap().get(&address).cloned()
    }

    /// Every endpoint address currently active, for injector binding.
    pub fn active_addresses(&self) -> Vec<EndpointAddress> {
        self.senders.lock().unwrap().keys().copied().collect()
    }

    /// A view of this registry restricted to `allowed`, the endpoint
    /// addresses an injector's [`crate::injector::Criteria`] resolved
    /// against the enumerated device tree at bind time (`spec.md` §4.8
    /// step 4). The restriction is enforced live: an endpoint that isn't
    /// active yet (the configuration hasn't been selected) looks up
    /// empty here exactly as it would on the unrestricted registry, and
    /// starts resolving once `start_data_relaying` registers it, with no
    /// separate re-bind step.
    pub fn restricted(&self, allowed: Vec<EndpointAddress>) -> BoundQueues {
        BoundQueues {
            inner: self.clone(),
            allowed: Arc::new(allowed),
        }
    }
}

/// An [`EndpointQueues`] view narrowed to the endpoint addresses one
/// injector was bound to at relay-start time. `sender` is the only
/// operation an [`crate::injector::Injector`] needs and the only one
/// exposed here, so a bound injector has no way to reach a queue its
/// criteria didn't resolve to.
#[derive(Clone)]
pub struct BoundQueues {
    inner: EndpointQueues,
    allowed: Arc<Vec<EndpointAddress>>,
}

impl BoundQueues {
    /// Looks up the sender for `address`, if it is both currently active
    /// and within this injector's bound set.
    pub fn sender(&self, address: EndpointAddress) -> Option<QueueSender> {
        if !self.allowed.contains(&address) {
            return None;
        }
        self.inner.sender(address)
    }

    /// The endpoint addresses this injector was bound to, regardless of
    /// whether each is currently active.
    pub fn bound_addresses(&self) -> &[EndpointAddress] {
        &self.allowed
    }
}
