//! One worker per active endpoint, running each dequeued packet through
//! the filter chain and then onto the opposite side's wire.
//!
//! Grounded on `spec.md` §4.7. The zero-length-packet rule is the one
//! piece of USB protocol semantics the relay engine must get right
//! itself rather than deferring to a filter: a bulk transfer whose final
//! packet is an exact multiple of `max_packet_size` is indistinguishable
//! on the wire from "more data follows" unless a trailing ZLP closes it
//! out (`EndpointType::requires_zlp_on_exact_multiple`). "Final packet"
//! is read off `Packet::ends_transfer`, not inferred from this packet's
//! own length — a continuous stream of exact-mps chunks with no signaled
//! boundary must never pick up a ZLP after every chunk (`spec.md` §8
//! scenario 1).

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::endpoint::{EndpointAddress, EndpointType};
use crate::filter::FilterChain;
use crate::queue::QueueReceiver;

use super::{Halt, LoggingFullPipeHandler, Side};

/// Dequeues packets for one endpoint, filters them, and relays survivors
/// to `sink`, emitting a trailing ZLP where the endpoint type requires
/// one.
pub struct RelayWriter {
    sink: Side,
    endpoint: EndpointAddress,
    attrs: EndpointType,
    max_packet_size: u16,
    queue: QueueReceiver,
    filters: FilterChain,
    full_pipe: Arc<LoggingFullPipeHandler>,
    halt: Halt,
    poll_timeout: Duration,
}

impl RelayWriter {
    pub fn new(
        sink: Side,
        endpoint: EndpointAddress,
        attrs: EndpointType,
        max_packet_size: u16,
        queue: QueueReceiver,
        filters: FilterChain,
        full_pipe: Arc<LoggingFullPipeHandler>,
        halt: Halt,
        poll_timeout: Duration,
    ) -> Self {
        RelayWriter {
            sink,
            endpoint,
            attrs,
            max_packet_size,
            queue,
            filters,
            full_pipe,
            halt,
            poll_timeout,
        }
    }

    /// The diagnostic drop count accumulated by this endpoint's
    /// [`super::FullPipeHandler`] (`spec.md` §9 Open Questions: exposed
    /// internally, not propagated through the relay's external
    /// interfaces).
    pub fn dropped_count(&self) -> usize {
        self.full_pipe.counter().load(Ordering::Relaxed)
    }

    /// The worker's main loop (`spec.md` §4.7). Runs on the calling
    /// thread; the `Manager` spawns this via `std::thread::spawn`.
    pub fn run(self) {
        loop {
            if self.halt.is_set() {
                return;
            }

            let mut packet = match self.queue.recv_timeout(self.poll_timeout) {
                Some(packet) => packet,
                None => continue,
            };

            self.filters.run_data(&mut packet);
            if !packet.transmit {
                continue;
            }

            let needs_zlp = packet.ends_transfer()
                && self.attrs.requires_zlp_on_exact_multiple()
                && self.max_packet_size > 0
                && packet.length() > 0
                && packet.length() % self.max_packet_size == 0;

            if let Err(err) = self.sink.send(self.endpoint, self.attrs, self.max_packet_size, packet.data()) {
                log::warn!("endpoint {:?}: writer stopping after I/O error: {err}", self.endpoint);
                return;
            }

            if needs_zlp {
                if let Err(err) = self.sink.send(self.endpoint, self.attrs, self.max_packet_size, &[]) {
                    log::warn!("endpoint {:?}: failed to send trailing ZLP: {err}", self.endpoint);
                    return;
                }
            }
        }
    }
}
