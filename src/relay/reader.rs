//! One worker per active endpoint, pulling transfers off the wire and
//! onto that endpoint's queue.
//!
//! Grounded on `spec.md` §4.6. Unlike the original's `RelayReader` (no
//! surviving header under `original_source/` — it is described only in
//! `spec.md`), this reader never blocks indefinitely: every `receive`
//! call carries a timeout, so the halt check below always runs within
//! bounded latency of the flag being set.

use std::sync::Arc;
use std::time::Duration;

use crate::endpoint::{EndpointAddress, EndpointType};
use crate::packet::Packet;
use crate::queue::QueueSender;
use crate::transport::ReceiveOutcome;

use super::{FullPipeHandler, Halt, Side};

/// Reads IN transfers from `source` and feeds them onto `queue`,
/// non-blocking, until `halt` is set or the transport fails fatally.
pub struct RelayReader {
    source: Side,
    endpoint: EndpointAddress,
    attrs: EndpointType,
    max_packet_size: u16,
    queue: QueueSender,
    full_pipe: Arc<dyn FullPipeHandler>,
    halt: Halt,
    poll_timeout: Duration,
}

impl RelayReader {
    pub fn new(
        source: Side,
        endpoint: EndpointAddress,
        attrs: EndpointType,
        max_packet_size: u16,
        queue: QueueSender,
        full_pipe: Arc<dyn FullPipeHandler>,
        halt: Halt,
        poll_timeout: Duration,
    ) -> Self {
        RelayReader {
            source,
            endpoint,
            attrs,
            max_packet_size,
            queue,
            full_pipe,
            halt,
            poll_timeout,
        }
    }

    /// The worker's main loop (`spec.md` §4.6 steps 1-4). Runs on the
    /// calling thread; the `Manager` spawns this via `std::thread::spawn`.
    pub fn run(self) {
        loop {
            if self.halt.is_set() {
                return;
            }

            match self
                .source
                .receive(self.endpoint, self.attrs, self.max_packet_size, self.poll_timeout)
            {
                Ok(ReceiveOutcome::Data { data, end_of_transfer }) => {
                    let packet = if end_of_transfer {
                        Packet::ending_transfer(self.endpoint, data)
                    } else {
                        Packet::new(self.endpoint, data)
                    };
                    if let crate::queue::SendOutcome::Full(packet) = self.queue.try_send(packet) {
                        self.full_pipe.full_pipe(self.endpoint, packet);
                    }
                }
                Ok(ReceiveOutcome::Timeout) => continue,
                Err(err) => {
                    log::warn!("endpoint {:?}: reader stopping after I/O error: {err}", self.endpoint);
                    return;
                }
            }
        }
    }
}
