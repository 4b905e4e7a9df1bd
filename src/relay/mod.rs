//! The reader/writer worker pair and the queue-overflow hook that
//! connects them.
//!
//! Grounded on `spec.md` §4.6–§4.7. Each active non-control endpoint gets
//! at most one [`reader::RelayReader`] and exactly one
//! [`writer::RelayWriter`] (`spec.md` §3 invariants i/ii); both are plain
//! `std::thread` workers woken by I/O timeouts or bounded queue waits, per
//! §5's "Parallel OS threads (one per worker). No cooperative scheduler."

pub mod reader;
pub mod writer;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::endpoint::{EndpointAddress, EndpointType};
use crate::packet::Packet;
use crate::transport::{DeviceProxy, HostProxy, ReceiveOutcome};

/// Which physical side a reader reads from or a writer writes to.
///
/// A non-control endpoint's data source is the device when it is IN (the
/// reader pulls from the device, the writer relays it to the host) and
/// the host when it is OUT, and vice versa (`spec.md` §4.8's
/// `start_data_relaying`: "Spawn a `RelayReader` on the data source
/// (device for OUT-relative-to-device-i.e.-IN-to-host, host for
/// OUT-from-host) bound to `(ep, attrs, mps)`").
#[derive(Clone)]
pub enum Side {
    Device(Arc<dyn DeviceProxy>),
    Host(Arc<dyn HostProxy>),
}

impl Side {
    pub(crate) fn receive(
        &self,
        endpoint: EndpointAddress,
        attrs: EndpointType,
        max_packet_size: u16,
        timeout: Duration,
    ) -> crate::Result<ReceiveOutcome> {
        match self {
            Side::Device(d) => d.receive(endpoint, attrs, max_packet_size, timeout),
            Side::Host(h) => h.receive(endpoint, attrs, max_packet_size, timeout),
        }
    }

    pub(crate) fn send(
        &self,
        endpoint: EndpointAddress,
        attrs: EndpointType,
        max_packet_size: u16,
        data: &[u8],
    ) -> crate::Result<()> {
        match self {
            Side::Device(d) => d.send(endpoint, attrs, max_packet_size, data),
            Side::Host(h) => h.send(endpoint, attrs, max_packet_size, data),
        }
    }
}

/// A one-shot cooperative cancellation flag, checked by every worker
/// between blocking I/O calls (`spec.md` §5: "`halt` is a one-shot atomic
/// boolean observed by every worker after each I/O call").
#[derive(Clone, Default)]
pub struct Halt(Arc<AtomicBool>);

impl Halt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn shared(&self) -> Arc<AtomicBool> {
        self.0.clone()
    }
}

/// The hook a `RelayReader` invokes synchronously, on its own thread, when
/// its endpoint's queue is full (`spec.md` §4.6). The default
/// implementation drops the packet and logs a warning, which is also the
/// only behavior the core specifies (`spec.md` §9 Open Questions:
/// dropped-packet reporting is not propagated beyond this hook).
pub trait FullPipeHandler: Send + Sync {
    fn full_pipe(&self, endpoint: EndpointAddress, packet: Packet);
}

/// Drops the packet and logs a warning; counts drops in `dropped`, which
/// [`writer::RelayWriter::dropped_count`] exposes as a diagnostic.
pub struct LoggingFullPipeHandler {
    dropped: Arc<AtomicUsize>,
}

impl LoggingFullPipeHandler {
    pub fn new() -> Self {
        LoggingFullPipeHandler {
            dropped: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn counter(&self) -> Arc<AtomicUsize> {
        self.dropped.clone()
    }
}

impl Default for LoggingFullPipeHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl FullPipeHandler for LoggingFullPipeHandler {
    fn full_pipe(&self, endpoint: EndpointAddress, packet: Packet) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        log::warn!(
            "endpoint {endpoint:?}: queue full, dropping {} byte packet",
            packet.length()
        );
    }
}
