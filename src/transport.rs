//! Abstract capabilities the core consumes for downstream/upstream I/O.
//!
//! `DeviceProxy` and `HostProxy` are this crate's equivalent of the
//! teacher's `UsbBus`/`UsbCore` trait (`src/bus.rs`, `src/usbcore.rs`):
//! "the core holds the abstraction, not a concrete type" (`spec.md` §9).
//! Concrete backends — a real host-controller library talking to the
//! physical device, a gadget driver or network tunnel talking to the
//! host — are out of scope for this crate; see [`crate::stub`] for the
//! in-memory implementations this crate tests itself against.

use std::time::Duration;

use crate::control::Request;
use crate::device::Device;
use crate::endpoint::{EndpointAddress, EndpointType};

/// The result of a blocking receive: either data arrived, the call timed
/// out (the normal, expected way to get control back to check `halt`), or
/// the transport failed fatally.
#[derive(Debug)]
pub enum ReceiveOutcome {
    /// One chunk of data. `end_of_transfer` is the transport's own
    /// signal for whether this chunk closes out its logical transfer
    /// (e.g. a short read, or the backend's own transfer-complete
    /// notification) — it is the only thing the relay engine trusts to
    /// decide whether a trailing ZLP is owed once this chunk reaches the
    /// writer, since a chunk's length alone can't distinguish "the last
    /// mps-sized piece of this transfer" from "just another piece of an
    /// open-ended stream" (`spec.md` §4.7).
    Data { data: Vec<u8>, end_of_transfer: bool },
    Timeout,
}

/// Downstream I/O: control, bulk/interrupt/isochronous transfers toward
/// and away from the physical device.
pub trait DeviceProxy: Send + Sync {
    fn connect(&self, timeout: Duration) -> crate::Result<()>;
    fn disconnect(&self);
    fn reset(&self);
    fn is_connected(&self) -> bool;
    fn is_highspeed(&self) -> bool;

    /// Issues a control request to the device and returns the resulting
    /// data stage, if any. `data` is the outgoing data stage for an
    /// OUT-type request; the returned `Vec` is the incoming data stage for
    /// an IN-type request.
    fn control_request(&self, request: &Request, data: &[u8], timeout: Duration) -> crate::Result<Vec<u8>>;

    /// Sends an OUT transfer.
    fn send(&self, endpoint: EndpointAddress, attrs: EndpointType, max_packet_size: u16, data: &[u8]) -> crate::Result<()>;

    /// Receives one IN transfer, or times out.
    fn receive(
        &self,
        endpoint: EndpointAddress,
        attrs: EndpointType,
        max_packet_size: u16,
        timeout: Duration,
    ) -> crate::Result<ReceiveOutcome>;

    fn claim_interface(&self, interface_number: u8) -> crate::Result<()>;
    fn release_interface(&self, interface_number: u8) -> crate::Result<()>;

    /// The device's assigned bus address, for logging only.
    fn address(&self) -> u8;
}

/// The outcome of polling the host for a pending control request:
/// present, with the parsed setup header and its data stage, or absent
/// (the poll simply timed out, which is the expected steady-state result
/// and drives the control loop's retry).
///
/// A USB bus reset is not itself a control request, but most host
/// controller APIs multiplex it onto the same event source a control
/// request arrives on, so it's surfaced through this same poll rather
/// than a separate out-of-band channel (`spec.md` §8's bus-reset
/// scenario: "mid-relay, the host signals a bus reset").
#[derive(Debug)]
pub enum HostControlRequest {
    Pending { request: Request, data: Option<Vec<u8>> },
    BusReset,
    None,
}

/// Upstream I/O, symmetric to [`DeviceProxy`] but toward the host.
pub trait HostProxy: Send + Sync {
    fn connect(&self, device: &Device, timeout: Duration) -> crate::Result<()>;
    fn disconnect(&self);
    fn reset(&self);
    fn is_connected(&self) -> bool;

    /// Blocks (up to `timeout`) for the host to issue a control request.
    /// Returns `HostControlRequest::None` on timeout, which is the normal
    /// steady-state outcome and keeps the control loop re-checking
    /// `halt`.
    fn control_request(&self, timeout: Duration) -> crate::Result<HostControlRequest>;

    /// Returns the data stage of a pending IN-type control request to the
    /// host.
    fn complete_control_in(&self, data: &[u8]) -> crate::Result<()>;

    /// Acknowledges a zero-data-stage control request.
    fn control_ack(&self) -> crate::Result<()>;

    /// Stalls an endpoint, signaling a failed forwarded control request.
    fn stall_ep(&self, endpoint: EndpointAddress) -> crate::Result<()>;

    fn send(&self, endpoint: EndpointAddress, attrs: EndpointType, max_packet_size: u16, data: &[u8]) -> crate::Result<()>;

    /// Like [`HostProxy::send`], but blocks until the host has completed
    /// the transfer or `timeout` elapses, returning whether it completed.
    fn send_wait_complete(&self, endpoint: EndpointAddress, timeout: Duration) -> crate::Result<bool>;

    fn receive(
        &self,
        endpoint: EndpointAddress,
        attrs: EndpointType,
        max_packet_size: u16,
        timeout: Duration,
    ) -> crate::Result<ReceiveOutcome>;

    /// Applies the active configuration's wiring to the host side, e.g.
    /// programming a gadget controller's endpoint set.
    fn set_config(&self, device: &Device, is_highspeed: bool) -> crate::Result<()>;
}
