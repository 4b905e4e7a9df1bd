//! In-memory `DeviceProxy`/`HostProxy` implementations used by this
//! crate's own tests.
//!
//! The teacher tests against hardware-independent fakes too, just one
//! layer further down: `dummy_bus.rs`'s `DummyBus` exists so `UsbClass`
//! impls can be unit-tested without a real USB peripheral, and
//! `other_examples/3c785155_vitalyvb-usbd-class-tester__src-bus.rs.rs`'s
//! `EmulatedUsbBus` goes further and drives a `UsbDevice` from the host
//! side entirely in memory. `StubDeviceProxy`/`StubHostProxy` play the
//! same role here: in-process queues standing in for a physical bus, so
//! `Manager`'s relay logic is testable without any real transport.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::control::Request;
use crate::device::Device;
use crate::endpoint::{EndpointAddress, EndpointType};
use crate::error::ProxyError;
use crate::transport::{DeviceProxy, HostControlRequest, HostProxy, ReceiveOutcome};

#[derive(Default)]
struct Endpoints {
    /// Each queued chunk plus whether it closes out its logical transfer
    /// (`spec.md` §4.7; see `Packet::ends_transfer`). Tests that don't
    /// care push with `queue_in_data`, which defaults to `false` — a
    /// continuous stream with no signaled boundary.
    incoming: HashMap<EndpointAddress, VecDeque<(Vec<u8>, bool)>>,
    outgoing: HashMap<EndpointAddress, Vec<Vec<u8>>>,
}

/// A fake device: tests push bytes into it with [`StubDeviceProxy::queue_in_data`]
/// for the reader side to pick up, and inspect what the writer side sent
/// it with [`StubDeviceProxy::sent_data`].
#[derive(Clone, Default)]
pub struct StubDeviceProxy {
    endpoints: Arc<Mutex<Endpoints>>,
    connected: Arc<std::sync::atomic::AtomicBool>,
    control_replies: Arc<Mutex<VecDeque<Vec<u8>>>>,
    interface_events: Arc<Mutex<Vec<InterfaceEvent>>>,
}

/// A recorded `claim_interface`/`release_interface` call, in call order,
/// for tests that assert `Manager` claims an interface before starting
/// its endpoints' workers and releases it before tearing them down.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum InterfaceEvent {
    Claimed(u8),
    Released(u8),
}

impl StubDeviceProxy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `receive` on `endpoint` yield `data` the next time it's
    /// polled, instead of timing out, with no transfer boundary signaled
    /// — the common case of a continuous stream (`spec.md` §8 scenario 1).
    pub fn queue_in_data(&self, endpoint: EndpointAddress, data: Vec<u8>) {
        self.endpoints
            .lock()
            .unwrap()
            .incoming
            .entry(endpoint)
            .or_default()
            .push_back((data, false));
    }

    /// Like [`StubDeviceProxy::queue_in_data`], but signals that `data`
    /// is the final chunk of its logical transfer, so the writer may owe
    /// a trailing ZLP if its length is an exact multiple of the
    /// endpoint's `max_packet_size`.
    pub fn queue_in_data_ending_transfer(&self, endpoint: EndpointAddress, data: Vec<u8>) {
        self.endpoints
            .lock()
            .unwrap()
            .incoming
            .entry(endpoint)
            .or_default()
            .push_back((data, true));
    }

    /// Everything sent to `endpoint` via `send`, oldest first.
    pub fn sent_data(&self, endpoint: EndpointAddress) -> Vec<Vec<u8>> {
        self.endpoints
            .lock()
            .unwrap()
            .outgoing
            .get(&endpoint)
            .cloned()
            .unwrap_or_default()
    }

    /// Queues the data stage this device's next forwarded control
    /// request should return.
    pub fn queue_control_reply(&self, data: Vec<u8>) {
        self.control_replies.lock().unwrap().push_back(data);
    }

    /// Every `claim_interface`/`release_interface` call this proxy has
    /// seen, oldest first.
    pub fn interface_events(&self) -> Vec<InterfaceEvent> {
        self.interface_events.lock().unwrap().clone()
    }
}

impl DeviceProxy for StubDeviceProxy {
    fn connect(&self, _timeout: Duration) -> crate::Result<()> {
        self.connected.store(true, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }

    fn disconnect(&self) {
        self.connected.store(false, std::sync::atomic::Ordering::SeqCst);
    }

    fn reset(&self) {}

    fn is_connected(&self) -> bool {
        self.connected.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn is_highspeed(&self) -> bool {
        false
    }

    fn control_request(&self, _request: &Request, _data: &[u8], _timeout: Duration) -> crate::Result<Vec<u8>> {
        Ok(self.control_replies.lock().unwrap().pop_front().unwrap_or_default())
    }

    fn send(&self, endpoint: EndpointAddress, _attrs: EndpointType, _max_packet_size: u16, data: &[u8]) -> crate::Result<()> {
        self.endpoints
            .lock()
            .unwrap()
            .outgoing
            .entry(endpoint)
            .or_default()
            .push(data.to_vec());
        Ok(())
    }

    fn receive(
        &self,
        endpoint: EndpointAddress,
        _attrs: EndpointType,
        _max_packet_size: u16,
        timeout: Duration,
    ) -> crate::Result<ReceiveOutcome> {
        let popped = self.endpoints.lock().unwrap().incoming.get_mut(&endpoint).and_then(VecDeque::pop_front);
        match popped {
            Some((data, end_of_transfer)) => Ok(ReceiveOutcome::Data { data, end_of_transfer }),
            None => {
                std::thread::sleep(timeout.min(Duration::from_millis(5)));
                Ok(ReceiveOutcome::Timeout)
            }
        }
    }

    fn claim_interface(&self, interface_number: u8) -> crate::Result<()> {
        self.interface_events.lock().unwrap().push(InterfaceEvent::Claimed(interface_number));
        Ok(())
    }

    fn release_interface(&self, interface_number: u8) -> crate::Result<()> {
        self.interface_events.lock().unwrap().push(InterfaceEvent::Released(interface_number));
        Ok(())
    }

    fn address(&self) -> u8 {
        1
    }
}

/// A fake host, symmetric to [`StubDeviceProxy`]. Tests drive its control
/// surface with [`StubHostProxy::submit_control_request`] and inspect
/// stalls/acks with [`StubHostProxy::last_control_outcome`].
#[derive(Clone, Default)]
pub struct StubHostProxy {
    endpoints: Arc<Mutex<Endpoints>>,
    connected: Arc<std::sync::atomic::AtomicBool>,
    pending_control: Arc<Mutex<VecDeque<PendingEvent>>>,
    control_outcome: Arc<Mutex<Option<ControlOutcome>>>,
}

enum PendingEvent {
    Control(Request, Option<Vec<u8>>),
    Reset,
}

/// What the `Manager`'s control loop ultimately did with the most
/// recently submitted request, for test assertions.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ControlOutcome {
    Acked,
    CompletedIn(Vec<u8>),
    Stalled(EndpointAddress),
}

impl StubHostProxy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_in_data(&self, endpoint: EndpointAddress, data: Vec<u8>) {
        self.endpoints
            .lock()
            .unwrap()
            .incoming
            .entry(endpoint)
            .or_default()
            .push_back((data, false));
    }

    pub fn sent_data(&self, endpoint: EndpointAddress) -> Vec<Vec<u8>> {
        self.endpoints
            .lock()
            .unwrap()
            .outgoing
            .get(&endpoint)
            .cloned()
            .unwrap_or_default()
    }

    /// Simulates the host issuing a control request, with an optional
    /// OUT-stage payload.
    pub fn submit_control_request(&self, request: Request, data: Option<Vec<u8>>) {
        self.pending_control.lock().unwrap().push_back(PendingEvent::Control(request, data));
    }

    /// Simulates the host signaling a bus reset.
    pub fn submit_bus_reset(&self) {
        self.pending_control.lock().unwrap().push_back(PendingEvent::Reset);
    }

    pub fn last_control_outcome(&self) -> Option<ControlOutcome> {
        self.control_outcome.lock().unwrap().clone()
    }
}

impl HostProxy for StubHostProxy {
    fn connect(&self, _device: &Device, _timeout: Duration) -> crate::Result<()> {
        self.connected.store(true, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }

    fn disconnect(&self) {
        self.connected.store(false, std::sync::atomic::Ordering::SeqCst);
    }

    fn reset(&self) {}

    fn is_connected(&self) -> bool {
        self.connected.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn control_request(&self, timeout: Duration) -> crate::Result<HostControlRequest> {
        match self.pending_control.lock().unwrap().pop_front() {
            Some(PendingEvent::Control(request, data)) => Ok(HostControlRequest::Pending { request, data }),
            Some(PendingEvent::Reset) => Ok(HostControlRequest::BusReset),
            None => {
                std::thread::sleep(timeout.min(Duration::from_millis(5)));
                Ok(HostControlRequest::None)
            }
        }
    }

    fn complete_control_in(&self, data: &[u8]) -> crate::Result<()> {
        *self.control_outcome.lock().unwrap() = Some(ControlOutcome::CompletedIn(data.to_vec()));
        Ok(())
    }

    fn control_ack(&self) -> crate::Result<()> {
        *self.control_outcome.lock().unwrap() = Some(ControlOutcome::Acked);
        Ok(())
    }

    fn stall_ep(&self, endpoint: EndpointAddress) -> crate::Result<()> {
        *self.control_outcome.lock().unwrap() = Some(ControlOutcome::Stalled(endpoint));
        Ok(())
    }

    fn send(&self, endpoint: EndpointAddress, _attrs: EndpointType, _max_packet_size: u16, data: &[u8]) -> crate::Result<()> {
        self.endpoints
            .lock()
            .unwrap()
            .outgoing
            .entry(endpoint)
            .or_default()
            .push(data.to_vec());
        Ok(())
    }

    fn send_wait_complete(&self, _endpoint: EndpointAddress, _timeout: Duration) -> crate::Result<bool> {
        Ok(true)
    }

    fn receive(
        &self,
        endpoint: EndpointAddress,
        _attrs: EndpointType,
        _max_packet_size: u16,
        timeout: Duration,
    ) -> crate::Result<ReceiveOutcome> {
        let popped = self.endpoints.lock().unwrap().incoming.get_mut(&endpoint).and_then(VecDeque::pop_front);
        match popped {
            Some((data, end_of_transfer)) => Ok(ReceiveOutcome::Data { data, end_of_transfer }),
            None => {
                std::thread::sleep(timeout.min(Duration::from_millis(5)));
                Ok(ReceiveOutcome::Timeout)
            }
        }
    }

    fn set_config(&self, _device: &Device, _is_highspeed: bool) -> crate::Result<()> {
        Ok(())
    }
}

/// Convenience constructor mirroring `ProxyError::Transport`, used by
/// fakes that need to simulate a fatal transport failure.
pub fn transport_error(message: impl Into<String>) -> ProxyError {
    ProxyError::Transport(message.into())
}
