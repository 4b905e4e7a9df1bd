//! Endpoint addressing and the per-endpoint descriptor/runtime-state record.
//!
//! Direction is bit 7 of the endpoint address and transfer type is a small
//! repr(u8) enum, same encoding USB itself uses on the wire. Endpoints
//! live in a direction-keyed map here rather than a fixed `[T; 16]` array:
//! sixteen is a USB addressing limit, not a reason to size a data
//! structure around it.

use num_enum::TryFromPrimitive;

/// A transfer direction, named from the host's point of view.
///
/// IN = device -> host. OUT = host -> device. This matches bit 7 of
/// `bEndpointAddress` in the USB specification.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum UsbDirection {
    Out,
    In,
}

impl UsbDirection {
    const MASK: u8 = 0x80;

    fn from_address(addr: u8) -> Self {
        if addr & Self::MASK != 0 {
            UsbDirection::In
        } else {
            UsbDirection::Out
        }
    }
}

/// A USB endpoint address: an endpoint number (0..=15) plus a direction,
/// encoded exactly as `bEndpointAddress` is on the wire.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct EndpointAddress(u8);

impl EndpointAddress {
    /// Builds an address from a raw endpoint number and direction. Panics
    /// if `number` does not fit in the low 4 bits (USB endpoints are
    /// numbered 0..=15).
    pub fn from_parts(number: u8, direction: UsbDirection) -> Self {
        assert!(number <= 15, "endpoint number {number} out of range 0..=15");

        let bit = match direction {
            UsbDirection::In => UsbDirection::MASK,
            UsbDirection::Out => 0,
        };

        EndpointAddress(number | bit)
    }

    /// Builds an address from the raw wire byte (`bEndpointAddress`).
    pub fn from_raw(addr: u8) -> Self {
        EndpointAddress(addr)
    }

    /// The raw wire byte.
    pub fn raw(&self) -> u8 {
        self.0
    }

    /// The endpoint number, direction bit masked off.
    pub fn number(&self) -> u8 {
        self.0 & 0x0f
    }

    /// The transfer direction encoded in bit 7.
    pub fn direction(&self) -> UsbDirection {
        UsbDirection::from_address(self.0)
    }

    /// `true` if this is the control endpoint (EP0), which is
    /// bidirectional and handled inline rather than by a reader/writer
    /// pair.
    pub fn is_control(&self) -> bool {
        self.number() == 0
    }
}

impl std::fmt::Debug for EndpointAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:02x}", self.0)
    }
}

/// The transfer type of an endpoint, encoded in bits 0..=1 of
/// `bmAttributes`.
#[repr(u8)]
#[derive(Copy, Clone, Eq, PartialEq, Debug, TryFromPrimitive)]
pub enum EndpointType {
    Control = 0b00,
    Isochronous = 0b01,
    Bulk = 0b10,
    Interrupt = 0b11,
}

impl EndpointType {
    /// Whether a bulk IN transfer whose length is an exact multiple of
    /// `max_packet_size` must be followed by a zero-length packet to
    /// signal the end of the logical transfer. Only bulk endpoints
    /// require this; interrupt and isochronous transfers are
    /// self-delimiting by their periodic nature.
    pub fn requires_zlp_on_exact_multiple(&self) -> bool {
        matches!(self, EndpointType::Bulk)
    }
}

/// Descriptor data plus runtime state for one configured, non-zero
/// endpoint.
///
/// EP0 (the control endpoint) is represented separately by the
/// [`crate::manager::Manager`] control loop and never gets an `Endpoint`
/// of its own here — see the reader/invariant note in `spec.md` §3.
#[derive(Debug, Clone)]
pub struct Endpoint {
    address: EndpointAddress,
    attributes: EndpointType,
    max_packet_size: u16,
    interval: u8,
    started: bool,
}

impl Endpoint {
    pub fn new(address: EndpointAddress, attributes: EndpointType, max_packet_size: u16, interval: u8) -> Self {
        Endpoint {
            address,
            attributes,
            max_packet_size,
            interval,
            started: false,
        }
    }

    pub fn address(&self) -> EndpointAddress {
        self.address
    }

    pub fn attributes(&self) -> EndpointType {
        self.attributes
    }

    pub fn max_packet_size(&self) -> u16 {
        self.max_packet_size
    }

    pub fn interval(&self) -> u8 {
        self.interval
    }

    /// Whether this endpoint delivers data toward the host.
    pub fn is_in(&self) -> bool {
        self.address.direction() == UsbDirection::In
    }

    /// Whether this endpoint carries data from the host toward the
    /// device.
    pub fn is_out(&self) -> bool {
        !self.is_in()
    }

    /// Whether this endpoint's relay workers have been started.
    pub fn is_started(&self) -> bool {
        self.started
    }

    pub(crate) fn mark_started(&mut self) {
        self.started = true;
    }

    pub(crate) fn mark_stopped(&mut self) {
        self.started = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_round_trips_through_the_wire_byte() {
        let in_ep = EndpointAddress::from_parts(1, UsbDirection::In);
        assert_eq!(in_ep.raw(), 0x81);
        assert_eq!(in_ep.number(), 1);
        assert_eq!(in_ep.direction(), UsbDirection::In);

        let out_ep = EndpointAddress::from_parts(1, UsbDirection::Out);
        assert_eq!(out_ep.raw(), 0x01);
        assert_eq!(out_ep.direction(), UsbDirection::Out);
    }

    #[test]
    fn ep0_is_recognized_regardless_of_direction() {
        assert!(EndpointAddress::from_parts(0, UsbDirection::In).is_control());
        assert!(EndpointAddress::from_parts(0, UsbDirection::Out).is_control());
        assert!(!EndpointAddress::from_parts(1, UsbDirection::In).is_control());
    }

    #[test]
    fn only_bulk_requires_a_trailing_zlp() {
        assert!(EndpointType::Bulk.requires_zlp_on_exact_multiple());
        assert!(!EndpointType::Interrupt.requires_zlp_on_exact_multiple());
        assert!(!EndpointType::Isochronous.requires_zlp_on_exact_multiple());
    }
}
