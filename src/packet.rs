//! Owned value types for one relayed USB transfer.
//!
//! These are plain data, not trait objects — a reader or an injector
//! creates one, it passes through exactly one filter chain, and the
//! writer that dequeues it releases it after transmitting or dropping it
//! (`spec.md` §4.1). Ownership transfer across a queue boundary is a move,
//! enforced here simply by `Packet`/`SetupPacket` not implementing `Copy`.

use crate::control::Request;
use crate::endpoint::EndpointAddress;

/// One USB data transfer captured off a bulk, interrupt or isochronous
/// endpoint.
#[derive(Debug, Clone)]
pub struct Packet {
    endpoint_address: EndpointAddress,
    data: Vec<u8>,
    /// When `false`, instructs the writer to drop this packet instead of
    /// transmitting it.
    pub transmit: bool,
    /// Whether this packet closes out its logical transfer, i.e. whether
    /// its producer (a reader relaying a transport-signaled transfer
    /// boundary, or an injector synthesizing a complete reply) knows no
    /// more data follows on this endpoint before the next distinct
    /// transfer begins. The writer only ever appends a trailing ZLP when
    /// this is `true` and the packet's length is an exact multiple of
    /// `max_packet_size` — a packet's own length can never be enough to
    /// infer this on its own, since a streaming endpoint can emit any
    /// number of mps-sized chunks with no transfer boundary between them
    /// (`spec.md` §4.7, §8 scenario 1).
    end_of_transfer: bool,
}

impl Packet {
    /// Creates a new packet ready to transmit, with no known transfer
    /// boundary (the common case: a continuous stream of chunks with no
    /// signaled end).
    pub fn new(endpoint_address: EndpointAddress, data: Vec<u8>) -> Self {
        Packet {
            endpoint_address,
            data,
            transmit: true,
            end_of_transfer: false,
        }
    }

    /// Creates a new packet that is known to be the final chunk of its
    /// logical transfer, e.g. because the source transport signaled the
    /// transfer's end or because an injector is synthesizing one
    /// complete reply in a single packet.
    pub fn ending_transfer(endpoint_address: EndpointAddress, data: Vec<u8>) -> Self {
        let mut packet = Self::new(endpoint_address, data);
        packet.end_of_transfer = true;
        packet
    }

    pub fn endpoint_address(&self) -> EndpointAddress {
        self.endpoint_address
    }

    /// Whether this packet closes out its logical transfer. See the field
    /// doc comment for why this can't be derived from `length()` alone.
    pub fn ends_transfer(&self) -> bool {
        self.end_of_transfer
    }

    /// Marks this packet as closing out its logical transfer.
    pub fn mark_end_of_transfer(&mut self) {
        self.end_of_transfer = true;
    }

    /// The transfer length in bytes, i.e. `data.len()` narrowed to the
    /// `u16` a single USB transfer descriptor can express.
    pub fn length(&self) -> u16 {
        self.data.len() as u16
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable access to the payload for filters that rewrite data in
    /// place or reallocate it entirely (`spec.md` §4.4: a filter "may
    /// freely rewrite `packet.data` in place within existing allocation or
    /// reallocate").
    pub fn data_mut(&mut self) -> &mut Vec<u8> {
        &mut self.data
    }

    /// Drops this packet: the writer will not transmit it.
    pub fn drop_packet(&mut self) {
        self.transmit = false;
    }
}

/// A USB control request: the 8-byte standard setup header plus an
/// optional owned data stage.
#[derive(Debug, Clone)]
pub struct SetupPacket {
    pub request: Request,
    data: Option<Vec<u8>>,
}

impl SetupPacket {
    pub fn new(request: Request, data: Option<Vec<u8>>) -> Self {
        SetupPacket { request, data }
    }

    /// A setup packet with no data stage (`wLength == 0`).
    pub fn without_data(request: Request) -> Self {
        SetupPacket { request, data: None }
    }

    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    pub fn data_mut(&mut self) -> &mut Option<Vec<u8>> {
        &mut self.data
    }

    pub fn has_data_stage(&self) -> bool {
        self.request.length > 0
    }
}
