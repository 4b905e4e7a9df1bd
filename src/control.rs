//! Control-transfer request parsing.
//!
//! Same four-field breakdown of `bmRequestType` and the same
//! `Request::parse` shape used elsewhere in this ecosystem, but decoded
//! with checked matches rather than a `mem::transmute` over the raw byte
//! (valid only when every bit pattern of the target `repr(u8)` enum is
//! inhabited) — this crate does not need to shave the last few cycles
//! off a USB interrupt handler.

use crate::error::{ProxyError, Result};

/// Bit 7 of `bmRequestType`: the direction of the data stage, named from
/// the host's point of view.
#[repr(u8)]
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Direction {
    HostToDevice = 0,
    DeviceToHost = 1,
}

/// Bits 5..=6 of `bmRequestType`.
#[repr(u8)]
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum RequestType {
    Standard = 0,
    Class = 1,
    Vendor = 2,
    Reserved = 3,
}

/// Bits 0..=4 of `bmRequestType`.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Recipient {
    Device,
    Interface,
    Endpoint,
    Other,
    Reserved,
}

/// A parsed 8-byte USB control `SETUP` header.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Request {
    pub direction: Direction,
    pub request_type: RequestType,
    pub recipient: Recipient,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
}

impl Request {
    /// Parses the 8-byte wire representation of a setup header.
    pub fn parse(buf: &[u8]) -> Result<Request> {
        if buf.len() != 8 {
            return Err(ProxyError::InvalidSetupPacket);
        }

        let bm_request_type = buf[0];
        let recipient_bits = bm_request_type & 0b0001_1111;

        let direction = if bm_request_type & 0x80 != 0 {
            Direction::DeviceToHost
        } else {
            Direction::HostToDevice
        };

        let request_type = match (bm_request_type >> 5) & 0b11 {
            0 => RequestType::Standard,
            1 => RequestType::Class,
            2 => RequestType::Vendor,
            _ => RequestType::Reserved,
        };

        let recipient = match recipient_bits {
            0 => Recipient::Device,
            1 => Recipient::Interface,
            2 => Recipient::Endpoint,
            3 => Recipient::Other,
            _ => Recipient::Reserved,
        };

        Ok(Request {
            direction,
            request_type,
            recipient,
            request: buf[1],
            value: u16::from_le_bytes([buf[2], buf[3]]),
            index: u16::from_le_bytes([buf[4], buf[5]]),
            length: u16::from_le_bytes([buf[6], buf[7]]),
        })
    }

    /// Serializes back to the 8-byte wire representation.
    pub fn to_bytes(&self) -> [u8; 8] {
        let bm_request_type = ((self.direction as u8) << 7)
            | ((self.request_type as u8) << 5)
            | (self.recipient_bits());

        let mut out = [0u8; 8];
        out[0] = bm_request_type;
        out[1] = self.request;
        out[2..4].copy_from_slice(&self.value.to_le_bytes());
        out[4..6].copy_from_slice(&self.index.to_le_bytes());
        out[6..8].copy_from_slice(&self.length.to_le_bytes());
        out
    }

    fn recipient_bits(&self) -> u8 {
        match self.recipient {
            Recipient::Device => 0,
            Recipient::Interface => 1,
            Recipient::Endpoint => 2,
            Recipient::Other => 3,
            Recipient::Reserved => 4,
        }
    }

    /// `true` if the data stage (if any) flows from device to host, i.e.
    /// this is an IN-type control request.
    pub fn is_device_to_host(&self) -> bool {
        self.direction == Direction::DeviceToHost
    }
}

/// Standard request codes (`bRequest` values defined by the USB
/// specification itself, as opposed to class- or vendor-specific ones).
pub mod standard_request {
    pub const GET_STATUS: u8 = 0;
    pub const CLEAR_FEATURE: u8 = 1;
    pub const SET_FEATURE: u8 = 3;
    pub const SET_ADDRESS: u8 = 5;
    pub const GET_DESCRIPTOR: u8 = 6;
    pub const SET_DESCRIPTOR: u8 = 7;
    pub const GET_CONFIGURATION: u8 = 8;
    pub const SET_CONFIGURATION: u8 = 9;
    pub const GET_INTERFACE: u8 = 10;
    pub const SET_INTERFACE: u8 = 11;
    pub const SYNCH_FRAME: u8 = 12;
}

/// `wValue` for `CLEAR_FEATURE`/`SET_FEATURE` when the recipient is an
/// endpoint: clears or sets the halt (stall) condition.
pub const FEATURE_ENDPOINT_HALT: u16 = 0;
