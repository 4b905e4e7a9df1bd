//! Relay engine for a man-in-the-middle USB proxy.
//!
//! This crate sits between a downstream USB device and an upstream USB
//! host and relays every control, bulk, interrupt and isochronous transfer
//! between them while giving a chain of [`filter::PacketFilter`]s and a set
//! of [`injector::Injector`]s a chance to observe, mutate, drop or
//! synthesize packets along the way.
//!
//! The concrete transports (a real host-controller library on the device
//! side, a gadget driver or network tunnel on the host side) are out of
//! scope here: [`transport::DeviceProxy`] and [`transport::HostProxy`] are
//! the abstract capabilities this crate consumes. So are concrete filter
//! and injector implementations, config file parsing, a CLI, and dynamic
//! plugin loading — see `SPEC_FULL.md` for the full rationale.

mod error;

pub mod control;
pub mod device;
pub mod endpoint;
pub mod filter;
pub mod injector;
pub mod manager;
pub mod packet;
pub mod plugin;
pub mod queue;
pub mod relay;
pub mod transport;

pub mod stub;

pub use error::{ProxyError, Result};

/// Re-exports of the types most consumers of this crate need.
pub mod prelude {
    pub use crate::control::{Direction, Recipient, Request, RequestType};
    pub use crate::device::{Configuration, Device, Interface};
    pub use crate::endpoint::{Endpoint, EndpointAddress, EndpointType, UsbDirection};
    pub use crate::filter::PacketFilter;
    pub use crate::injector::{Criteria, Injector};
    pub use crate::manager::{Manager, ManagerStatus, RelayConfig};
    pub use crate::packet::{Packet, SetupPacket};
    pub use crate::transport::{DeviceProxy, HostProxy};
    pub use crate::{ProxyError, Result};
}
