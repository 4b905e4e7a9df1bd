//! A minimal demonstration of wiring up a relay session entirely with
//! in-memory stand-ins, for anyone embedding this crate against a real
//! transport to see the shape of the setup.
//!
//! Run with `cargo run --example loopback`.

use std::sync::Arc;
use std::time::Duration;

use usbproxy_core::device::{Configuration, Device, DeviceDescriptor, Interface};
use usbproxy_core::endpoint::{Endpoint, EndpointAddress, EndpointType, UsbDirection};
use usbproxy_core::filter::{PacketFilter, SetupDirection};
use usbproxy_core::manager::{Manager, RelayConfig};
use usbproxy_core::packet::Packet;
use usbproxy_core::prelude::Request;
use usbproxy_core::stub::{StubDeviceProxy, StubHostProxy};

struct LoggingFilter;

impl PacketFilter for LoggingFilter {
    fn on_setup(&self, setup: &Request, direction: SetupDirection) {
        println!("setup: bRequest=0x{:02x} direction={direction:?}", setup.request);
    }

    fn on_data(&self, packet: &mut Packet) {
        println!("data: ep={:?} len={}", packet.endpoint_address(), packet.length());
    }
}

fn demo_device() -> Device {
    let bulk_in = Endpoint::new(EndpointAddress::from_parts(1, UsbDirection::In), EndpointType::Bulk, 64, 0);
    let bulk_out = Endpoint::new(EndpointAddress::from_parts(2, UsbDirection::Out), EndpointType::Bulk, 64, 0);
    let iface = Interface::new(0, 0, 0xff, 0, 0, vec![bulk_in, bulk_out]);
    let cfg = Configuration::new(1, false, 50, vec![iface]);

    Device::new(
        DeviceDescriptor {
            device_class: 0,
            device_sub_class: 0,
            device_protocol: 0,
            max_packet_size_0: 64,
            vendor_id: 0x1d6b,
            product_id: 0x0001,
            device_release: 0x0100,
            num_configurations: 1,
        },
        vec![cfg],
    )
}

fn main() {
    env_logger::init();

    let device = Arc::new(StubDeviceProxy::new());
    let host = Arc::new(StubHostProxy::new());

    let in_ep = EndpointAddress::from_parts(1, UsbDirection::In);
    device.queue_in_data(in_ep, vec![0xde, 0xad, 0xbe, 0xef]);

    host.submit_control_request(
        Request {
            direction: usbproxy_core::control::Direction::HostToDevice,
            request_type: usbproxy_core::control::RequestType::Standard,
            recipient: usbproxy_core::control::Recipient::Device,
            request: usbproxy_core::control::standard_request::SET_CONFIGURATION,
            value: 1,
            index: 0,
            length: 0,
        },
        None,
    );

    let manager = Arc::new(Manager::new(
        device,
        host.clone(),
        demo_device(),
        usbproxy_core::filter::FilterChain::new(vec![Box::new(LoggingFilter)]),
        vec![],
        RelayConfig::new().with_control_timeout(Duration::from_millis(20)),
    ));

    let stopper = manager.clone();
    let handle = std::thread::spawn(move || manager.run());

    std::thread::sleep(Duration::from_millis(200));
    stopper.stop();
    handle.join().unwrap().expect("relay session failed");

    println!("relayed to host: {:?}", host.sent_data(in_ep));
}
