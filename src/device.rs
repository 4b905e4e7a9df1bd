//! The enumerated view of the downstream device.
//!
//! `Device` is owned by the [`crate::manager::Manager`] for the lifetime
//! of a relay session and is read-only once `SETUP` completes (`spec.md`
//! §5: "The `Device` descriptor tree is read-only after `SETUP` completes
//! and is safely shared by reference"). Its shape parallels the teacher's
//! `UsbDeviceInfo`/descriptor-building code in `device.rs`/`descriptor.rs`,
//! generalized from "one device this crate builds descriptors for" to "one
//! device this crate already enumerated and must describe".

use std::collections::HashMap;

use crate::endpoint::{Endpoint, EndpointAddress};
use crate::injector::Criteria;

/// The standard USB device descriptor fields this crate needs to drive
/// enumeration replay and `SET_CONFIGURATION` handling. Additional fields
/// (language IDs, string descriptor contents, ...) are opaque to the
/// relay engine and stay in whatever raw descriptor bytes a filter chain
/// chooses to rewrite.
#[derive(Debug, Clone)]
pub struct DeviceDescriptor {
    pub device_class: u8,
    pub device_sub_class: u8,
    pub device_protocol: u8,
    pub max_packet_size_0: u8,
    pub vendor_id: u16,
    pub product_id: u16,
    pub device_release: u16,
    pub num_configurations: u8,
}

/// One interface of one configuration: its alternate-setting identity
/// plus the endpoints it declares (EP0 excluded — it belongs to no
/// interface).
#[derive(Debug, Clone)]
pub struct Interface {
    pub interface_number: u8,
    pub alternate_setting: u8,
    pub interface_class: u8,
    pub interface_sub_class: u8,
    pub interface_protocol: u8,
    endpoints: Vec<Endpoint>,
}

impl Interface {
    pub fn new(
        interface_number: u8,
        alternate_setting: u8,
        interface_class: u8,
        interface_sub_class: u8,
        interface_protocol: u8,
        endpoints: Vec<Endpoint>,
    ) -> Self {
        Interface {
            interface_number,
            alternate_setting,
            interface_class,
            interface_sub_class,
            interface_protocol,
            endpoints,
        }
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub(crate) fn endpoints_mut(&mut self) -> &mut [Endpoint] {
        &mut self.endpoints
    }
}

/// One configuration: its own `bConfigurationValue` plus the interface
/// tree active when that configuration is selected.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub configuration_value: u8,
    pub self_powered: bool,
    pub max_power: u8,
    interfaces: Vec<Interface>,
}

impl Configuration {
    pub fn new(configuration_value: u8, self_powered: bool, max_power: u8, interfaces: Vec<Interface>) -> Self {
        Configuration {
            configuration_value,
            self_powered,
            max_power,
            interfaces,
        }
    }

    pub fn interfaces(&self) -> &[Interface] {
        &self.interfaces
    }

    /// All endpoints across every interface of this configuration, the
    /// set `Manager::start_data_relaying` starts a reader/writer pair for.
    pub fn endpoints(&self) -> impl Iterator<Item = &Endpoint> {
        self.interfaces.iter().flat_map(|i| i.endpoints())
    }

    /// The first alternate setting declared for `interface_number`.
    pub fn find_interface(&self, interface_number: u8) -> Option<&Interface> {
        self.interfaces.iter().find(|i| i.interface_number == interface_number)
    }

    /// The specific alternate setting a `SET_INTERFACE` request selected.
    /// Distinct interface numbers can share an alternate-setting value,
    /// so both fields are needed to disambiguate.
    pub fn find_interface_alt(&self, interface_number: u8, alternate_setting: u8) -> Option<&Interface> {
        self.interfaces
            .iter()
            .find(|i| i.interface_number == interface_number && i.alternate_setting == alternate_setting)
    }

    pub(crate) fn set_endpoints_started(&mut self, started: bool) {
        for iface in self.interfaces.iter_mut() {
            for ep in iface.endpoints_mut() {
                if started {
                    ep.mark_started();
                } else {
                    ep.mark_stopped();
                }
            }
        }
    }
}

/// The enumerated view of the downstream device: its device descriptor,
/// the set of configurations it advertises, and which one is currently
/// active.
#[derive(Debug, Clone)]
pub struct Device {
    pub descriptor: DeviceDescriptor,
    configurations: Vec<Configuration>,
    active_configuration: Option<u8>,

    /// The alternate setting selected per interface number, by the most
    /// recent `SET_INTERFACE` request. Interface numbers absent from this
    /// map default to alternate setting 0, the USB-mandated default
    /// before any `SET_INTERFACE` has been issued.
    active_alternates: HashMap<u8, u8>,

    /// Compatibility knobs carried in capture/trace output. Not produced
    /// by this crate (pcap emission is a filter implementation and is out
    /// of scope); kept here purely as configuration data per `spec.md`
    /// §9's Open Questions, which treat the original's hardcoded
    /// `device_address=1`/`bus_id=1` as a config knob rather than a
    /// required compatibility value.
    pub device_address: u8,
    pub bus_id: u8,
}

impl Device {
    pub fn new(descriptor: DeviceDescriptor, configurations: Vec<Configuration>) -> Self {
        Device {
            descriptor,
            configurations,
            active_configuration: None,
            active_alternates: HashMap::new(),
            device_address: 1,
            bus_id: 1,
        }
    }

    pub fn configurations(&self) -> &[Configuration] {
        &self.configurations
    }

    pub fn find_configuration(&self, configuration_value: u8) -> Option<&Configuration> {
        self.configurations
            .iter()
            .find(|c| c.configuration_value == configuration_value)
    }

    pub(crate) fn find_configuration_mut(&mut self, configuration_value: u8) -> Option<&mut Configuration> {
        self.configurations
            .iter_mut()
            .find(|c| c.configuration_value == configuration_value)
    }

    pub fn active_configuration(&self) -> Option<&Configuration> {
        self.active_configuration
            .and_then(|value| self.find_configuration(value))
    }

    pub(crate) fn set_active_configuration(&mut self, configuration_value: u8) {
        self.active_configuration = Some(configuration_value);
    }

    pub(crate) fn clear_active_configuration(&mut self) {
        self.active_configuration = None;
        self.active_alternates.clear();
    }

    /// The alternate setting currently selected for `interface_number`,
    /// defaulting to 0.
    pub fn alternate_setting(&self, interface_number: u8) -> u8 {
        *self.active_alternates.get(&interface_number).unwrap_or(&0)
    }

    pub(crate) fn set_alternate_setting(&mut self, interface_number: u8, alternate_setting: u8) {
        self.active_alternates.insert(interface_number, alternate_setting);
    }

    /// The endpoints of the active configuration's currently-selected
    /// alternate setting of each interface — unlike
    /// [`Configuration::endpoints`], this does not also return endpoints
    /// of alternates that `SET_INTERFACE` has since superseded.
    pub fn active_endpoints(&self) -> Vec<&Endpoint> {
        let Some(cfg) = self.active_configuration() else {
            return Vec::new();
        };

        let mut interface_numbers: Vec<u8> = cfg.interfaces().iter().map(|i| i.interface_number).collect();
        interface_numbers.sort_unstable();
        interface_numbers.dedup();

        interface_numbers
            .into_iter()
            .filter_map(|number| {
                let alt = self.alternate_setting(number);
                cfg.find_interface_alt(number, alt).or_else(|| cfg.find_interface(number))
            })
            .flat_map(|iface| iface.endpoints())
            .collect()
    }

    /// Resolves an injector's [`Criteria`] against every endpoint this
    /// device has enumerated, across every configuration and interface
    /// alternate, not just the currently active one (`spec.md` §4.8 step
    /// 4: injectors are bound during `SETUP`, before `SET_CONFIGURATION`
    /// has selected anything). An injector bound this way picks up its
    /// matched endpoints' queues as each becomes active and loses them
    /// again once the configuration changes away, with no separate
    /// re-bind step (`queue::EndpointQueues::restricted`).
    pub fn endpoints_matching(&self, criteria: &Criteria) -> Vec<EndpointAddress> {
        if let Some((vendor_id, product_id)) = criteria.device {
            if (self.descriptor.vendor_id, self.descriptor.product_id) != (vendor_id, product_id) {
                return Vec::new();
            }
        }

        let mut matched = Vec::new();
        for cfg in &self.configurations {
            for iface in cfg.interfaces() {
                for endpoint in iface.endpoints() {
                    if criteria.matches(cfg.configuration_value, iface.interface_number, endpoint.address()) {
                        matched.push(endpoint.address());
                    }
                }
            }
        }
        matched.sort_by_key(EndpointAddress::raw);
        matched.dedup();
        matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{EndpointAddress, EndpointType, UsbDirection};

    fn sample_device() -> Device {
        let ep_in = Endpoint::new(EndpointAddress::from_parts(1, UsbDirection::In), EndpointType::Bulk, 64, 0);
        let ep_out = Endpoint::new(EndpointAddress::from_parts(2, UsbDirection::Out), EndpointType::Bulk, 64, 0);
        let iface = Interface::new(0, 0, 0xff, 0, 0, vec![ep_in, ep_out]);
        let cfg = Configuration::new(1, false, 50, vec![iface]);

        Device::new(
            DeviceDescriptor {
                device_class: 0,
                device_sub_class: 0,
                device_protocol: 0,
                max_packet_size_0: 64,
                vendor_id: 0x1234,
                product_id: 0x5678,
                device_release: 0x0100,
                num_configurations: 1,
            },
            vec![cfg],
        )
    }

    #[test]
    fn defaults_to_unconfigured() {
        let dev = sample_device();
        assert!(dev.active_configuration().is_none());
    }

    #[test]
    fn set_configuration_exposes_its_endpoints() {
        let mut dev = sample_device();
        dev.set_active_configuration(1);

        let cfg = dev.active_configuration().expect("configuration 1 selected");
        assert_eq!(cfg.endpoints().count(), 2);
    }

    #[test]
    fn device_address_and_bus_id_default_to_one() {
        let dev = sample_device();
        assert_eq!(dev.device_address, 1);
        assert_eq!(dev.bus_id, 1);
    }

    #[test]
    fn active_endpoints_follows_the_selected_alternate_setting() {
        let alt0 = Interface::new(
            0,
            0,
            0xff,
            0,
            0,
            vec![Endpoint::new(EndpointAddress::from_parts(1, UsbDirection::In), EndpointType::Bulk, 64, 0)],
        );
        let alt1 = Interface::new(
            0,
            1,
            0xff,
            0,
            0,
            vec![Endpoint::new(EndpointAddress::from_parts(1, UsbDirection::In), EndpointType::Isochronous, 192, 1)],
        );
        let cfg = Configuration::new(1, false, 50, vec![alt0, alt1]);
        let mut dev = Device::new(
            DeviceDescriptor {
                device_class: 0,
                device_sub_class: 0,
                device_protocol: 0,
                max_packet_size_0: 64,
                vendor_id: 0x1234,
                product_id: 0x5678,
                device_release: 0x0100,
                num_configurations: 1,
            },
            vec![cfg],
        );
        dev.set_active_configuration(1);

        assert_eq!(dev.active_endpoints()[0].attributes(), EndpointType::Bulk);

        dev.set_alternate_setting(0, 1);
        assert_eq!(dev.active_endpoints()[0].attributes(), EndpointType::Isochronous);
    }

    #[test]
    fn endpoints_matching_resolves_before_any_configuration_is_selected() {
        use crate::injector::Criteria;

        let dev = sample_device();
        assert!(dev.active_configuration().is_none());

        let in_ep = EndpointAddress::from_parts(1, UsbDirection::In);
        let matched = dev.endpoints_matching(&Criteria {
            endpoint: Some(in_ep),
            ..Default::default()
        });
        assert_eq!(matched, vec![in_ep]);
    }

    #[test]
    fn endpoints_matching_rejects_a_mismatched_vendor_product_pair() {
        use crate::injector::Criteria;

        let dev = sample_device();
        let matched = dev.endpoints_matching(&Criteria {
            device: Some((0xffff, 0xffff)),
            ..Default::default()
        });
        assert!(matched.is_empty());
    }

    #[test]
    fn wildcard_criteria_matches_every_enumerated_endpoint() {
        use crate::injector::Criteria;

        let dev = sample_device();
        let matched = dev.endpoints_matching(&Criteria::default());
        assert_eq!(matched.len(), 2);
    }
}
