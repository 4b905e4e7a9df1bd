//! A static, name-keyed factory registry standing in for the original's
//! dynamically loaded plugin `.so` files.
//!
//! The original discovers `PacketFilter`/`Injector` implementations by
//! `dlopen`-ing shared objects named in a config file and looking up a
//! well-known constructor symbol in each (`original_source/src/lib/Manager.h`'s
//! plugin list, loaded through libusbproxy's `PluginManager`). `spec.md`
//! §9 REDESIGN FLAGS calls that out explicitly: dynamic loading is a
//! memory-safety hazard with no Rust equivalent worth keeping, so this
//! crate's registry holds ordinary boxed closures, filled in at startup
//! by whoever embeds this crate, with the same "look a filter up by the
//! name a config file gave it" shape the original has.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::filter::PacketFilter;
use crate::injector::Injector;
use crate::{ProxyError, Result};

/// Arbitrary construction-time arguments threaded from whatever
/// configuration format an embedder uses down to a named plugin's
/// factory function. Deliberately untyped (`spec.md` §6: config parsing
/// itself is out of scope for this crate) — a factory downcasts
/// `get_pointer` results for structured data it expects to receive.
pub trait PluginConfig: Send + Sync {
    /// A string-valued configuration key, if present.
    fn get(&self, key: &str) -> Option<&str>;

    /// An arbitrary-typed configuration value, if present, for factories
    /// that need more than a string (e.g. a pre-parsed address list).
    fn get_pointer(&self, key: &str) -> Option<&dyn Any>;
}

/// A `PluginConfig` with nothing configured, for filters and injectors
/// that take no construction-time arguments.
pub struct EmptyPluginConfig;

impl PluginConfig for EmptyPluginConfig {
    fn get(&self, _key: &str) -> Option<&str> {
        None
    }

    fn get_pointer(&self, _key: &str) -> Option<&dyn Any> {
        None
    }
}

type FilterFactory = Box<dyn Fn(&dyn PluginConfig) -> Result<Box<dyn PacketFilter>> + Send + Sync>;
type InjectorFactory = Box<dyn Fn(&dyn PluginConfig) -> Result<Arc<dyn Injector>> + Send + Sync>;

/// Maps plugin names to the factory functions that construct them.
///
/// Registration happens once, at process startup, by whoever embeds this
/// crate; `Manager::start_control_relaying` looks names up here against
/// whatever a session's configuration names, the same two-step
/// "registry, then instantiate by name" the original's `PluginManager`
/// does.
#[derive(Default)]
pub struct PluginRegistry {
    filters: HashMap<String, FilterFactory>,
    injectors: HashMap<String, InjectorFactory>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_filter<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&dyn PluginConfig) -> Result<Box<dyn PacketFilter>> + Send + Sync + 'static,
    {
        self.filters.insert(name.into(), Box::new(factory));
    }

    pub fn register_injector<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&dyn PluginConfig) -> Result<Arc<dyn Injector>> + Send + Sync + 'static,
    {
        self.injectors.insert(name.into(), Box::new(factory));
    }

    pub fn build_filter(&self, name: &str, config: &dyn PluginConfig) -> Result<Box<dyn PacketFilter>> {
        let factory = self
            .filters
            .get(name)
            .ok_or_else(|| ProxyError::PluginNotFound(name.to_string()))?;
        factory(config)
    }

    pub fn build_injector(&self, name: &str, config: &dyn PluginConfig) -> Result<Arc<dyn Injector>> {
        let factory = self
            .injectors
            .get(name)
            .ok_or_else(|| ProxyError::PluginNotFound(name.to_string()))?;
        factory(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::EndpointAddress;
    use crate::injector::Criteria;
    use crate::packet::Packet;
    use std::sync::atomic::AtomicBool;

    struct Noop;
    impl PacketFilter for Noop {}

    struct NoopInjector(Criteria);
    impl Injector for NoopInjector {
        fn criteria(&self) -> &Criteria {
            &self.0
        }
        fn listen(&self, _queues: crate::queue::BoundQueues, _halt: Arc<AtomicBool>) {}
    }

    #[test]
    fn builds_a_registered_filter_by_name() {
        let mut registry = PluginRegistry::new();
        registry.register_filter("noop", |_config| Ok(Box::new(Noop)));

        let filter = registry.build_filter("noop", &EmptyPluginConfig).unwrap();
        let mut packet = Packet::new(EndpointAddress::from_raw(0x81), vec![1]);
        filter.on_data(&mut packet);
        assert!(packet.transmit);
    }

    #[test]
    fn unknown_name_is_a_plugin_not_found_error() {
        let registry = PluginRegistry::new();
        assert!(matches!(
            registry.build_filter("missing", &EmptyPluginConfig),
            Err(ProxyError::PluginNotFound(name)) if name == "missing"
        ));
    }

    #[test]
    fn builds_a_registered_injector_by_name() {
        let mut registry = PluginRegistry::new();
        registry.register_injector("noop", |_config| Ok(Arc::new(NoopInjector(Criteria::default()))));

        let injector = registry.build_injector("noop", &EmptyPluginConfig).unwrap();
        assert!(injector.criteria().device.is_none());
    }
}
