//! Independent packet sources attached to one or more endpoints.
//!
//! Grounded on the original's `Injector` (`original_source/lib/Injector.h`):
//! a `halt` flag, a `listen()` main loop, and per-endpoint queue handles
//! set by the `Manager` at bind time. The original holds raw `mqd_t`
//! arrays for all 16 possible endpoint numbers per direction and a
//! `criteria` struct of four matchers; this crate keeps the four matchers
//! (`Criteria`) but replaces the fixed arrays with the same
//! `EndpointQueues` registry `RelayReader`/`RelayWriter` use (§9 REDESIGN
//! FLAGS).

use crate::endpoint::EndpointAddress;
use crate::queue::BoundQueues;

/// Selection criteria used at relay-start time to decide which endpoints'
/// queues an injector may produce into. `None` in any field means "don't
/// care" at that level.
#[derive(Debug, Clone, Default)]
pub struct Criteria {
    pub device: Option<(u16, u16)>,
    pub configuration: Option<u8>,
    pub interface: Option<u8>,
    pub endpoint: Option<EndpointAddress>,
}

impl Criteria {
    /// Whether a concrete endpoint address, found under the given
    /// configuration/interface identity, is matched by this criteria set.
    pub fn matches(&self, configuration_value: u8, interface_number: u8, endpoint: EndpointAddress) -> bool {
        if let Some(cfg) = self.configuration {
            if cfg != configuration_value {
                return false;
            }
        }
        if let Some(iface) = self.interface {
            if iface != interface_number {
                return false;
            }
        }
        if let Some(ep) = self.endpoint {
            if ep != endpoint {
                return false;
            }
        }
        true
    }
}

/// A long-lived packet producer independent of the reader/writer
/// pipeline.
///
/// `listen` runs on its own dedicated thread, spawned by the `Manager` at
/// `start_control_relaying` time, and returns once `halt` is observed.
/// Implementations read from their own source (a file, a socket, a timer)
/// and push produced packets into `queues`, looked up by the endpoint
/// address each packet targets. `queues` only resolves addresses this
/// injector's [`Criteria`] matched against the enumerated device tree at
/// bind time (`spec.md` §4.8 step 4) — an address outside that set looks
/// up empty regardless of whether it's otherwise active.
pub trait Injector: Send + Sync {
    /// The criteria used to bind this injector to endpoint queues at
    /// relay-start time.
    fn criteria(&self) -> &Criteria;

    /// Runs the injector's main loop. `queues` is this injector's bound
    /// view of the currently-active endpoint queues; `halt` is a one-shot
    /// flag this loop must check between blocking operations and return
    /// promptly once set.
    fn listen(&self, queues: BoundQueues, halt: std::sync::Arc<std::sync::atomic::AtomicBool>);
}
