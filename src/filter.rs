//! The per-packet observation/mutation hook.
//!
//! A set of default-implemented callback methods a concrete type
//! overrides selectively, dispatched over a `Vec<Box<dyn PacketFilter>>`
//! in insertion order. `on_data` takes `&mut Packet` rather than `&self`
//! so a filter can reallocate the buffer outright, not just write within
//! it in place.

use crate::control::Request;
use crate::packet::Packet;

/// The direction of the setup stage being observed, named from the
/// host's point of view (matches `spec.md`'s "`on_setup(setup,
/// direction_out)`").
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum SetupDirection {
    Out,
    In,
}

/// A per-packet observation/mutation hook, shared across every active
/// endpoint.
///
/// Filters are invoked synchronously on the calling thread: setup hooks
/// on the `Manager`'s control loop thread, data hooks on the relevant
/// endpoint's writer thread. The same filter instance can therefore be
/// called concurrently from different endpoints' writer threads — a
/// filter that needs cross-endpoint consistency must synchronize
/// internally (`spec.md` §5).
pub trait PacketFilter: Send + Sync {
    /// Observes (but cannot mutate) a control setup stage. `direction`
    /// reflects the request's data-stage direction.
    fn on_setup(&self, _setup: &Request, _direction: SetupDirection) {}

    /// Observes and may mutate a bulk/interrupt/isochronous packet.
    /// Setting `packet.transmit = false` drops it; rewriting
    /// `packet.data_mut()` changes what the writer sends.
    ///
    /// Must not resize `packet.data()` such that the writer cannot
    /// transmit it as a single transfer bounded by the endpoint's
    /// `max_packet_size` (`spec.md` §3 invariant iv) — the relay engine
    /// itself does not enforce this; it is a filter-authoring contract.
    fn on_data(&self, packet: &mut Packet) {
        let _ = packet;
    }
}

/// An ordered, shared filter chain. Cheap to clone: each endpoint's writer
/// holds its own `Arc` to the same underlying `Vec`.
#[derive(Clone, Default)]
pub struct FilterChain {
    filters: std::sync::Arc<Vec<Box<dyn PacketFilter>>>,
}

impl FilterChain {
    pub fn new(filters: Vec<Box<dyn PacketFilter>>) -> Self {
        FilterChain {
            filters: std::sync::Arc::new(filters),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Runs every filter's `on_setup` hook in insertion order.
    pub fn run_setup(&self, setup: &Request, direction: SetupDirection) {
        for filter in self.filters.iter() {
            filter.on_setup(setup, direction);
        }
    }

    /// Runs every filter's `on_data` hook in insertion order,
    /// unconditionally — a filter that drops the packet still hands it to
    /// every filter after it, with `packet.transmit == false`. Filter
    /// composition (`spec.md` §8): running `[F, G]` equals running `F`
    /// then `G` on the artifact `F` produced, and that artifact is still
    /// there for `G` to observe even when `F` dropped it. A filter that
    /// only acts on live packets checks `packet.transmit` itself.
    pub fn run_data(&self, packet: &mut Packet) {
        for filter in self.filters.iter() {
            filter.on_data(packet);
        }
    }
}
