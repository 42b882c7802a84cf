//! Area
//!
//! An area owns its link-state database, the interfaces attached to it
//! and every neighbor on those interfaces. It is the single writer for
//! the database: inbound packets, the one-second tick and local
//! origination all go through `&mut Area`, and everything the area wants
//! sent is queued as `OutboundPacket`s for the caller to drain.

mod flood;
mod handlers;
mod origination;
#[cfg(test)]
mod tests;

use crate::config::{AreaConfig, RouterConfig};
use crate::interface::Interface;
use crate::lsa::{BinSlot, LsaRecord};
use crate::lsdb::LinkStateDatabase;
use crate::neighbor::{LinkContext, Neighbor, NeighborEvent, NeighborState};
use crate::protocol::{Destination, OutboundPacket, Packet, PacketBody};
use crate::topology::{TopologyEvent, TopologyListener, TopologyTracker};
use crate::{AreaId, InterfaceId, RouterId};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Errors from routing a packet into an area.
#[derive(Debug, Error)]
pub enum AreaError {
    #[error("unknown interface: {0}")]
    UnknownInterface(InterfaceId),

    #[error("area {0} is not running")]
    NotRunning(AreaId),

    #[error("packet for area {actual} delivered to area {expected}")]
    AreaMismatch { expected: AreaId, actual: AreaId },

    #[error("no neighbor {router_id} on {interface}")]
    UnknownNeighbor {
        interface: InterfaceId,
        router_id: RouterId,
    },
}

// ============================================================================
// Parameters
// ============================================================================

/// Fixed per-area settings, copied out of the configuration.
#[derive(Clone, Copy, Debug)]
pub struct AreaParams {
    pub router_id: RouterId,
    pub area_id: AreaId,
    pub options: u8,
    pub opaque_capable: bool,
    pub external_routing: bool,
    pub max_exchange_restarts: u32,
    pub min_ls_arrival_secs: u16,
    pub maxage_flush_grace_secs: u64,
}

impl AreaParams {
    pub fn new(router_id: RouterId, router: &RouterConfig, area: &AreaConfig) -> Self {
        Self {
            router_id,
            area_id: area.area_id,
            options: area.options(),
            opaque_capable: area.opaque_capable,
            external_routing: area.external_routing_capability,
            max_exchange_restarts: router.adjacency.max_exchange_restarts,
            min_ls_arrival_secs: router.timers.min_ls_arrival_secs,
            maxage_flush_grace_secs: router.timers.maxage_flush_grace_secs,
        }
    }

    fn link_context<'a>(
        &self,
        lsdb: &'a LinkStateDatabase,
        interface_mtu: u16,
        now_ms: u64,
    ) -> LinkContext<'a> {
        LinkContext {
            router_id: self.router_id,
            interface_mtu,
            options: self.options,
            opaque_capable: self.opaque_capable,
            external_routing: self.external_routing,
            max_exchange_restarts: self.max_exchange_restarts,
            lsdb,
            now_ms,
        }
    }
}

// ============================================================================
// Summaries
// ============================================================================

/// Point-in-time view of one neighbor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NeighborSummary {
    pub interface: InterfaceId,
    pub router_id: RouterId,
    pub address: Ipv4Addr,
    pub state: NeighborState,
    pub is_master: bool,
    pub request_count: usize,
    pub retransmit_count: usize,
}

/// Point-in-time view of an area.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AreaSummary {
    pub area_id: AreaId,
    pub router_id: RouterId,
    pub lsa_count: usize,
    pub max_age_count: usize,
    pub database_version: u64,
    /// Aging ticks processed since the area was created.
    pub ticks: u64,
    pub neighbors: Vec<NeighborSummary>,
}

// ============================================================================
// Area
// ============================================================================

/// One configured area and everything attached to it.
pub struct Area {
    params: AreaParams,
    lsdb: LinkStateDatabase,
    interfaces: BTreeMap<InterfaceId, Interface>,
    outbound: Vec<OutboundPacket>,
    topology: TopologyTracker,
    listeners: Vec<Arc<dyn TopologyListener>>,
    running: bool,
}

impl Area {
    /// Build an area from configuration. Interfaces are numbered in
    /// configuration order.
    pub fn new(router_id: RouterId, router: &RouterConfig, config: &AreaConfig) -> Self {
        let params = AreaParams::new(router_id, router, config);
        let interfaces = (0u32..)
            .zip(&config.interfaces)
            .map(|(index, iface)| {
                let id = InterfaceId::new(index);
                (id, Interface::from_config(id, iface))
            })
            .collect();
        Self {
            params,
            lsdb: LinkStateDatabase::new(
                router_id,
                config.area_id,
                params.options,
                router.timers.age_limits(),
            ),
            interfaces,
            outbound: Vec::new(),
            topology: TopologyTracker::new(),
            listeners: Vec::new(),
            running: false,
        }
    }

    // === Accessors ===

    pub fn area_id(&self) -> AreaId {
        self.params.area_id
    }

    pub fn router_id(&self) -> RouterId {
        self.params.router_id
    }

    pub fn params(&self) -> &AreaParams {
        &self.params
    }

    pub fn lsdb(&self) -> &LinkStateDatabase {
        &self.lsdb
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn interface(&self, id: InterfaceId) -> Option<&Interface> {
        self.interfaces.get(&id)
    }

    pub fn interfaces(&self) -> impl Iterator<Item = &Interface> {
        self.interfaces.values()
    }

    pub fn neighbor(&self, interface: InterfaceId, router_id: &RouterId) -> Option<&Neighbor> {
        self.interfaces.get(&interface)?.neighbor(router_id)
    }

    pub fn topology(&self) -> &TopologyTracker {
        &self.topology
    }

    /// Register a listener for router and link changes.
    pub fn add_listener(&mut self, listener: Arc<dyn TopologyListener>) {
        self.listeners.push(listener);
    }

    /// Drain packets queued for transmission, in the order produced.
    pub fn take_outbound(&mut self) -> Vec<OutboundPacket> {
        std::mem::take(&mut self.outbound)
    }

    pub fn summary(&self) -> AreaSummary {
        let neighbors = self
            .interfaces
            .values()
            .flat_map(|iface| iface.neighbors())
            .map(|n| NeighborSummary {
                interface: n.interface(),
                router_id: n.router_id(),
                address: n.address(),
                state: n.state(),
                is_master: n.is_master(),
                request_count: n.ls_request_list().len(),
                retransmit_count: n.retransmit_list().len(),
            })
            .collect();
        AreaSummary {
            area_id: self.params.area_id,
            router_id: self.params.router_id,
            lsa_count: self.lsdb.len(),
            max_age_count: self.lsdb.max_age_identities().len(),
            database_version: self.lsdb.version(),
            ticks: self.lsdb.ticks(),
            neighbors,
        }
    }

    // === Lifecycle ===

    /// Bring the area up: originate the Router LSA and send the first Hellos.
    pub fn start(&mut self, now_ms: u64) {
        if self.running {
            return;
        }
        self.running = true;
        for iface in self.interfaces.values_mut() {
            iface.start_hellos(now_ms);
        }
        info!(
            area = %self.params.area_id,
            router_id = %self.params.router_id,
            interfaces = self.interfaces.len(),
            "Area started"
        );
        self.originate_router_lsa(None, now_ms);
        self.send_hellos(now_ms);
        self.drain(now_ms);
    }

    /// Tear every adjacency down and stop sending Hellos.
    pub fn shutdown(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        for iface in self.interfaces.values_mut() {
            iface.stop_hellos();
            for neighbor in iface.neighbors_mut() {
                neighbor.kill(NeighborEvent::LlDown);
                neighbor.take_outbox();
                neighbor.take_transitions();
            }
        }
        info!(area = %self.params.area_id, lsas = self.lsdb.len(), "Area stopped");
    }

    // === Inbound ===

    /// Route one received packet to the handler for its type.
    pub fn handle_packet(
        &mut self,
        interface: InterfaceId,
        source: Ipv4Addr,
        packet: Packet,
        now_ms: u64,
    ) -> Result<(), AreaError> {
        if !self.running {
            return Err(AreaError::NotRunning(self.params.area_id));
        }
        if packet.area_id != self.params.area_id {
            return Err(AreaError::AreaMismatch {
                expected: self.params.area_id,
                actual: packet.area_id,
            });
        }
        if !self.interfaces.contains_key(&interface) {
            return Err(AreaError::UnknownInterface(interface));
        }
        if packet.router_id == self.params.router_id {
            debug!(interface = %interface, "Own packet looped back, ignoring");
            return Ok(());
        }

        let from = packet.router_id;
        let result = match packet.body {
            PacketBody::Hello(hello) => self.handle_hello(interface, source, from, hello, now_ms),
            PacketBody::DatabaseDescription(dd) => self.handle_dd(interface, from, dd, now_ms),
            PacketBody::LinkStateRequest(request) => {
                self.handle_ls_request(interface, from, request, now_ms)
            }
            PacketBody::LinkStateUpdate(update) => {
                self.handle_ls_update(interface, from, update, now_ms)
            }
            PacketBody::LinkStateAck(ack) => self.handle_ls_ack(interface, from, ack, now_ms),
        };
        self.drain(now_ms);
        result
    }

    // === Internal ===

    /// Run `f` against one neighbor with a context for its interface.
    fn with_neighbor<R>(
        &mut self,
        interface: InterfaceId,
        router_id: RouterId,
        now_ms: u64,
        f: impl FnOnce(&mut Neighbor, &LinkContext<'_>) -> R,
    ) -> Result<R, AreaError> {
        let params = self.params;
        let iface = self
            .interfaces
            .get_mut(&interface)
            .ok_or(AreaError::UnknownInterface(interface))?;
        let ctx = params.link_context(&self.lsdb, iface.mtu(), now_ms);
        let neighbor = iface
            .neighbor_mut(&router_id)
            .ok_or(AreaError::UnknownNeighbor {
                interface,
                router_id,
            })?;
        Ok(f(neighbor, &ctx))
    }

    fn queue(&mut self, interface: InterfaceId, destination: Destination, body: PacketBody) {
        self.outbound.push(OutboundPacket {
            interface,
            destination,
            packet: Packet::new(self.params.router_id, self.params.area_id, body),
        });
    }

    /// Move neighbor output into the outbound queue, drop neighbors that
    /// timed out and re-originate the Router LSA when an adjacency came
    /// up or went away. Repeats until nothing changes.
    fn drain(&mut self, now_ms: u64) {
        loop {
            let params = self.params;
            let mut adjacency_changed = false;
            let mut expired = Vec::new();

            for (iface_id, iface) in self.interfaces.iter_mut() {
                for neighbor in iface.neighbors_mut() {
                    let destination = Destination::Neighbor(neighbor.address());
                    for body in neighbor.take_outbox() {
                        self.outbound.push(OutboundPacket {
                            interface: *iface_id,
                            destination,
                            packet: Packet::new(params.router_id, params.area_id, body),
                        });
                    }
                    for transition in neighbor.take_transitions() {
                        if transition.to.is_full() || transition.from.is_full() || transition.to.is_down() {
                            adjacency_changed = true;
                        }
                        if transition.event == NeighborEvent::InactivityTimer {
                            expired.push((*iface_id, neighbor.router_id()));
                        }
                    }
                }
            }

            for (iface_id, router_id) in expired {
                if let Some(iface) = self.interfaces.get_mut(&iface_id)
                    && iface.remove_neighbor(&router_id).is_some()
                {
                    debug!(interface = %iface_id, neighbor = %router_id, "Neighbor removed");
                }
            }

            if !adjacency_changed || self.originate_router_lsa(None, now_ms).is_none() {
                break;
            }
        }
    }

    /// Report an installed (or flushed) record to the topology tracker.
    fn notify_installed(&mut self, record: &LsaRecord) {
        let events = self
            .topology
            .lsa_installed(record.lsa(), record.bin() == BinSlot::MaxAge);
        self.dispatch(events);
    }

    fn notify_removed(&mut self, record: &LsaRecord) {
        let events = self.topology.lsa_removed(record.lsa());
        self.dispatch(events);
    }

    fn dispatch(&self, events: Vec<TopologyEvent>) {
        for event in events {
            debug!(area = %self.params.area_id, event = %event, "Topology change");
            for listener in &self.listeners {
                event.notify(self.params.area_id, listener.as_ref());
            }
        }
    }
}

impl std::fmt::Debug for Area {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Area")
            .field("params", &self.params)
            .field("lsas", &self.lsdb.len())
            .field("interfaces", &self.interfaces.len())
            .field("listeners", &self.listeners.len())
            .field("running", &self.running)
            .finish()
    }
}
