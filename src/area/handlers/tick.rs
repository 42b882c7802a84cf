//! Periodic processing: aging, flush sweeps, delayed acknowledgements,
//! Hellos and neighbor timers.

use crate::area::Area;
use crate::interface::Interface;
use crate::protocol::{LinkStateAck, OutboundPacket, Packet, PacketBody};
use tracing::debug;

/// Ticks between aging-bin consistency checks.
const CONSISTENCY_CHECK_TICKS: u64 = 300;

impl Area {
    /// Advance the area by one second.
    ///
    /// Called once per aging tick; a late caller makes up the backlog by
    /// calling repeatedly, never by skipping.
    pub fn tick(&mut self, now_ms: u64) {
        self.age_database(now_ms);
        self.flush_delayed_acks();
        self.send_hellos(now_ms);
        self.poll_neighbor_timers(now_ms);
        self.drain(now_ms);
    }

    fn age_database(&mut self, now_ms: u64) {
        for outcome in self.lsdb.tick() {
            let record = outcome.record().clone();
            self.notify_installed(&record);
            self.flood(&record, None, now_ms);
        }

        let interfaces = &self.interfaces;
        let sweep = self
            .lsdb
            .sweep_flushed(self.params.maxage_flush_grace_secs, |identity| {
                interfaces.values().flat_map(Interface::neighbors).any(|n| {
                    n.retransmit_contains(identity) || n.state().is_synchronizing()
                })
            });
        for record in &sweep.removed {
            self.notify_removed(record);
        }
        for record in &sweep.reoriginated {
            self.notify_installed(record);
            self.flood(record, None, now_ms);
        }

        if self.lsdb.ticks() % CONSISTENCY_CHECK_TICKS == 0 {
            self.lsdb.check_consistency();
        }
    }

    /// Send the acknowledgements delayed since the last tick.
    fn flush_delayed_acks(&mut self) {
        let params = self.params;
        for (iface_id, iface) in self.interfaces.iter_mut() {
            let headers = iface.take_delayed_acks();
            if headers.is_empty() {
                continue;
            }
            let targets: Vec<_> = iface
                .neighbors()
                .filter(|n| n.state().is_exchanging_or_above())
                .map(|n| n.address())
                .collect();
            debug!(interface = %iface.name(), count = headers.len(), "Sending delayed acknowledgements");
            for destination in iface.flood_destinations(&targets) {
                self.outbound.push(OutboundPacket {
                    interface: *iface_id,
                    destination,
                    packet: Packet::new(
                        params.router_id,
                        params.area_id,
                        PacketBody::LinkStateAck(LinkStateAck {
                            headers: headers.clone(),
                        }),
                    ),
                });
            }
        }
    }

    /// Emit a Hello on every interface whose Hello timer expired.
    pub(in crate::area) fn send_hellos(&mut self, now_ms: u64) {
        let params = self.params;
        for (iface_id, iface) in self.interfaces.iter_mut() {
            if !iface.hello_due(now_ms) {
                continue;
            }
            iface.start_static_neighbors(now_ms);
            let hello = iface.build_hello(params.options);
            for destination in iface.hello_destinations() {
                self.outbound.push(OutboundPacket {
                    interface: *iface_id,
                    destination,
                    packet: Packet::new(
                        params.router_id,
                        params.area_id,
                        PacketBody::Hello(hello.clone()),
                    ),
                });
            }
        }
    }

    fn poll_neighbor_timers(&mut self, now_ms: u64) {
        let params = self.params;
        for iface in self.interfaces.values_mut() {
            let ctx = params.link_context(&self.lsdb, iface.mtu(), now_ms);
            for neighbor in iface.neighbors_mut() {
                let fired = neighbor.poll_timers(&ctx);
                if !fired.is_empty() {
                    debug!(neighbor = %neighbor.router_id(), timers = ?fired, "Neighbor timers fired");
                }
            }
        }
    }
}
