//! Flooding procedure: hand a newly installed instance to every adjacent
//! neighbor that does not already have it.

use crate::area::Area;
use crate::lsa::{compare, LsaRecord};
use crate::neighbor::aged_for_transmit;
use crate::protocol::{LinkStateUpdate, OutboundPacket, Packet, PacketBody};
use crate::{InterfaceId, RouterId};
use tracing::debug;

impl Area {
    /// Flood the database copy of `record`'s identity.
    ///
    /// `from` is the neighbor it was received from; it is skipped. Every
    /// neighbor in Exchange or above gets the instance on its retransmit
    /// list, except where a pending request shows it holds a newer copy.
    /// Returns the number of neighbors the instance was queued for.
    pub(in crate::area) fn flood(
        &mut self,
        record: &LsaRecord,
        from: Option<(InterfaceId, RouterId)>,
        now_ms: u64,
    ) -> usize {
        let identity = *record.identity();
        let Some(lsa) = self.lsdb.lookup_lsa(&identity) else {
            return 0;
        };
        let params = self.params;
        let limits = *self.lsdb.limits();
        let mut queued = 0;

        for (iface_id, iface) in self.interfaces.iter_mut() {
            let ctx = params.link_context(&self.lsdb, iface.mtu(), now_ms);
            let mut targets = Vec::new();

            for neighbor in iface.neighbors_mut() {
                // The previous instance no longer needs delivering
                neighbor.remove_from_retransmit(&identity);

                if !neighbor.state().is_exchanging_or_above() {
                    continue;
                }
                if identity.lsa_type.is_opaque() && !neighbor.is_opaque_capable() {
                    continue;
                }
                if let Some(requested) = neighbor.ls_request_list().get(&identity).copied() {
                    let freshness = compare(&lsa.header, &requested, &limits);
                    if freshness.is_older() {
                        continue;
                    }
                    neighbor.request_satisfied(&ctx, &identity);
                    if freshness.is_same() {
                        continue;
                    }
                }
                if from == Some((*iface_id, neighbor.router_id())) {
                    continue;
                }
                neighbor.add_to_retransmit(
                    LsaRecord::new(lsa.clone(), record.is_self_originated()),
                    now_ms,
                );
                targets.push(neighbor.address());
            }

            queued += targets.len();
            let outgoing = aged_for_transmit(lsa.clone(), &ctx);
            for destination in iface.flood_destinations(&targets) {
                self.outbound.push(OutboundPacket {
                    interface: *iface_id,
                    destination,
                    packet: Packet::new(
                        params.router_id,
                        params.area_id,
                        PacketBody::LinkStateUpdate(LinkStateUpdate {
                            lsas: vec![outgoing.clone()],
                        }),
                    ),
                });
            }
        }

        debug!(
            area = %params.area_id,
            lsa = %identity,
            seq = lsa.header.sequence_number,
            age = lsa.header.age,
            neighbors = queued,
            "LSA flooded"
        );
        queued
    }
}
