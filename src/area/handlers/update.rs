//! Link-State Update handling: the receive side of flooding.

use crate::area::{Area, AreaError};
use crate::lsa::{
    compare, Freshness, Lsa, LsaHeader, LsaIdentity, LsaType, MAX_SEQUENCE_NUMBER,
};
use crate::lsdb::AcceptanceResult;
use crate::neighbor::aged_for_transmit;
use crate::protocol::{Destination, LinkStateAck, LinkStateUpdate, PacketBody};
use crate::{InterfaceId, RouterId};
use std::net::Ipv4Addr;
use tracing::{debug, info};

impl Area {
    pub(in crate::area) fn handle_ls_update(
        &mut self,
        interface: InterfaceId,
        from: RouterId,
        update: LinkStateUpdate,
        now_ms: u64,
    ) -> Result<(), AreaError> {
        let (state, address) = self.with_neighbor(interface, from, now_ms, |neighbor, _| {
            (neighbor.state(), neighbor.address())
        })?;
        if !state.is_exchanging_or_above() {
            debug!(neighbor = %from, state = %state, "LSU ignored in state");
            return Ok(());
        }

        for lsa in update.lsas {
            if !self.receive_lsa(interface, from, address, lsa, now_ms)? {
                break;
            }
        }
        Ok(())
    }

    /// Process one LSA of an update. False when the rest of the packet
    /// must be dropped.
    fn receive_lsa(
        &mut self,
        interface: InterfaceId,
        from: RouterId,
        address: Ipv4Addr,
        lsa: Lsa,
        now_ms: u64,
    ) -> Result<bool, AreaError> {
        let identity = *lsa.identity();
        let limits = *self.lsdb.limits();

        if !lsa.verify_checksum() {
            debug!(neighbor = %from, lsa = %identity, "Bad LSA checksum, discarding");
            return Ok(true);
        }
        if identity.lsa_type == LsaType::AsExternal && !self.params.external_routing {
            debug!(neighbor = %from, lsa = %identity, "AS-external LSA in stub area, discarding");
            return Ok(true);
        }
        if identity.lsa_type.is_opaque() && !self.params.opaque_capable {
            debug!(neighbor = %from, lsa = %identity, "Opaque LSA in non-opaque area, discarding");
            return Ok(true);
        }

        let existing = self.lsdb.lookup_header(&identity);
        if lsa.header.is_max_age(&limits) && existing.is_none() && !self.any_neighbor_synchronizing() {
            self.send_direct_ack(interface, address, lsa.header);
            return Ok(true);
        }

        let freshness = existing.map(|db| compare(&lsa.header, &db, &limits));
        match freshness {
            None | Some(Freshness::Newer) => {
                if existing.is_some()
                    && self
                        .lsdb
                        .installed_within(&identity, self.params.min_ls_arrival_secs)
                {
                    debug!(neighbor = %from, lsa = %identity, "Arrived within MinLSArrival, discarding");
                    return Ok(true);
                }
                self.install_received(interface, from, lsa, now_ms)?;
            }
            Some(freshness) => {
                let requested = self.with_neighbor(interface, from, now_ms, |neighbor, _| {
                    neighbor.request_contains(&identity)
                })?;
                if requested {
                    self.with_neighbor(interface, from, now_ms, |neighbor, ctx| {
                        neighbor.bad_ls_req(ctx)
                    })?;
                    return Ok(false);
                }
                if freshness.is_same() {
                    self.receive_duplicate(interface, from, address, lsa.header, now_ms)?;
                } else {
                    self.receive_older(interface, address, lsa, now_ms);
                }
            }
        }
        Ok(true)
    }

    /// A newer (or unknown) instance: install, flood and acknowledge.
    fn install_received(
        &mut self,
        interface: InterfaceId,
        from: RouterId,
        lsa: Lsa,
        now_ms: u64,
    ) -> Result<(), AreaError> {
        let identity = *lsa.identity();
        let header = lsa.header;

        if identity.advertising_router == self.params.router_id {
            self.receive_own_newer(interface, lsa, now_ms);
        } else {
            match self.lsdb.add_or_update(lsa, Some(interface), false) {
                AcceptanceResult::Accepted { record, .. } => {
                    self.notify_installed(&record);
                    self.flood(&record, Some((interface, from)), now_ms);
                }
                AcceptanceResult::Rejected { freshness, .. } => {
                    debug!(lsa = %identity, freshness = %freshness, "Received LSA not installed");
                    return Ok(());
                }
            }
        }

        if let Some(iface) = self.interfaces.get_mut(&interface) {
            iface.queue_delayed_ack(header);
        }
        self.with_neighbor(interface, from, now_ms, |neighbor, ctx| {
            neighbor.request_satisfied(ctx, &identity)
        })
    }

    /// Someone holds a newer instance of an LSA we advertise: bump past
    /// it if we still originate the identity, otherwise flush it.
    fn receive_own_newer(&mut self, interface: InterfaceId, lsa: Lsa, now_ms: u64) {
        let identity = *lsa.identity();
        let received_seq = lsa.header.sequence_number;

        if identity == LsaIdentity::router(self.params.router_id) && self.running {
            info!(lsa = %identity, seq = received_seq, "Newer instance of own LSA received, re-originating");
            self.originate_router_lsa(Some(received_seq), now_ms);
            return;
        }

        // Any other identity is still ours while a live self-originated copy exists
        let current_body = self
            .lsdb
            .lookup(&identity)
            .filter(|record| record.is_self_originated() && !self.lsdb.is_max_age(&identity))
            .map(|record| record.lsa().body.clone());
        if let Some(body) = current_body {
            info!(lsa = %identity, seq = received_seq, "Newer instance of own LSA received, re-originating");
            self.originate_body(identity, body, Some(received_seq), now_ms);
            return;
        }

        info!(lsa = %identity, seq = received_seq, "Own LSA no longer originated, flushing");
        if let AcceptanceResult::Accepted { record, .. } =
            self.lsdb.add_or_update(lsa, Some(interface), true)
        {
            self.notify_installed(&record);
        }
        if let Some(flushed) = self.lsdb.flush(&identity) {
            self.notify_installed(&flushed);
            self.flood(&flushed, None, now_ms);
        }
    }

    /// Same instance as the database copy: implied or direct acknowledgement.
    fn receive_duplicate(
        &mut self,
        interface: InterfaceId,
        from: RouterId,
        address: Ipv4Addr,
        header: LsaHeader,
        now_ms: u64,
    ) -> Result<(), AreaError> {
        let implied = self.with_neighbor(interface, from, now_ms, |neighbor, _| {
            neighbor.remove_from_retransmit(&header.identity).is_some()
        })?;
        if implied {
            debug!(neighbor = %from, lsa = %header.identity, "Implied acknowledgement");
        } else {
            self.send_direct_ack(interface, address, header);
        }
        Ok(())
    }

    /// Database copy is newer: squelch a stale copy of our own LSA, or
    /// send the database copy back to the neighbor.
    fn receive_older(&mut self, interface: InterfaceId, address: Ipv4Addr, lsa: Lsa, now_ms: u64) {
        let identity = *lsa.identity();

        if identity.advertising_router == self.params.router_id
            && let AcceptanceResult::Rejected {
                reoriginated: Some(record),
                ..
            } = self.lsdb.add_or_update(lsa, Some(interface), true)
        {
            self.notify_installed(&record);
            self.flood(&record, None, now_ms);
            return;
        }

        let Some(record) = self.lsdb.lookup(&identity) else {
            return;
        };
        if self.lsdb.is_max_age(&identity) && record.sequence_number() == MAX_SEQUENCE_NUMBER {
            debug!(lsa = %identity, "Database copy wrapping, not answered");
            return;
        }
        let Some(iface) = self.interfaces.get(&interface) else {
            return;
        };
        let ctx = self.params.link_context(&self.lsdb, iface.mtu(), now_ms);
        let Some(current) = self.lsdb.lookup_lsa(&identity) else {
            return;
        };
        let lsas = vec![aged_for_transmit(current, &ctx)];
        debug!(lsa = %identity, to = %address, "Older instance received, sending database copy");
        self.queue(
            interface,
            Destination::Neighbor(address),
            PacketBody::LinkStateUpdate(LinkStateUpdate { lsas }),
        );
    }

    fn send_direct_ack(&mut self, interface: InterfaceId, address: Ipv4Addr, header: LsaHeader) {
        debug!(lsa = %header.identity, to = %address, "Direct acknowledgement");
        self.queue(
            interface,
            Destination::Neighbor(address),
            PacketBody::LinkStateAck(LinkStateAck {
                headers: vec![header],
            }),
        );
    }

    /// Any neighbor still in Exchange or Loading.
    pub(in crate::area) fn any_neighbor_synchronizing(&self) -> bool {
        self.interfaces
            .values()
            .flat_map(|iface| iface.neighbors())
            .any(|n| n.state().is_synchronizing())
    }
}
