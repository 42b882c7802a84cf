//! Router LSA construction and local origination.

use crate::area::Area;
use crate::config::InterfaceKind;
use crate::interface::Interface;
use crate::lsa::{LsaBody, LsaIdentity, LsaRecord, RouterLink, RouterLinkKind, RouterLsa};
use std::net::Ipv4Addr;
use tracing::{debug, warn};

impl Area {
    /// Router LSA describing the current adjacencies and attached networks.
    pub fn build_router_lsa(&self) -> RouterLsa {
        let mut links = Vec::new();
        for iface in self.interfaces.values() {
            let full = iface.neighbors().filter(|n| n.state().is_full());
            match iface.kind() {
                InterfaceKind::PointToPoint | InterfaceKind::VirtualLink => {
                    let kind = if iface.kind() == InterfaceKind::VirtualLink {
                        RouterLinkKind::Virtual
                    } else {
                        RouterLinkKind::PointToPoint
                    };
                    for neighbor in full {
                        links.push(RouterLink {
                            kind,
                            link_id: neighbor.router_id().addr(),
                            link_data: iface.address(),
                            metric: iface.cost(),
                        });
                    }
                    if iface.kind() == InterfaceKind::PointToPoint {
                        links.push(stub_link(iface));
                    }
                }
                InterfaceKind::Broadcast | InterfaceKind::Nbma => {
                    let dr = iface.designated_router();
                    if full.count() > 0 && dr != Ipv4Addr::UNSPECIFIED {
                        links.push(RouterLink {
                            kind: RouterLinkKind::Transit,
                            link_id: dr,
                            link_data: iface.address(),
                            metric: iface.cost(),
                        });
                    } else {
                        links.push(stub_link(iface));
                    }
                }
            }
        }
        RouterLsa { flags: 0, links }
    }

    /// (Re)originate this router's Router LSA and flood it.
    ///
    /// Skipped when the content is unchanged, unless `floor` demands a
    /// sequence number above one seen elsewhere.
    pub(in crate::area) fn originate_router_lsa(
        &mut self,
        floor: Option<i32>,
        now_ms: u64,
    ) -> Option<LsaRecord> {
        if !self.running {
            return None;
        }
        let identity = LsaIdentity::router(self.params.router_id);
        let body = LsaBody::Router(self.build_router_lsa());
        if floor.is_none()
            && let Some(current) = self.lsdb.lookup(&identity)
            && current.lsa().body == body
            && !self.lsdb.is_max_age(&identity)
        {
            return None;
        }
        self.originate_body(identity, body, floor, now_ms)
    }

    /// Originate an LSA advertised by this router, such as an opaque
    /// traffic-engineering LSA, and flood it.
    ///
    /// Returns `None` when the identity is not ours or when the current
    /// instance sits at MaxSequenceNumber and is being flushed first.
    pub fn originate_lsa(
        &mut self,
        identity: LsaIdentity,
        body: LsaBody,
        now_ms: u64,
    ) -> Option<LsaRecord> {
        if identity.advertising_router != self.params.router_id {
            warn!(lsa = %identity, "Refusing to originate LSA for another router");
            return None;
        }
        let record = self.originate_body(identity, body, None, now_ms);
        self.drain(now_ms);
        record
    }

    /// Prematurely age one of our LSAs out of the domain.
    pub fn flush_lsa(&mut self, identity: &LsaIdentity, now_ms: u64) -> bool {
        if identity.advertising_router != self.params.router_id {
            return false;
        }
        let Some(record) = self.lsdb.flush(identity) else {
            return false;
        };
        self.notify_installed(&record);
        self.flood(&record, None, now_ms);
        self.drain(now_ms);
        true
    }

    pub(in crate::area) fn originate_body(
        &mut self,
        identity: LsaIdentity,
        body: LsaBody,
        floor: Option<i32>,
        now_ms: u64,
    ) -> Option<LsaRecord> {
        match self.lsdb.originate_with_sequence(identity, body, floor) {
            Some(record) => {
                debug!(lsa = %identity, seq = record.sequence_number(), "LSA originated");
                self.notify_installed(&record);
                self.flood(&record, None, now_ms);
                Some(record)
            }
            None => {
                // Sequence wrap: the old instance is flushing
                if let Some(flushed) = self.lsdb.lookup(&identity).cloned() {
                    self.notify_installed(&flushed);
                    self.flood(&flushed, None, now_ms);
                }
                None
            }
        }
    }
}

fn stub_link(iface: &Interface) -> RouterLink {
    RouterLink {
        kind: RouterLinkKind::Stub,
        link_id: iface.network(),
        link_data: iface.mask(),
        metric: iface.cost(),
    }
}
