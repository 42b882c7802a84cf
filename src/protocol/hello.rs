//! Hello packet.

use crate::RouterId;
use std::net::Ipv4Addr;

/// Hello packet body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hello {
    pub network_mask: Ipv4Addr,
    pub hello_interval: u16,
    pub options: u8,
    pub router_priority: u8,
    pub router_dead_interval: u32,
    pub designated_router: Ipv4Addr,
    pub backup_designated_router: Ipv4Addr,
    /// Routers heard from on this network within the dead interval.
    pub neighbors: Vec<RouterId>,
}

impl Hello {
    /// Check if the sender lists `router` as seen.
    pub fn lists(&self, router: RouterId) -> bool {
        self.neighbors.contains(&router)
    }

    /// Check if the sender declares `addr` as DR or BDR.
    pub fn declares_dr_or_bdr(&self, addr: Ipv4Addr) -> bool {
        addr != Ipv4Addr::UNSPECIFIED
            && (self.designated_router == addr || self.backup_designated_router == addr)
    }
}
