//! Interface
//!
//! An OSPF interface owns the neighbors heard on it, its Hello timer and
//! the acknowledgements it delays until the next tick. Hello validation
//! and adjacency eligibility live here; the adjacency state machine
//! itself lives in `neighbor`.

use crate::config::{InterfaceConfig, InterfaceKind};
use crate::lsa::LsaHeader;
use crate::neighbor::{Neighbor, NeighborState, Timer};
use crate::protocol::{Destination, Hello};
use crate::{InterfaceId, RouterId};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use thiserror::Error;
use tracing::debug;

/// Why a received Hello was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum HelloMismatch {
    #[error("hello interval mismatch: ours {ours}s, theirs {theirs}s")]
    HelloInterval { ours: u16, theirs: u16 },

    #[error("dead interval mismatch: ours {ours}s, theirs {theirs}s")]
    DeadInterval { ours: u32, theirs: u32 },

    #[error("network mask mismatch: ours {ours}, theirs {theirs}")]
    NetworkMask { ours: Ipv4Addr, theirs: Ipv4Addr },
}

/// One interface attached to an area.
#[derive(Debug)]
pub struct Interface {
    id: InterfaceId,
    name: String,
    address: Ipv4Addr,
    mask: Ipv4Addr,
    kind: InterfaceKind,
    mtu: u16,
    cost: u16,
    priority: u8,
    hello_interval_secs: u16,
    router_dead_interval_secs: u32,
    retransmit_interval_secs: u16,
    /// DR and BDR as last declared by a neighbor; election is external.
    designated_router: Ipv4Addr,
    backup_designated_router: Ipv4Addr,
    neighbors: BTreeMap<RouterId, Neighbor>,
    /// NBMA neighbors polled by unicast Hellos.
    static_neighbors: Vec<Ipv4Addr>,
    hello_timer: Timer,
    delayed_acks: Vec<LsaHeader>,
}

impl Interface {
    pub fn from_config(id: InterfaceId, config: &InterfaceConfig) -> Self {
        Self {
            id,
            name: config.name.clone(),
            address: config.address,
            mask: config.mask,
            kind: config.kind,
            mtu: config.mtu,
            cost: config.cost,
            priority: config.priority,
            hello_interval_secs: config.hello_interval_secs,
            router_dead_interval_secs: config.router_dead_interval_secs,
            retransmit_interval_secs: config.retransmit_interval_secs,
            designated_router: Ipv4Addr::UNSPECIFIED,
            backup_designated_router: Ipv4Addr::UNSPECIFIED,
            neighbors: BTreeMap::new(),
            static_neighbors: config.static_neighbors.clone(),
            hello_timer: Timer::new(u64::from(config.hello_interval_secs) * 1000),
            delayed_acks: Vec::new(),
        }
    }

    // === Accessors ===

    pub fn id(&self) -> InterfaceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> Ipv4Addr {
        self.address
    }

    pub fn mask(&self) -> Ipv4Addr {
        self.mask
    }

    pub fn kind(&self) -> InterfaceKind {
        self.kind
    }

    pub fn mtu(&self) -> u16 {
        self.mtu
    }

    pub fn cost(&self) -> u16 {
        self.cost
    }

    pub fn designated_router(&self) -> Ipv4Addr {
        self.designated_router
    }

    /// Network address of the attached subnet.
    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.address) & u32::from(self.mask))
    }

    pub fn dead_interval_ms(&self) -> u64 {
        u64::from(self.router_dead_interval_secs) * 1000
    }

    pub fn retransmit_interval_ms(&self) -> u64 {
        u64::from(self.retransmit_interval_secs) * 1000
    }

    // === Neighbors ===

    pub fn neighbor(&self, router_id: &RouterId) -> Option<&Neighbor> {
        self.neighbors.get(router_id)
    }

    pub fn neighbor_mut(&mut self, router_id: &RouterId) -> Option<&mut Neighbor> {
        self.neighbors.get_mut(router_id)
    }

    pub fn neighbors(&self) -> impl Iterator<Item = &Neighbor> {
        self.neighbors.values()
    }

    pub fn neighbors_mut(&mut self) -> impl Iterator<Item = &mut Neighbor> {
        self.neighbors.values_mut()
    }

    pub fn neighbor_count(&self) -> usize {
        self.neighbors.len()
    }

    pub fn remove_neighbor(&mut self, router_id: &RouterId) -> Option<Neighbor> {
        self.neighbors.remove(router_id)
    }

    /// Record a Hello from `router_id` at `source`, creating the neighbor
    /// on first contact.
    ///
    /// On NBMA networks a polled neighbor is keyed by its address until
    /// its first Hello reveals the router ID.
    pub fn hello_from(&mut self, router_id: RouterId, source: Ipv4Addr, hello: &Hello, now_ms: u64) {
        if !self.neighbors.contains_key(&router_id) {
            let placeholder = RouterId::from(source);
            if placeholder != router_id
                && self.static_neighbors.contains(&source)
                && self.neighbors.remove(&placeholder).is_some()
            {
                debug!(interface = %self.name, address = %source, neighbor = %router_id, "Static neighbor identified");
            }
            let neighbor = Neighbor::new(
                router_id,
                source,
                self.id,
                hello.router_priority,
                self.dead_interval_ms(),
                self.retransmit_interval_ms(),
            );
            debug!(interface = %self.name, neighbor = %router_id, address = %source, "New neighbor");
            self.neighbors.insert(router_id, neighbor);
        }

        if hello.designated_router != Ipv4Addr::UNSPECIFIED {
            self.designated_router = hello.designated_router;
        }
        if hello.backup_designated_router != Ipv4Addr::UNSPECIFIED {
            self.backup_designated_router = hello.backup_designated_router;
        }

        if let Some(neighbor) = self.neighbors.get_mut(&router_id) {
            neighbor.update_from_hello(
                source,
                hello.router_priority,
                hello.options,
                hello.designated_router,
                hello.backup_designated_router,
            );
            neighbor.hello_received(now_ms);
        }
    }

    /// Create Attempt-state placeholders for static NBMA neighbors not
    /// currently known at their address.
    pub fn start_static_neighbors(&mut self, now_ms: u64) {
        if self.kind != InterfaceKind::Nbma {
            return;
        }
        for address in self.static_neighbors.clone() {
            if self.neighbors.values().any(|n| n.address() == address) {
                continue;
            }
            let mut neighbor = Neighbor::new(
                RouterId::from(address),
                address,
                self.id,
                0,
                self.dead_interval_ms(),
                self.retransmit_interval_ms(),
            );
            neighbor.start(now_ms);
            self.neighbors.insert(neighbor.router_id(), neighbor);
        }
    }

    // === Hello ===

    /// Check a received Hello against this interface's parameters.
    pub fn validate_hello(&self, hello: &Hello) -> Result<(), HelloMismatch> {
        if hello.hello_interval != self.hello_interval_secs {
            return Err(HelloMismatch::HelloInterval {
                ours: self.hello_interval_secs,
                theirs: hello.hello_interval,
            });
        }
        if hello.router_dead_interval != self.router_dead_interval_secs {
            return Err(HelloMismatch::DeadInterval {
                ours: self.router_dead_interval_secs,
                theirs: hello.router_dead_interval,
            });
        }
        if !self.kind.is_point_to_point() && hello.network_mask != self.mask {
            return Err(HelloMismatch::NetworkMask {
                ours: self.mask,
                theirs: hello.network_mask,
            });
        }
        Ok(())
    }

    /// Build the Hello this interface sends, listing every neighbor heard
    /// from within the dead interval.
    pub fn build_hello(&self, options: u8) -> Hello {
        Hello {
            network_mask: self.mask,
            hello_interval: self.hello_interval_secs,
            options,
            router_priority: self.priority,
            router_dead_interval: self.router_dead_interval_secs,
            designated_router: self.designated_router,
            backup_designated_router: self.backup_designated_router,
            neighbors: self
                .neighbors
                .values()
                .filter(|n| n.state() >= NeighborState::Init)
                .map(Neighbor::router_id)
                .collect(),
        }
    }

    /// Start the Hello timer so the first Hello goes out immediately.
    pub fn start_hellos(&mut self, now_ms: u64) {
        self.hello_timer.start(now_ms.saturating_sub(self.hello_timer.interval_ms()));
    }

    /// True when a Hello is due; re-arms the timer.
    pub fn hello_due(&mut self, now_ms: u64) -> bool {
        if !self.hello_timer.is_expired(now_ms) {
            return false;
        }
        self.hello_timer.start(now_ms);
        true
    }

    pub fn stop_hellos(&mut self) {
        self.hello_timer.stop();
    }

    /// Where Hellos go: multicast, or every static neighbor on NBMA.
    pub fn hello_destinations(&self) -> Vec<Destination> {
        match self.kind {
            InterfaceKind::Nbma => self
                .static_neighbors
                .iter()
                .map(|addr| Destination::Neighbor(*addr))
                .collect(),
            _ => vec![Destination::AllSpfRouters],
        }
    }

    /// Where a flooded update goes, given the neighbors it was queued for.
    pub fn flood_destinations(&self, targets: &[Ipv4Addr]) -> Vec<Destination> {
        if targets.is_empty() {
            return Vec::new();
        }
        match self.kind {
            InterfaceKind::Nbma => targets.iter().map(|a| Destination::Neighbor(*a)).collect(),
            _ => vec![Destination::AllSpfRouters],
        }
    }

    // === Adjacency ===

    /// Whether an adjacency should form with `router_id`.
    ///
    /// Always on point-to-point and virtual links. Elsewhere only when
    /// either end is the DR or BDR declared on the network.
    pub fn should_form_adjacency(&self, router_id: &RouterId) -> bool {
        if self.kind.is_point_to_point() {
            return true;
        }
        let Some(neighbor) = self.neighbors.get(router_id) else {
            return false;
        };
        let declared = |addr: Ipv4Addr| {
            addr != Ipv4Addr::UNSPECIFIED
                && (neighbor.designated_router() == addr
                    || neighbor.backup_designated_router() == addr
                    || self.designated_router == addr
                    || self.backup_designated_router == addr)
        };
        declared(self.address) || declared(neighbor.address())
    }

    // === Delayed acknowledgements ===

    pub fn queue_delayed_ack(&mut self, header: LsaHeader) {
        if !self.delayed_acks.contains(&header) {
            self.delayed_acks.push(header);
        }
    }

    pub fn pending_acks(&self) -> usize {
        self.delayed_acks.len()
    }

    pub fn take_delayed_acks(&mut self) -> Vec<LsaHeader> {
        std::mem::take(&mut self.delayed_acks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lsa::{LsaIdentity, LsaType};

    const OURS: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
    const THEIRS: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);

    fn make_interface(kind: InterfaceKind) -> Interface {
        let config = InterfaceConfig::new("eth0", OURS, kind);
        Interface::from_config(InterfaceId::new(0), &config)
    }

    fn make_hello(iface: &Interface) -> Hello {
        Hello {
            network_mask: iface.mask(),
            hello_interval: 10,
            options: 0x02,
            router_priority: 1,
            router_dead_interval: 40,
            designated_router: Ipv4Addr::UNSPECIFIED,
            backup_designated_router: Ipv4Addr::UNSPECIFIED,
            neighbors: Vec::new(),
        }
    }

    #[test]
    fn test_validate_hello() {
        let iface = make_interface(InterfaceKind::Broadcast);
        let hello = make_hello(&iface);
        assert!(iface.validate_hello(&hello).is_ok());

        let bad_interval = Hello { hello_interval: 5, ..hello.clone() };
        assert!(matches!(
            iface.validate_hello(&bad_interval),
            Err(HelloMismatch::HelloInterval { ours: 10, theirs: 5 })
        ));

        let bad_dead = Hello { router_dead_interval: 120, ..hello.clone() };
        assert!(matches!(
            iface.validate_hello(&bad_dead),
            Err(HelloMismatch::DeadInterval { .. })
        ));

        let bad_mask = Hello { network_mask: Ipv4Addr::new(255, 255, 0, 0), ..hello };
        assert!(matches!(
            iface.validate_hello(&bad_mask),
            Err(HelloMismatch::NetworkMask { .. })
        ));
    }

    #[test]
    fn test_point_to_point_ignores_mask() {
        let iface = make_interface(InterfaceKind::PointToPoint);
        let hello = Hello {
            network_mask: Ipv4Addr::new(255, 255, 255, 252),
            ..make_hello(&iface)
        };
        assert!(iface.validate_hello(&hello).is_ok());
    }

    #[test]
    fn test_hello_creates_neighbor_in_init() {
        let mut iface = make_interface(InterfaceKind::PointToPoint);
        let hello = make_hello(&iface);
        let rid = RouterId::from_octets(2, 2, 2, 2);

        iface.hello_from(rid, THEIRS, &hello, 1_000);

        let nbr = iface.neighbor(&rid).unwrap();
        assert_eq!(nbr.state(), NeighborState::Init);
        assert_eq!(nbr.address(), THEIRS);
        assert_eq!(nbr.timers().inactivity.deadline_ms(), Some(41_000));

        let ours = iface.build_hello(0x02);
        assert_eq!(ours.neighbors, vec![rid]);
    }

    #[test]
    fn test_adjacency_eligibility() {
        let p2p = make_interface(InterfaceKind::PointToPoint);
        assert!(p2p.should_form_adjacency(&RouterId::from_octets(9, 9, 9, 9)));

        let mut bcast = make_interface(InterfaceKind::Broadcast);
        let rid = RouterId::from_octets(2, 2, 2, 2);
        let hello = make_hello(&bcast);
        bcast.hello_from(rid, THEIRS, &hello, 0);
        assert!(!bcast.should_form_adjacency(&rid));

        let dr_hello = Hello { designated_router: THEIRS, ..hello };
        bcast.hello_from(rid, THEIRS, &dr_hello, 0);
        assert!(bcast.should_form_adjacency(&rid));
        assert_eq!(bcast.designated_router(), THEIRS);
    }

    #[test]
    fn test_static_neighbors_start_in_attempt() {
        let mut config = InterfaceConfig::new("nbma0", OURS, InterfaceKind::Nbma);
        config.static_neighbors = vec![THEIRS];
        let mut iface = Interface::from_config(InterfaceId::new(3), &config);

        iface.start_static_neighbors(0);
        let placeholder = RouterId::from(THEIRS);
        assert_eq!(iface.neighbor(&placeholder).unwrap().state(), NeighborState::Attempt);
        assert_eq!(iface.hello_destinations(), vec![Destination::Neighbor(THEIRS)]);

        // First Hello rekeys the placeholder under the real router ID
        let rid = RouterId::from_octets(7, 7, 7, 7);
        let hello = make_hello(&iface);
        iface.hello_from(rid, THEIRS, &hello, 10);
        assert!(iface.neighbor(&placeholder).is_none());
        assert_eq!(iface.neighbor(&rid).unwrap().state(), NeighborState::Init);
        assert_eq!(iface.neighbor_count(), 1);

        // Already known at that address: nothing new
        iface.start_static_neighbors(20);
        assert_eq!(iface.neighbor_count(), 1);
    }

    #[test]
    fn test_hello_timer_fires_immediately_then_periodically() {
        let mut iface = make_interface(InterfaceKind::PointToPoint);
        iface.start_hellos(50_000);
        assert!(iface.hello_due(50_000));
        assert!(!iface.hello_due(55_000));
        assert!(iface.hello_due(60_000));
        iface.stop_hellos();
        assert!(!iface.hello_due(1_000_000));
    }

    #[test]
    fn test_delayed_acks_deduplicate() {
        let mut iface = make_interface(InterfaceKind::PointToPoint);
        let header = LsaHeader {
            age: 1,
            options: 0x02,
            identity: LsaIdentity::new(
                LsaType::Router,
                Ipv4Addr::new(1, 1, 1, 1),
                RouterId::from_octets(1, 1, 1, 1),
            ),
            sequence_number: 0x8000_0001_u32 as i32,
            checksum: 0x1234,
            length: 36,
        };
        iface.queue_delayed_ack(header);
        iface.queue_delayed_ack(header);
        assert_eq!(iface.pending_acks(), 1);
        assert_eq!(iface.take_delayed_acks(), vec![header]);
        assert_eq!(iface.pending_acks(), 0);
    }

    #[test]
    fn test_network_address() {
        let iface = make_interface(InterfaceKind::Broadcast);
        assert_eq!(iface.network(), Ipv4Addr::new(10, 0, 0, 0));
    }
}
