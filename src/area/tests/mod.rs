use super::*;
use crate::config::{InterfaceConfig, InterfaceKind, TimersConfig};
use crate::lsa::{Lsa, LsaBody, LsaIdentity, LsaType};
use crate::protocol::LinkStateUpdate;
use std::sync::Mutex;

mod adjacency;
mod aging;
mod flooding;

pub(super) const A_ID: RouterId = RouterId::from_octets(1, 1, 1, 1);
pub(super) const B_ID: RouterId = RouterId::from_octets(2, 2, 2, 2);
pub(super) const A_ADDR: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
pub(super) const B_ADDR: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
pub(super) const IF0: InterfaceId = InterfaceId::new(0);

pub(super) fn make_router_config(router_id: RouterId, timers: TimersConfig) -> RouterConfig {
    let mut router = RouterConfig::default();
    router.router_id = Some(router_id);
    router.timers = timers;
    router
}

pub(super) fn make_area_config(address: Ipv4Addr) -> AreaConfig {
    let mut area = AreaConfig::new(AreaId::BACKBONE);
    area.interfaces
        .push(InterfaceConfig::new("eth0", address, InterfaceKind::PointToPoint));
    area
}

pub(super) fn make_area(router_id: RouterId, address: Ipv4Addr, timers: TimersConfig) -> Area {
    Area::new(
        router_id,
        &make_router_config(router_id, timers),
        &make_area_config(address),
    )
}

/// Aging thresholds small enough to run whole lifecycles in a test.
pub(super) fn short_timers() -> TimersConfig {
    TimersConfig {
        max_age_secs: 60,
        ls_refresh_secs: 30,
        max_age_diff_secs: 15,
        ..TimersConfig::default()
    }
}

/// Two routers joined by a point-to-point link.
pub(super) struct Pair {
    pub a: Area,
    pub b: Area,
    pub now_ms: u64,
    /// Every packet delivered, with its sender.
    pub log: Vec<(RouterId, Packet)>,
    /// When false, nothing B sends reaches A.
    pub b_to_a: bool,
}

impl Pair {
    pub fn new(timers: TimersConfig) -> Self {
        let mut pair = Self {
            a: make_area(A_ID, A_ADDR, timers),
            b: make_area(B_ID, B_ADDR, timers),
            now_ms: 0,
            log: Vec::new(),
            b_to_a: true,
        };
        pair.a.start(0);
        pair.b.start(0);
        pair.pump();
        pair
    }

    /// Deliver queued packets both ways until both sides are quiet.
    pub fn pump(&mut self) {
        for _ in 0..1000 {
            let from_a = self.a.take_outbound();
            let from_b = self.b.take_outbound();
            if from_a.is_empty() && from_b.is_empty() {
                return;
            }
            for out in from_a {
                self.log.push((A_ID, out.packet.clone()));
                let _ = self.b.handle_packet(IF0, A_ADDR, out.packet, self.now_ms);
            }
            for out in from_b {
                if !self.b_to_a {
                    continue;
                }
                self.log.push((B_ID, out.packet.clone()));
                let _ = self.a.handle_packet(IF0, B_ADDR, out.packet, self.now_ms);
            }
        }
        panic!("packet exchange did not settle");
    }

    /// Advance both routers by one second.
    pub fn tick(&mut self) {
        self.now_ms += 1000;
        self.a.tick(self.now_ms);
        self.b.tick(self.now_ms);
        self.pump();
    }

    pub fn run(&mut self, seconds: u32) {
        for _ in 0..seconds {
            self.tick();
        }
    }

    /// Tick until both sides are Full with each other, then let flooding settle.
    pub fn converge(&mut self) {
        for _ in 0..120 {
            if self.a_state() == NeighborState::Full && self.b_state() == NeighborState::Full {
                self.run(15);
                return;
            }
            self.tick();
        }
        panic!(
            "adjacency did not form: a={:?} b={:?}",
            self.a_state(),
            self.b_state()
        );
    }

    pub fn a_state(&self) -> NeighborState {
        self.a
            .neighbor(IF0, &B_ID)
            .map_or(NeighborState::Down, |n| n.state())
    }

    pub fn b_state(&self) -> NeighborState {
        self.b
            .neighbor(IF0, &A_ID)
            .map_or(NeighborState::Down, |n| n.state())
    }

    /// Updates B sent that carried `identity`.
    pub fn updates_from_b_for(&self, identity: &LsaIdentity) -> Vec<Lsa> {
        self.log
            .iter()
            .filter(|(from, _)| *from == B_ID)
            .filter_map(|(_, packet)| match &packet.body {
                PacketBody::LinkStateUpdate(update) => Some(update.lsas.clone()),
                _ => None,
            })
            .flatten()
            .filter(|lsa| lsa.identity() == identity)
            .collect()
    }

    pub fn updates_from_a_for(&self, identity: &LsaIdentity) -> Vec<Lsa> {
        self.log
            .iter()
            .filter(|(from, _)| *from == A_ID)
            .filter_map(|(_, packet)| match &packet.body {
                PacketBody::LinkStateUpdate(update) => Some(update.lsas.clone()),
                _ => None,
            })
            .flatten()
            .filter(|lsa| lsa.identity() == identity)
            .collect()
    }
}

/// An LSA advertised by a router outside the pair.
pub(super) fn third_party_lsa(seq: i32, age: u16) -> Lsa {
    Lsa::new(
        LsaIdentity::new(
            LsaType::SummaryNetwork,
            Ipv4Addr::new(172, 16, 0, 0),
            RouterId::from_octets(9, 9, 9, 9),
        ),
        crate::lsa::OPTION_E,
        seq,
        age,
        LsaBody::Raw(vec![0xff, 0xff, 0x00, 0x00, 0, 0, 0, 10]),
    )
}

/// Wrap LSAs in an update packet from `router_id`.
pub(super) fn update_packet(router_id: RouterId, lsas: Vec<Lsa>) -> Packet {
    Packet::new(
        router_id,
        AreaId::BACKBONE,
        PacketBody::LinkStateUpdate(LinkStateUpdate { lsas }),
    )
}

/// Listener recording every event it hears.
#[derive(Default)]
pub(super) struct Recorder(pub Mutex<Vec<TopologyEvent>>);

impl TopologyListener for Recorder {
    fn router_added(&self, _area: AreaId, router: RouterId) {
        self.0.lock().unwrap().push(TopologyEvent::RouterAdded(router));
    }

    fn router_removed(&self, _area: AreaId, router: RouterId) {
        self.0.lock().unwrap().push(TopologyEvent::RouterRemoved(router));
    }

    fn link_added(&self, _area: AreaId, link: crate::topology::TopologyLink) {
        self.0.lock().unwrap().push(TopologyEvent::LinkAdded(link));
    }

    fn link_removed(&self, _area: AreaId, link: crate::topology::TopologyLink) {
        self.0.lock().unwrap().push(TopologyEvent::LinkRemoved(link));
    }
}
