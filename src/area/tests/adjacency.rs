//! Two-router adjacency bring-up and teardown.

use super::*;
use crate::lsa::{RouterLinkKind, INITIAL_SEQUENCE_NUMBER, OPTION_E};
use crate::protocol::{DatabaseDescription, DdFlags, Hello};

#[test]
fn test_start_originates_router_lsa_and_hello() {
    let mut area = make_area(A_ID, A_ADDR, TimersConfig::default());
    area.start(0);

    let record = area.lsdb().lookup(&LsaIdentity::router(A_ID)).unwrap();
    assert_eq!(record.sequence_number(), INITIAL_SEQUENCE_NUMBER);
    assert!(record.is_self_originated());
    let links = &record.lsa().as_router().unwrap().links;
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].kind, RouterLinkKind::Stub);
    assert_eq!(links[0].link_id, Ipv4Addr::new(10, 0, 0, 0));

    let out = area.take_outbound();
    assert!(
        out.iter()
            .any(|p| matches!(p.packet.body, PacketBody::Hello(_))
                && p.destination == Destination::AllSpfRouters)
    );
}

#[test]
fn test_pair_reaches_full() {
    let mut pair = Pair::new(TimersConfig::default());
    pair.converge();

    assert_eq!(pair.a_state(), NeighborState::Full);
    assert_eq!(pair.b_state(), NeighborState::Full);

    // Higher router ID is master
    assert!(!pair.a.neighbor(IF0, &B_ID).unwrap().is_master());
    assert!(pair.b.neighbor(IF0, &A_ID).unwrap().is_master());

    // Both databases hold both Router LSAs, same instances
    for id in [LsaIdentity::router(A_ID), LsaIdentity::router(B_ID)] {
        let at_a = pair.a.lsdb().lookup(&id).unwrap();
        let at_b = pair.b.lsdb().lookup(&id).unwrap();
        assert_eq!(at_a.sequence_number(), at_b.sequence_number(), "{}", id);
        assert_eq!(at_a.checksum(), at_b.checksum(), "{}", id);
    }

    // A advertises its adjacency with B
    let a_lsa = pair.b.lsdb().lookup(&LsaIdentity::router(A_ID)).unwrap();
    assert!(a_lsa.lsa().as_router().unwrap().links.iter().any(|l| {
        l.kind == RouterLinkKind::PointToPoint && l.link_id == B_ID.addr()
    }));

    // Everything flooded has been acknowledged
    for summary in [pair.a.summary(), pair.b.summary()] {
        assert_eq!(summary.lsa_count, 2);
        assert_eq!(summary.neighbors.len(), 1);
        assert_eq!(summary.neighbors[0].retransmit_count, 0);
        assert_eq!(summary.neighbors[0].request_count, 0);
    }
}

#[test]
fn test_inactivity_removes_neighbor_and_reoriginates() {
    let mut pair = Pair::new(TimersConfig::default());
    pair.converge();
    let before = pair
        .a
        .lsdb()
        .lookup(&LsaIdentity::router(A_ID))
        .unwrap()
        .sequence_number();

    pair.b_to_a = false;
    pair.run(41);

    assert!(pair.a.neighbor(IF0, &B_ID).is_none());
    let after = pair.a.lsdb().lookup(&LsaIdentity::router(A_ID)).unwrap();
    assert!(after.sequence_number() > before);
    assert!(!after
        .lsa()
        .as_router()
        .unwrap()
        .links
        .iter()
        .any(|l| l.kind == RouterLinkKind::PointToPoint));
}

#[test]
fn test_topology_listener_sees_peer() {
    let recorder = Arc::new(Recorder::default());
    let mut pair = Pair::new(TimersConfig::default());
    pair.a.add_listener(recorder.clone());
    pair.converge();

    let events = recorder.0.lock().unwrap();
    assert!(events.contains(&TopologyEvent::RouterAdded(B_ID)));
    assert!(events.iter().any(|e| matches!(
        e,
        TopologyEvent::LinkAdded(link) if link.from == B_ID && link.link_id == A_ID.addr()
    )));
}

#[test]
fn test_mismatched_hello_creates_no_neighbor() {
    let mut area = make_area(A_ID, A_ADDR, TimersConfig::default());
    area.start(0);
    let mut hello = area.interface(IF0).unwrap().build_hello(OPTION_E);
    hello.hello_interval = 5;

    area.handle_packet(
        IF0,
        B_ADDR,
        Packet::new(B_ID, AreaId::BACKBONE, PacketBody::Hello(hello)),
        0,
    )
    .unwrap();
    assert!(area.neighbor(IF0, &B_ID).is_none());
}

#[test]
fn test_stub_area_rejects_external_capable_hello() {
    let mut config = make_area_config(A_ADDR);
    config.external_routing_capability = false;
    let mut area = Area::new(
        A_ID,
        &make_router_config(A_ID, TimersConfig::default()),
        &config,
    );
    area.start(0);

    let hello = Hello {
        options: OPTION_E,
        ..area.interface(IF0).unwrap().build_hello(0)
    };
    area.handle_packet(
        IF0,
        B_ADDR,
        Packet::new(B_ID, AreaId::BACKBONE, PacketBody::Hello(hello)),
        0,
    )
    .unwrap();
    assert!(area.neighbor(IF0, &B_ID).is_none());
}

#[test]
fn test_packet_routing_errors() {
    let mut area = make_area(A_ID, A_ADDR, TimersConfig::default());
    area.start(0);
    let dd = DatabaseDescription {
        interface_mtu: 1500,
        options: OPTION_E,
        flags: DdFlags::NEGOTIATE,
        sequence_number: 1,
        headers: Vec::new(),
    };

    let wrong_area = Packet::new(
        B_ID,
        AreaId::from_octets(0, 0, 0, 1),
        PacketBody::DatabaseDescription(dd.clone()),
    );
    assert!(matches!(
        area.handle_packet(IF0, B_ADDR, wrong_area, 0),
        Err(AreaError::AreaMismatch { .. })
    ));

    let packet = Packet::new(B_ID, AreaId::BACKBONE, PacketBody::DatabaseDescription(dd));
    assert!(matches!(
        area.handle_packet(InterfaceId::new(7), B_ADDR, packet.clone(), 0),
        Err(AreaError::UnknownInterface(_))
    ));
    assert!(matches!(
        area.handle_packet(IF0, B_ADDR, packet, 0),
        Err(AreaError::UnknownNeighbor { router_id, .. }) if router_id == B_ID
    ));
}

#[test]
fn test_shutdown_stops_hellos_and_adjacencies() {
    let mut pair = Pair::new(TimersConfig::default());
    pair.converge();

    pair.a.shutdown();
    assert!(!pair.a.is_running());
    assert_eq!(pair.a_state(), NeighborState::Down);

    pair.a.tick(pair.now_ms + 10_000);
    assert!(
        !pair
            .a
            .take_outbound()
            .iter()
            .any(|p| matches!(p.packet.body, PacketBody::Hello(_)))
    );
    assert!(matches!(
        pair.a.handle_packet(IF0, B_ADDR, update_packet(B_ID, Vec::new()), pair.now_ms),
        Err(AreaError::NotRunning(_))
    ));
}

#[test]
fn test_interfaces_numbered_in_config_order() {
    let mut config = make_area_config(A_ADDR);
    config.interfaces.push(InterfaceConfig::new(
        "eth1",
        Ipv4Addr::new(10, 1, 0, 1),
        InterfaceKind::Broadcast,
    ));
    let area = Area::new(
        A_ID,
        &make_router_config(A_ID, TimersConfig::default()),
        &config,
    );

    assert_eq!(area.interface(InterfaceId::new(0)).unwrap().name(), "eth0");
    assert_eq!(area.interface(InterfaceId::new(1)).unwrap().name(), "eth1");
    assert!(area.interface(InterfaceId::new(2)).is_none());
}
