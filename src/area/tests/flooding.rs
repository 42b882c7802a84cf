//! Receive-side LSA processing and flooding between two routers.

use super::*;
use crate::lsa::INITIAL_SEQUENCE_NUMBER;

fn summary_identity(router: RouterId) -> LsaIdentity {
    LsaIdentity::new(LsaType::SummaryNetwork, Ipv4Addr::new(10, 9, 0, 0), router)
}

fn summary_body() -> LsaBody {
    LsaBody::Raw(vec![0xff, 0xff, 0, 0, 0, 0, 0, 20])
}

fn has_ack_to(out: &[OutboundPacket], addr: Ipv4Addr) -> bool {
    out.iter().any(|p| {
        matches!(p.packet.body, PacketBody::LinkStateAck(_))
            && p.destination == Destination::Neighbor(addr)
    })
}

#[test]
fn test_originated_lsa_reaches_peer_and_is_acknowledged() {
    let mut pair = Pair::new(TimersConfig::default());
    pair.converge();

    let id = summary_identity(B_ID);
    let record = pair.b.originate_lsa(id, summary_body(), pair.now_ms).unwrap();
    assert!(pair.b.neighbor(IF0, &A_ID).unwrap().retransmit_contains(&id));
    pair.pump();

    let at_a = pair.a.lsdb().lookup(&id).unwrap();
    assert_eq!(at_a.sequence_number(), record.sequence_number());
    assert!(!at_a.is_self_originated());

    // A acknowledges on its next tick
    pair.tick();
    assert!(!pair.b.neighbor(IF0, &A_ID).unwrap().retransmit_contains(&id));
}

#[test]
fn test_originate_refuses_foreign_identity() {
    let mut pair = Pair::new(TimersConfig::default());
    let now = pair.now_ms;
    assert!(pair.a.originate_lsa(summary_identity(B_ID), summary_body(), now).is_none());
    assert!(pair.a.lsdb().lookup(&summary_identity(B_ID)).is_none());
}

#[test]
fn test_flush_lsa_floods_max_age_instance() {
    let mut pair = Pair::new(TimersConfig::default());
    pair.converge();
    let id = summary_identity(A_ID);
    pair.a.originate_lsa(id, summary_body(), pair.now_ms).unwrap();
    pair.run(2);
    pair.log.clear();

    assert!(pair.a.flush_lsa(&id, pair.now_ms));
    pair.pump();

    let flooded = pair.updates_from_a_for(&id);
    assert_eq!(flooded.len(), 1);
    assert_eq!(flooded[0].header.age, 3600);
    assert!(pair.b.lsdb().is_max_age(&id));

    // Acknowledged, then swept from both databases
    pair.run(3);
    assert!(pair.a.lsdb().lookup(&id).is_none());
    assert!(pair.b.lsdb().lookup(&id).is_none());
}

#[test]
fn test_older_instance_answered_with_database_copy() {
    let mut pair = Pair::new(TimersConfig::default());
    pair.converge();
    let newer = third_party_lsa(INITIAL_SEQUENCE_NUMBER + 10, 1);
    let id = *newer.identity();

    let now = pair.now_ms;
    pair.a
        .handle_packet(IF0, B_ADDR, update_packet(B_ID, vec![newer]), now)
        .unwrap();
    pair.a.take_outbound();

    let older = third_party_lsa(INITIAL_SEQUENCE_NUMBER + 5, 1);
    pair.a
        .handle_packet(IF0, B_ADDR, update_packet(B_ID, vec![older]), now)
        .unwrap();

    let out = pair.a.take_outbound();
    let answered = out.iter().any(|p| {
        p.destination == Destination::Neighbor(B_ADDR)
            && matches!(&p.packet.body, PacketBody::LinkStateUpdate(u)
                if u.lsas.iter().any(|l| *l.identity() == id
                    && l.header.sequence_number == INITIAL_SEQUENCE_NUMBER + 10))
    });
    assert!(answered);
}

#[test]
fn test_same_instance_is_implied_acknowledgement() {
    let mut pair = Pair::new(TimersConfig::default());
    pair.converge();
    let id = summary_identity(A_ID);
    pair.a.originate_lsa(id, summary_body(), pair.now_ms).unwrap();
    assert!(pair.a.neighbor(IF0, &B_ID).unwrap().retransmit_contains(&id));

    // B's copy of the flood crosses ours: same instance back from B
    pair.a.take_outbound();
    let copy = pair.a.lsdb().lookup_lsa(&id).unwrap();
    let now = pair.now_ms;
    pair.a
        .handle_packet(IF0, B_ADDR, update_packet(B_ID, vec![copy]), now)
        .unwrap();

    assert!(!pair.a.neighbor(IF0, &B_ID).unwrap().retransmit_contains(&id));
    assert!(!has_ack_to(&pair.a.take_outbound(), B_ADDR));
}

#[test]
fn test_duplicate_not_on_retransmit_list_gets_direct_ack() {
    let mut pair = Pair::new(TimersConfig::default());
    pair.converge();
    let lsa = third_party_lsa(INITIAL_SEQUENCE_NUMBER, 1);
    let now = pair.now_ms;
    pair.a
        .handle_packet(IF0, B_ADDR, update_packet(B_ID, vec![lsa.clone()]), now)
        .unwrap();
    pair.a.take_outbound();

    pair.a
        .handle_packet(IF0, B_ADDR, update_packet(B_ID, vec![lsa]), now)
        .unwrap();
    assert!(has_ack_to(&pair.a.take_outbound(), B_ADDR));
}

#[test]
fn test_bad_checksum_discarded() {
    let mut pair = Pair::new(TimersConfig::default());
    pair.converge();
    let mut lsa = third_party_lsa(INITIAL_SEQUENCE_NUMBER, 1);
    lsa.header.checksum ^= 0xffff;
    let id = *lsa.identity();

    let now = pair.now_ms;
    pair.a
        .handle_packet(IF0, B_ADDR, update_packet(B_ID, vec![lsa]), now)
        .unwrap();
    assert!(pair.a.lsdb().lookup(&id).is_none());
}

#[test]
fn test_unknown_max_age_lsa_acked_not_installed() {
    let mut pair = Pair::new(TimersConfig::default());
    pair.converge();
    let lsa = third_party_lsa(INITIAL_SEQUENCE_NUMBER, 3600);
    let id = *lsa.identity();

    let now = pair.now_ms;
    pair.a
        .handle_packet(IF0, B_ADDR, update_packet(B_ID, vec![lsa]), now)
        .unwrap();
    assert!(pair.a.lsdb().lookup(&id).is_none());
    assert!(has_ack_to(&pair.a.take_outbound(), B_ADDR));
}

#[test]
fn test_newer_copy_of_own_router_lsa_is_outbid() {
    let mut pair = Pair::new(TimersConfig::default());
    pair.converge();
    let id = LsaIdentity::router(A_ID);
    let own = pair.a.lsdb().lookup(&id).unwrap().lsa().clone();
    let seq = own.header.sequence_number;

    let forged = own.reissue(seq + 10, 1);
    let now = pair.now_ms;
    pair.a
        .handle_packet(IF0, B_ADDR, update_packet(B_ID, vec![forged]), now)
        .unwrap();

    assert_eq!(pair.a.lsdb().lookup(&id).unwrap().sequence_number(), seq + 11);
}

#[test]
fn test_newer_copy_of_own_summary_lsa_is_outbid() {
    let mut pair = Pair::new(TimersConfig::default());
    pair.converge();
    let id = summary_identity(A_ID);
    let own = pair
        .a
        .originate_lsa(id, summary_body(), pair.now_ms)
        .unwrap()
        .lsa()
        .clone();
    let seq = own.header.sequence_number;
    pair.run(2);

    let forged = own.reissue(seq + 10, 1);
    let now = pair.now_ms;
    pair.a
        .handle_packet(IF0, B_ADDR, update_packet(B_ID, vec![forged]), now)
        .unwrap();

    let current = pair.a.lsdb().lookup(&id).unwrap();
    assert_eq!(current.sequence_number(), seq + 11);
    assert!(current.is_self_originated());
    assert!(!pair.a.lsdb().is_max_age(&id));
    assert_eq!(current.lsa().body, summary_body());
}

#[test]
fn test_newer_copy_of_unoriginated_own_lsa_is_flushed() {
    let mut pair = Pair::new(TimersConfig::default());
    pair.converge();
    let id = summary_identity(A_ID);
    let stray = Lsa::new(id, crate::lsa::OPTION_E, INITIAL_SEQUENCE_NUMBER + 3, 1, summary_body());

    let now = pair.now_ms;
    pair.a
        .handle_packet(IF0, B_ADDR, update_packet(B_ID, vec![stray]), now)
        .unwrap();

    assert!(pair.a.lsdb().is_max_age(&id));
    assert_eq!(
        pair.a.lsdb().lookup(&id).unwrap().sequence_number(),
        INITIAL_SEQUENCE_NUMBER + 3
    );
}

#[test]
fn test_stale_copy_of_own_lsa_is_squelched() {
    let mut pair = Pair::new(TimersConfig::default());
    pair.converge();
    let id = LsaIdentity::router(A_ID);
    let own = pair.a.lsdb().lookup(&id).unwrap().lsa().clone();
    let seq = own.header.sequence_number;

    let stale = own.reissue(seq - 1, 1);
    let now = pair.now_ms;
    pair.a
        .handle_packet(IF0, B_ADDR, update_packet(B_ID, vec![stale]), now)
        .unwrap();

    let current = pair.a.lsdb().lookup(&id).unwrap();
    assert_eq!(current.sequence_number(), seq + 1);
    assert!(pair.a.neighbor(IF0, &B_ID).unwrap().retransmit_contains(&id));
}

#[test]
fn test_update_ignored_before_exchange() {
    let mut area = make_area(A_ID, A_ADDR, TimersConfig::default());
    area.start(0);
    let hello = area.interface(IF0).unwrap().build_hello(crate::lsa::OPTION_E);
    area.handle_packet(
        IF0,
        B_ADDR,
        Packet::new(B_ID, AreaId::BACKBONE, PacketBody::Hello(hello)),
        0,
    )
    .unwrap();
    assert_eq!(area.neighbor(IF0, &B_ID).unwrap().state(), NeighborState::Init);

    let lsa = third_party_lsa(INITIAL_SEQUENCE_NUMBER, 1);
    let id = *lsa.identity();
    area.handle_packet(IF0, B_ADDR, update_packet(B_ID, vec![lsa]), 0)
        .unwrap();
    assert!(area.lsdb().lookup(&id).is_none());
}
