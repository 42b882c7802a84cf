//! Aging driven through the area tick: refresh and MaxAge flushing.

use super::*;
use crate::lsa::INITIAL_SEQUENCE_NUMBER;

#[test]
fn test_max_age_lsa_flooded_then_removed() {
    let mut pair = Pair::new(short_timers());
    pair.converge();
    pair.log.clear();

    let lsa = third_party_lsa(INITIAL_SEQUENCE_NUMBER, 50);
    let id = *lsa.identity();
    let now = pair.now_ms;
    pair.a
        .handle_packet(IF0, B_ADDR, update_packet(B_ID, vec![lsa]), now)
        .unwrap();
    assert!(pair.a.lsdb().lookup(&id).is_some());

    pair.run(11);
    let flooded = pair.updates_from_a_for(&id);
    assert!(!flooded.is_empty());
    assert_eq!(flooded[0].header.age, 60);

    // B never held it, so it acks directly and installs nothing
    assert!(pair.b.lsdb().lookup(&id).is_none());

    pair.run(2);
    assert!(pair.a.lsdb().lookup(&id).is_none());
    assert_eq!(pair.a.summary().neighbors[0].retransmit_count, 0);
}

#[test]
fn test_router_lsa_refreshed_once_per_interval() {
    let mut pair = Pair::new(short_timers());
    pair.converge();
    let id = LsaIdentity::router(A_ID);
    let seq0 = pair.a.lsdb().lookup(&id).unwrap().sequence_number();
    pair.log.clear();

    pair.run(31);

    let flooded = pair.updates_from_a_for(&id);
    assert!(!flooded.is_empty());
    assert!(flooded.iter().all(|l| l.header.sequence_number == seq0 + 1));
    assert!(flooded.iter().all(|l| l.header.age <= 2));
    assert_eq!(pair.b.lsdb().lookup(&id).unwrap().sequence_number(), seq0 + 1);
}

#[test]
fn test_self_originated_lsa_never_reaches_max_age() {
    let mut pair = Pair::new(short_timers());
    pair.converge();
    let id = LsaIdentity::router(A_ID);

    for _ in 0..150 {
        pair.tick();
        assert!(!pair.a.lsdb().is_max_age(&id));
        assert!(pair.a.lsdb().current_age(&id).unwrap() < 60);
    }
}
