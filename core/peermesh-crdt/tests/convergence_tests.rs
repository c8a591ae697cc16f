//! N-replica convergence: independent histories, full pairwise
//! exchange, identical end states — regardless of delivery order.

use peermesh_crdt::{GCounter, OrSet, Replica, ReplicaKind, State};
use peermesh_types::{NodeId, SeqGen};
use serde_json::json;

fn node(s: &str) -> NodeId {
    NodeId::new(s).unwrap()
}

#[test]
fn g_counter_three_replicas_converge() {
    let mut a = GCounter::new();
    let mut b = GCounter::new();
    let mut c = GCounter::new();

    a.increment_by(&node("A"), 3);
    b.increment_by(&node("B"), 5);
    c.increment_by(&node("C"), 7);
    c.increment(&node("C"));

    let (sa, sb, sc) = (a.clone(), b.clone(), c.clone());
    a.merge(&sb);
    a.merge(&sc);
    b.merge(&sc);
    b.merge(&sa);
    c.merge(&sa);
    c.merge(&sb);

    assert_eq!(a, b);
    assert_eq!(b, c);
    assert_eq!(a.value(), 16);
}

#[test]
fn convergence_independent_of_merge_order() {
    let mut states = Vec::new();
    for (name, amount) in [("A", 2u64), ("B", 4), ("C", 8)] {
        let mut c = GCounter::new();
        c.increment_by(&node(name), amount);
        states.push(c);
    }

    // Left-to-right vs right-to-left delivery.
    let forward = states[0].merged(&states[1]).merged(&states[2]);
    let backward = states[2].merged(&states[1]).merged(&states[0]);
    assert_eq!(forward, backward);
    assert_eq!(forward.value(), 14);
}

#[test]
fn or_set_partition_heals_with_add_wins() {
    let seq_a = SeqGen::new();
    let seq_b = SeqGen::new();
    let seq_c = SeqGen::new();

    let mut a = OrSet::new();
    let mut b = OrSet::new();
    let mut c = OrSet::new();

    // All three start with "doc" from A, fully synced.
    a.add("doc", &node("A"), &seq_a);
    b.merge(&a);
    c.merge(&a);

    // Partition: A adds again, B removes, C adds something else.
    a.add("doc", &node("A"), &seq_a);
    b.remove("doc");
    c.add("img", &node("C"), &seq_c);
    b.add("img", &node("B"), &seq_b);

    // Heal in two different orders.
    let healed_1 = a.merged(&b).merged(&c);
    let healed_2 = c.merged(&b).merged(&a);
    assert_eq!(healed_1, healed_2);

    // A's second add was never observed by B's remove, so "doc" lives.
    assert!(healed_1.contains("doc"));
    assert!(healed_1.contains("img"));
}

#[test]
fn replica_level_convergence_mixed_versions() {
    let mut a = Replica::empty(ReplicaKind::GCounter);
    if let State::GCounter(c) = a.state_mut() {
        c.increment_by(&node("A"), 3);
    }
    a.bump();

    let mut b = Replica::empty(ReplicaKind::GCounter);
    if let State::GCounter(c) = b.state_mut() {
        c.increment_by(&node("B"), 5);
    }
    b.bump();
    b.bump();

    let ab = a.merged(&b).unwrap();
    let ba = b.merged(&a).unwrap();
    assert_eq!(ab, ba);
    assert_eq!(ab.value(), json!(8));
    assert_eq!(ab.version(), 2);
}

#[test]
fn wire_exchange_converges() {
    // Replica exchange exactly as the channel does it: encode on one
    // side, decode and merge on the other.
    let seq = SeqGen::new();
    let mut server = Replica::empty(ReplicaKind::OrSet);
    if let State::OrSet(s) = server.state_mut() {
        s.add("x", &node("server"), &seq);
    }

    let mut peer = Replica::empty(ReplicaKind::OrSet);
    if let State::OrSet(s) = peer.state_mut() {
        s.add("y", &node("peer"), &seq);
    }

    let from_peer = Replica::decode(&peer.encode()).unwrap();
    server.merge(&from_peer).unwrap();

    let from_server = Replica::decode(&server.encode()).unwrap();
    peer.merge(&from_server).unwrap();

    assert_eq!(peer, server);
    assert_eq!(peer.value(), json!(["x", "y"]));
}
