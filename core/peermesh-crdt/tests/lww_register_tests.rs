use peermesh_crdt::LwwRegister;
use peermesh_types::NodeId;
use serde_json::{json, Value};

fn node(s: &str) -> NodeId {
    NodeId::new(s).unwrap()
}

#[test]
fn unset_register_is_null() {
    let r = LwwRegister::unset();
    assert_eq!(r.value(), &Value::Null);
    assert_eq!(r.timestamp(), 0);
    assert_eq!(r.author(), &NodeId::unset());
}

#[test]
fn set_stores_value_and_author() {
    let mut r = LwwRegister::unset();
    r.set(json!("title"), &node("A"));
    assert_eq!(r.value(), &json!("title"));
    assert_eq!(r.author(), &node("A"));
    assert!(r.timestamp() > 0);
}

#[test]
fn local_writes_never_tie() {
    // Even with a frozen wall clock the second write must exceed the
    // first; set() takes max(current + 1, wall clock).
    let mut r = LwwRegister::from_parts(json!("a"), u64::MAX - 10, node("A"));
    let first = r.timestamp();
    r.set(json!("b"), &node("A"));
    assert!(r.timestamp() > first);
}

#[test]
fn higher_timestamp_wins() {
    let old = LwwRegister::from_parts(json!("old"), 100, node("A"));
    let new = LwwRegister::from_parts(json!("new"), 200, node("B"));

    assert_eq!(old.merged(&new).value(), &json!("new"));
    assert_eq!(new.merged(&old).value(), &json!("new"));
}

#[test]
fn equal_timestamps_break_ties_by_author() {
    // set(_, "alpha", "nA", ts=100) and set(_, "beta", "nB", ts=100):
    // "nB" > "nA" lexicographically, so "beta" wins in either order.
    let a = LwwRegister::from_parts(json!("alpha"), 100, node("nA"));
    let b = LwwRegister::from_parts(json!("beta"), 100, node("nB"));

    let ab = a.merged(&b);
    let ba = b.merged(&a);
    assert_eq!(ab.value(), &json!("beta"));
    assert_eq!(ab, ba);
}

#[test]
fn any_author_beats_unset_at_equal_timestamp() {
    let unset_at_ts = LwwRegister::from_parts(Value::Null, 100, NodeId::unset());
    let written = LwwRegister::from_parts(json!("v"), 100, node("A"));
    assert_eq!(unset_at_ts.merged(&written).value(), &json!("v"));
}

#[test]
fn exact_tie_keeps_receiving_side() {
    let a = LwwRegister::from_parts(json!("same"), 100, node("A"));
    let b = LwwRegister::from_parts(json!("same"), 100, node("A"));
    assert_eq!(a.merged(&b), a);
    assert_eq!(b.merged(&a), b);
}

#[test]
fn write_applies_only_winning_remote_writes() {
    let mut r = LwwRegister::from_parts(json!("current"), 100, node("B"));

    assert!(!r.write(json!("stale"), 50, &node("A")));
    assert_eq!(r.value(), &json!("current"));

    assert!(!r.write(json!("tied-lower"), 100, &node("A")));
    assert_eq!(r.value(), &json!("current"));

    assert!(r.write(json!("fresh"), 150, &node("A")));
    assert_eq!(r.value(), &json!("fresh"));
    assert_eq!(r.author(), &node("A"));
}

#[test]
fn delta_is_unset_when_nothing_newer() {
    let old = LwwRegister::from_parts(json!("v"), 100, node("A"));
    assert_eq!(old.delta(&old), LwwRegister::unset());

    let stale = LwwRegister::from_parts(json!("s"), 50, node("B"));
    assert_eq!(old.delta(&stale), LwwRegister::unset());
}

#[test]
fn delta_carries_newer_write() {
    let old = LwwRegister::from_parts(json!("v1"), 100, node("A"));
    let new = LwwRegister::from_parts(json!("v2"), 200, node("B"));
    let delta = old.delta(&new);
    assert_eq!(old.merged(&delta), new);
}

#[test]
fn value_may_be_arbitrary_json() {
    let mut r = LwwRegister::unset();
    r.set(json!({"nested": {"list": [1, 2, 3]}}), &node("A"));
    assert_eq!(r.value()["nested"]["list"][2], json!(3));

    r.set(Value::Null, &node("A"));
    assert_eq!(r.value(), &Value::Null);
}
