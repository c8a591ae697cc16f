use peermesh_types::{Key, NodeId};
use std::str::FromStr;

#[test]
fn node_id_round_trips_through_display() {
    let id = NodeId::new("browser-42").unwrap();
    assert_eq!(id.to_string(), "browser-42");
    assert_eq!(NodeId::from_str("browser-42").unwrap(), id);
}

#[test]
fn node_id_allows_arbitrary_non_empty_strings() {
    for raw in ["A", "node with spaces", "ノード", "0"] {
        assert!(NodeId::new(raw).is_ok(), "{raw:?} should be accepted");
    }
}

#[test]
fn unset_node_sorts_below_every_real_node() {
    let mut nodes = vec![
        NodeId::new("zz").unwrap(),
        NodeId::unset(),
        NodeId::new("aa").unwrap(),
    ];
    nodes.sort();
    assert_eq!(nodes[0], NodeId::unset());
}

#[test]
fn key_round_trips_through_display() {
    let key = Key::new("doc:123").unwrap();
    assert_eq!(key.to_string(), "doc:123");
    assert_eq!(Key::from_str("doc:123").unwrap(), key);
}

#[test]
fn key_is_usable_as_map_key() {
    let mut map = std::collections::HashMap::new();
    map.insert(Key::new("a").unwrap(), 1);
    map.insert(Key::new("b").unwrap(), 2);
    assert_eq!(map[&Key::new("a").unwrap()], 1);
}

#[test]
fn keys_with_interior_nul_are_rejected_anywhere() {
    assert!(Key::new("\0").is_err());
    assert!(Key::new("a\0").is_err());
    assert!(Key::new("\0a").is_err());
}
