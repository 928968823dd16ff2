// Integration tests for objects replicated between in-process nodes
// Tests sharing, first-contact convergence and node departure

mod common;

use std::sync::Arc;

use serde_json::json;

use common::{Counting, init_tracing};
use orrery_core::{
    ConcurrentList, LocalCluster, MapFactory, ObjectFactory, ObjectMap, ReplicatedObject,
    UnionListMerge,
    service::{ConcurrentListFactory, SerdeFactory},
};

const A: &str = "http://10.0.0.1:8848";
const B: &str = "http://10.0.0.2:8848";
const C: &str = "http://10.0.0.3:8848";

fn mesh(urls: &[&str]) -> Vec<Arc<LocalCluster>> {
    let nodes: Vec<_> = urls.iter().map(|url| LocalCluster::new(*url)).collect();
    for (i, node) in nodes.iter().enumerate() {
        for other in &nodes[i + 1..] {
            node.connect(other);
        }
    }
    nodes
}

fn map(value: serde_json::Value) -> ObjectMap {
    MapFactory.new_object(Some(value)).unwrap()
}

#[test]
fn test_share_round_trip() {
    init_tracing();
    let nodes = mesh(&[A, B]);
    let a = ReplicatedObject::<ObjectMap>::new(nodes[0].clone(), "users", MapFactory).unwrap();
    let b = ReplicatedObject::<ObjectMap>::new(nodes[1].clone(), "users", MapFactory).unwrap();

    a.set_local(map(json!({"alice": 1}))).unwrap();
    a.share().unwrap();

    assert_eq!(b.get_remote(A), Some(map(json!({"alice": 1}))));
    // First contact pushed b's local value back to a
    assert_eq!(a.get_remote(B), Some(ObjectMap::new()));

    b.set_local(map(json!({"bob": 2}))).unwrap();
    b.share().unwrap();
    assert_eq!(a.get_remote(B), Some(map(json!({"bob": 2}))));
    assert!(!a.get_info(B).unwrap().is_initial());
}

#[test]
fn test_local_value_not_broadcast_until_shared() {
    let nodes = mesh(&[A, B]);
    let a = ReplicatedObject::<ObjectMap>::new(nodes[0].clone(), "users", MapFactory).unwrap();
    let b = ReplicatedObject::<ObjectMap>::new(nodes[1].clone(), "users", MapFactory).unwrap();

    a.set_local(map(json!({"alice": 1}))).unwrap();

    assert_eq!(b.get_remote(A), None);
    assert_eq!(b.len(), 1);
}

#[test]
fn test_nodes_converge() {
    init_tracing();
    let nodes = mesh(&[A, B, C]);
    let objects: Vec<_> = nodes
        .iter()
        .map(|node| {
            ReplicatedObject::<Vec<i64>>::new(node.clone(), "ids", SerdeFactory::<Vec<i64>>::new())
                .unwrap()
        })
        .collect();

    for (i, object) in objects.iter().enumerate() {
        object.set_local(vec![i as i64 + 1]).unwrap();
        object.share().unwrap();
    }

    for object in &objects {
        assert_eq!(object.len(), 3);
        let mut merged = object.get(&UnionListMerge);
        merged.sort();
        assert_eq!(merged, vec![1, 2, 3]);
    }

    for url in [A, B, C] {
        let views: Vec<_> = objects.iter().map(|o| o.get_remote(url)).collect();
        assert!(views.windows(2).all(|w| w[0] == w[1]));
    }
}

#[test]
fn test_node_leave_removes_entry() {
    let nodes = mesh(&[A, B, C]);
    let objects: Vec<_> = nodes
        .iter()
        .map(|node| {
            ReplicatedObject::<ObjectMap>::new(node.clone(), "users", MapFactory).unwrap()
        })
        .collect();
    for object in &objects {
        object.share().unwrap();
    }
    let counting = Arc::new(Counting::default());
    objects[0].add_listener(counting.clone());

    nodes[1].leave();

    assert_eq!(objects[0].len(), 2);
    assert_eq!(objects[0].get_remote(B), None);
    assert!(objects[0].get_remote(C).is_some());
    assert_eq!(objects[2].get_remote(B), None);
    assert_eq!(counting.removals(), 1);

    // The node that left only keeps its own entry
    assert_eq!(objects[1].len(), 1);
    assert!(objects[1].get_local().is_some());
}

#[test]
fn test_objects_with_different_names_are_independent() {
    let nodes = mesh(&[A, B]);
    let users = ReplicatedObject::<ObjectMap>::new(nodes[0].clone(), "users", MapFactory).unwrap();
    let groups = ReplicatedObject::<ObjectMap>::new(nodes[0].clone(), "groups", MapFactory).unwrap();
    let remote_users =
        ReplicatedObject::<ObjectMap>::new(nodes[1].clone(), "users", MapFactory).unwrap();
    let counting = Arc::new(Counting::default());
    remote_users.add_listener(counting.clone());

    users.set_local(map(json!({"alice": 1}))).unwrap();
    users.share().unwrap();
    groups.set_local(map(json!({"admins": 1}))).unwrap();
    groups.share().unwrap();

    // One delivery per share, even with two objects observing the channel
    assert_eq!(counting.updates(), 1);
    assert_eq!(remote_users.get_remote(A), Some(map(json!({"alice": 1}))));
    assert_eq!(groups.len(), 1);
}

#[test]
fn test_concurrent_list_replication() {
    let nodes = mesh(&[A, B]);
    let a = ReplicatedObject::<ConcurrentList<String>>::new(
        nodes[0].clone(),
        "tags",
        ConcurrentListFactory::<String>::new(),
    )
    .unwrap();
    let b = ReplicatedObject::<ConcurrentList<String>>::new(
        nodes[1].clone(),
        "tags",
        ConcurrentListFactory::<String>::new(),
    )
    .unwrap();

    let local = a.get_local().unwrap();
    local.push("red".to_string());
    local.push("blue".to_string());
    a.share().unwrap();
    b.get_local().unwrap().push("green".to_string());
    b.share().unwrap();

    let mut merged = a.get(&UnionListMerge);
    merged.sort();
    assert_eq!(merged, vec!["blue", "green", "red"]);
    assert_eq!(b.get_remote(A).unwrap().snapshot(), vec!["red", "blue"]);
}
