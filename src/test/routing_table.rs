use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use proptest::prelude::*;

use super::{chain4, d, snapshot_of, star};
use crate::net::{DeviceId, PortNo, RoutingTable, TopologySnapshot, all_simple_paths, shortest_path};

/// BFS 得到的最短跳数，用来交叉校验 DFS 的结果
fn bfs_hops(topo: &TopologySnapshot, src: DeviceId, dst: DeviceId) -> Option<usize> {
    let mut dist: HashMap<DeviceId, usize> = HashMap::from([(src, 0)]);
    let mut q = VecDeque::from([src]);
    while let Some(v) = q.pop_front() {
        if v == dst {
            return Some(dist[&v]);
        }
        for n in topo.neighbors(v) {
            if !dist.contains_key(&n) {
                dist.insert(n, dist[&v] + 1);
                q.push_back(n);
            }
        }
    }
    None
}

fn assert_valid_path(topo: &TopologySnapshot, path: &[DeviceId], src: DeviceId, dst: DeviceId) {
    assert_eq!(path.first(), Some(&src));
    assert_eq!(path.last(), Some(&dst));
    for pair in path.windows(2) {
        assert!(
            topo.port(pair[0], pair[1]).is_some(),
            "{:?} -> {:?} not adjacent",
            pair[0],
            pair[1]
        );
    }
}

#[test]
fn diamond_picks_a_two_hop_path() {
    // 1 - 2 - 4
    //  \- 3 -/
    let snap = snapshot_of(
        &[1, 2, 3, 4],
        &[(1, 2, 2, 2), (1, 3, 3, 2), (2, 3, 4, 2), (3, 3, 4, 3)],
    );
    let paths = all_simple_paths(&snap, d(1), d(4));
    assert_eq!(paths.len(), 2);

    let table = RoutingTable::compute(Arc::new(snap));
    let p = table.path(d(1), d(4)).expect("path 1->4");
    assert_eq!(p.len(), 3);
    assert_valid_path(table.topology(), p, d(1), d(4));
}

#[test]
fn shortest_path_prefers_direct_link_over_long_detour() {
    // 环 1-2-3-4-5-1
    let snap = snapshot_of(
        &[1, 2, 3, 4, 5],
        &[(1, 2, 2, 3), (2, 2, 3, 3), (3, 2, 4, 3), (4, 2, 5, 3), (5, 2, 1, 3)],
    );
    assert_eq!(shortest_path(&snap, d(1), d(5)), vec![d(1), d(5)]);
    assert_eq!(shortest_path(&snap, d(1), d(3)), vec![d(1), d(2), d(3)]);
}

#[test]
fn reverse_entry_is_exact_reverse() {
    let table = chain4();
    for ((src, dst), path) in table.iter() {
        let mut rev = table.path(*dst, *src).expect("reverse entry").to_vec();
        rev.reverse();
        assert_eq!(&rev, path, "{src:?}->{dst:?}");
    }
}

#[test]
fn same_device_pair_is_trivial_path() {
    let table = star();
    assert_eq!(table.path(d(3), d(3)), Some(&[d(3)][..]));
}

#[test]
fn unreachable_pair_has_no_path() {
    let snap = snapshot_of(&[1, 2, 3], &[(1, 2, 2, 2)]);
    let table = RoutingTable::compute(Arc::new(snap));
    assert!(table.path(d(1), d(3)).is_none());
    assert!(table.path(d(3), d(1)).is_none());
    assert!(table.hop_ports(d(1), d(3)).is_none());
    assert!(table.path(d(1), d(2)).is_some());
}

#[test]
fn hop_ports_use_adjacency_and_host_port_on_last_hop() {
    let table = chain4();
    let hops = table.hop_ports(d(1), d(4)).expect("hops");
    assert_eq!(
        hops,
        vec![
            (d(1), PortNo(2)),
            (d(2), PortNo(2)),
            (d(3), PortNo(2)),
            (d(4), PortNo::HOST)
        ]
    );

    let back = table.hop_ports(d(4), d(1)).expect("hops");
    assert_eq!(back[0], (d(4), PortNo(3)));
    assert_eq!(back[3], (d(1), PortNo::HOST));
}

#[test]
fn empty_topology_gives_empty_table() {
    let table = RoutingTable::compute(Arc::new(TopologySnapshot::default()));
    assert!(table.is_empty());
}

fn arb_graph() -> impl Strategy<Value = (u64, Vec<(u64, u64)>)> {
    (2u64..8).prop_flat_map(|n| {
        let edges = prop::collection::vec((1..=n, 1..=n), 0..14);
        (Just(n), edges)
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// 每个可达设备对的路径都是合法的最短路径，与 BFS 跳数一致
    #[test]
    fn computed_paths_are_minimal((n, edges) in arb_graph()) {
        let devices: Vec<u64> = (1..=n).collect();
        let mut next_port: HashMap<u64, u32> = HashMap::new();
        let mut links = Vec::new();
        for (a, b) in edges {
            if a == b {
                continue;
            }
            let pa = { let p = next_port.entry(a).or_insert(2); *p += 1; *p - 1 };
            let pb = { let p = next_port.entry(b).or_insert(2); *p += 1; *p - 1 };
            links.push((a, pa, b, pb));
        }
        let snap = snapshot_of(&devices, &links);
        let table = RoutingTable::compute(Arc::new(snap.clone()));

        for &s in &devices {
            for &t in &devices {
                let (s, t) = (d(s), d(t));
                match (table.path(s, t), bfs_hops(&snap, s, t)) {
                    (Some(p), Some(hops)) => {
                        assert_valid_path(&snap, p, s, t);
                        prop_assert_eq!(p.len() - 1, hops);
                    }
                    (None, None) => {}
                    (p, h) => prop_assert!(false, "mismatch {:?}->{:?}: {:?} vs {:?}", s, t, p, h),
                }
            }
        }
    }
}
