//! 路由表（最短跳数路径）
//!
//! 对拓扑快照中的每一对设备，用 DFS 枚举所有简单路径，选出跳数最少的一条。
//! 代价与路径数量成正比，只适合几十个节点以内的小拓扑。
//!
//! 路由表整体替换：每次重算生成一个新的 `RoutingTable`，并持有它所基于的拓扑快照，
//! 这样端口推导与路径总是来自同一份拓扑。

use std::collections::HashMap;
use std::sync::Arc;

use super::id::{DeviceId, PortNo};
use super::topology::TopologySnapshot;
use tracing::{debug, trace};

/// 设备序列，`path[0] == src`，`path[last] == dst`
pub type Path = Vec<DeviceId>;

#[derive(Debug, Default, Clone)]
pub struct RoutingTable {
    topo: Arc<TopologySnapshot>,
    /// (src, dst) -> 最短路径；不可达时为空
    paths: HashMap<(DeviceId, DeviceId), Path>,
}

impl RoutingTable {
    /// 基于快照计算全部设备对的最短路径。
    ///
    /// (src, dst) 与 (dst, src) 作为一个整体计算，后者是前者的逆序。
    pub fn compute(topo: Arc<TopologySnapshot>) -> Self {
        let devices: Vec<DeviceId> = topo.devices().collect();
        let mut paths = HashMap::with_capacity(devices.len() * devices.len());

        for (i, &src) in devices.iter().enumerate() {
            paths.insert((src, src), vec![src]);
            for &dst in &devices[i + 1..] {
                let path = shortest_path(&topo, src, dst);
                trace!(%src, %dst, hops = path.len().saturating_sub(1), "最短路径");
                let mut rev = path.clone();
                rev.reverse();
                paths.insert((src, dst), path);
                paths.insert((dst, src), rev);
            }
        }

        debug!(devices = devices.len(), entries = paths.len(), "路由表计算完成");
        Self { topo, paths }
    }

    /// 路由表所基于的拓扑快照
    pub fn topology(&self) -> &TopologySnapshot {
        &self.topo
    }

    /// (src, dst) 的路径；没有条目或不可达时返回 None
    pub fn path(&self, src: DeviceId, dst: DeviceId) -> Option<&[DeviceId]> {
        self.paths
            .get(&(src, dst))
            .filter(|p| !p.is_empty())
            .map(|p| p.as_slice())
    }

    /// 路径上每一跳的 (设备, 出端口)。
    ///
    /// 前面各跳的端口取自邻接表，最后一跳约定使用主机端口 1。
    /// 路径不存在或与快照不一致时返回 None。
    pub fn hop_ports(&self, src: DeviceId, dst: DeviceId) -> Option<Vec<(DeviceId, PortNo)>> {
        let path = self.path(src, dst)?;
        let mut hops = Vec::with_capacity(path.len());
        for pair in path.windows(2) {
            hops.push((pair[0], self.topo.port(pair[0], pair[1])?));
        }
        hops.push((*path.last()?, PortNo::HOST));
        Some(hops)
    }

    /// 所有 (src, dst) 条目（含不可达的空路径）
    pub fn iter(&self) -> impl Iterator<Item = (&(DeviceId, DeviceId), &Path)> {
        self.paths.iter()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// 枚举 src 到 dst 的所有简单路径（DFS，已访问节点不再进入，保证有环时也会终止）。
pub fn all_simple_paths(topo: &TopologySnapshot, src: DeviceId, dst: DeviceId) -> Vec<Path> {
    if src == dst {
        return vec![vec![src]];
    }
    let mut found = Vec::new();
    let mut stack: Vec<(DeviceId, Path)> = vec![(src, vec![src])];
    while let Some((node, path)) = stack.pop() {
        for next in topo.neighbors(node) {
            if path.contains(&next) {
                continue;
            }
            let mut extended = path.clone();
            extended.push(next);
            if next == dst {
                found.push(extended);
            } else {
                stack.push((next, extended));
            }
        }
    }
    found
}

/// 跳数最少的简单路径；多条等长时取最先发现的一条。不可达时返回空路径。
pub fn shortest_path(topo: &TopologySnapshot, src: DeviceId, dst: DeviceId) -> Path {
    let mut best: Path = Vec::new();
    for path in all_simple_paths(topo, src, dst) {
        if best.is_empty() || path.len() < best.len() {
            best = path;
        }
    }
    best
}
