//! 拓扑存储
//!
//! 维护设备集合与邻接表（邻居 -> 本地出端口），由拓扑事件驱动修改；
//! 路由计算只消费不可变快照，避免与并发到达的通知竞争。

use std::collections::{BTreeMap, BTreeSet};

use super::id::{DeviceId, PortNo};
use tracing::{debug, info};

/// 拓扑事件（设备上下线、链路增删）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopoEvent {
    DeviceUp(DeviceId),
    DeviceDown(DeviceId),
    LinkUp {
        a: DeviceId,
        port_a: PortNo,
        b: DeviceId,
        port_b: PortNo,
    },
    LinkDown {
        a: DeviceId,
        b: DeviceId,
    },
}

/// 拓扑的不可变快照
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopologySnapshot {
    devices: BTreeSet<DeviceId>,
    /// a -> (b -> a 上通往 b 的端口)
    adjacency: BTreeMap<DeviceId, BTreeMap<DeviceId, PortNo>>,
}

impl TopologySnapshot {
    /// 已知设备（升序）
    pub fn devices(&self) -> impl Iterator<Item = DeviceId> + '_ {
        self.devices.iter().copied()
    }

    pub fn contains(&self, dev: DeviceId) -> bool {
        self.devices.contains(&dev)
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// `dev` 的邻居（升序）
    pub fn neighbors(&self, dev: DeviceId) -> impl Iterator<Item = DeviceId> + '_ {
        self.adjacency
            .get(&dev)
            .into_iter()
            .flat_map(|m| m.keys().copied())
    }

    /// `from` 上通往相邻设备 `to` 的端口
    pub fn port(&self, from: DeviceId, to: DeviceId) -> Option<PortNo> {
        self.adjacency.get(&from).and_then(|m| m.get(&to)).copied()
    }

    /// 有向邻接条目数（每条无向链路计 2）
    pub fn adjacency_len(&self) -> usize {
        self.adjacency.values().map(BTreeMap::len).sum()
    }
}

/// 可变拓扑存储，由唯一的拓扑任务持有。
#[derive(Debug, Default)]
pub struct TopologyStore {
    topo: TopologySnapshot,
}

impl TopologyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 应用一条拓扑事件
    pub fn apply(&mut self, ev: TopoEvent) {
        match ev {
            TopoEvent::DeviceUp(id) => self.on_device_up(id),
            TopoEvent::DeviceDown(id) => self.on_device_down(id),
            TopoEvent::LinkUp { a, port_a, b, port_b } => self.on_link_up(a, port_a, b, port_b),
            TopoEvent::LinkDown { a, b } => self.on_link_down(a, b),
        }
    }

    pub fn on_device_up(&mut self, id: DeviceId) {
        if self.topo.devices.insert(id) {
            info!(device = %id, "设备接入");
        }
    }

    /// 设备离线：删除设备本身以及所有引用它的邻接条目
    pub fn on_device_down(&mut self, id: DeviceId) {
        // 链路通知可能先于设备接入到达，邻接条目无论设备是否已知都要清理
        let known = self.topo.devices.remove(&id);
        self.topo.adjacency.remove(&id);
        for nbrs in self.topo.adjacency.values_mut() {
            nbrs.remove(&id);
        }
        self.topo.adjacency.retain(|_, nbrs| !nbrs.is_empty());
        if known {
            info!(device = %id, "设备断开");
        }
    }

    pub fn on_link_up(&mut self, a: DeviceId, port_a: PortNo, b: DeviceId, port_b: PortNo) {
        self.topo.adjacency.entry(a).or_default().insert(b, port_a);
        self.topo.adjacency.entry(b).or_default().insert(a, port_b);
        debug!(%a, %port_a, %b, %port_b, "链路建立");
    }

    /// 链路拆除：两个方向分别删除，任一方向已不存在都不算错误
    pub fn on_link_down(&mut self, a: DeviceId, b: DeviceId) {
        let removed_ab = Self::remove_half(&mut self.topo.adjacency, a, b);
        let removed_ba = Self::remove_half(&mut self.topo.adjacency, b, a);
        if removed_ab || removed_ba {
            debug!(%a, %b, "链路拆除");
        }
    }

    fn remove_half(
        adjacency: &mut BTreeMap<DeviceId, BTreeMap<DeviceId, PortNo>>,
        from: DeviceId,
        to: DeviceId,
    ) -> bool {
        let Some(nbrs) = adjacency.get_mut(&from) else {
            return false;
        };
        let removed = nbrs.remove(&to).is_some();
        if nbrs.is_empty() {
            adjacency.remove(&from);
        }
        removed
    }

    /// 当前拓扑的拷贝
    pub fn snapshot(&self) -> TopologySnapshot {
        self.topo.clone()
    }
}
