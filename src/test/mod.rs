//! 单元测试与共用的测试替身

mod emu;
mod frame;
mod path_manager;
mod routing_table;

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::net::{DeviceId, PortNo, RoutingTable, TopoEvent, TopologySnapshot, TopologyStore};
use crate::plane::{FlowMatch, ForwardingPlane, Output, PlaneError};

/// 转发面上的一次操作
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PlaneOp {
    Install {
        device: DeviceId,
        priority: u16,
        flow: FlowMatch,
        out: Output,
    },
    Delete {
        device: DeviceId,
        flow: FlowMatch,
    },
    Send {
        device: DeviceId,
        port: PortNo,
        data: Vec<u8>,
    },
    Query {
        device: DeviceId,
        flow: FlowMatch,
    },
}

/// 记录所有操作的转发面；可选地把操作转发给测试里的应答任务
#[derive(Default)]
pub(crate) struct RecordingPlane {
    ops: Mutex<Vec<PlaneOp>>,
    hook: Option<mpsc::UnboundedSender<PlaneOp>>,
    unknown: Vec<DeviceId>,
}

impl RecordingPlane {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_hook() -> (Self, mpsc::UnboundedReceiver<PlaneOp>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                hook: Some(tx),
                ..Self::default()
            },
            rx,
        )
    }

    /// 同 `with_hook`，但对 `devices` 的操作返回 `UnknownDevice`
    pub(crate) fn with_hook_rejecting(
        devices: &[DeviceId],
    ) -> (Self, mpsc::UnboundedReceiver<PlaneOp>) {
        let (plane, rx) = Self::with_hook();
        (
            Self {
                unknown: devices.to_vec(),
                ..plane
            },
            rx,
        )
    }

    /// 对这些设备的操作返回 `UnknownDevice`
    pub(crate) fn rejecting(devices: &[DeviceId]) -> Self {
        Self {
            unknown: devices.to_vec(),
            ..Self::default()
        }
    }

    pub(crate) fn ops(&self) -> Vec<PlaneOp> {
        self.ops.lock().expect("ops lock").clone()
    }

    pub(crate) fn clear(&self) {
        self.ops.lock().expect("ops lock").clear();
    }

    fn record(&self, device: DeviceId, op: PlaneOp) -> Result<(), PlaneError> {
        if self.unknown.contains(&device) {
            return Err(PlaneError::UnknownDevice(device));
        }
        self.ops.lock().expect("ops lock").push(op.clone());
        if let Some(hook) = &self.hook {
            let _ = hook.send(op);
        }
        Ok(())
    }
}

impl ForwardingPlane for RecordingPlane {
    fn install_rule(
        &self,
        device: DeviceId,
        priority: u16,
        flow: &FlowMatch,
        out: Output,
    ) -> Result<(), PlaneError> {
        self.record(
            device,
            PlaneOp::Install {
                device,
                priority,
                flow: *flow,
                out,
            },
        )
    }

    fn delete_rules(&self, device: DeviceId, flow: &FlowMatch) -> Result<(), PlaneError> {
        self.record(device, PlaneOp::Delete { device, flow: *flow })
    }

    fn send_frame(&self, device: DeviceId, port: PortNo, data: Vec<u8>) -> Result<(), PlaneError> {
        self.record(device, PlaneOp::Send { device, port, data })
    }

    fn request_counters(&self, device: DeviceId, flow: &FlowMatch) -> Result<(), PlaneError> {
        self.record(device, PlaneOp::Query { device, flow: *flow })
    }
}

pub(crate) fn d(id: u64) -> DeviceId {
    DeviceId(id)
}

/// 由 (a, port_a, b, port_b) 列表建拓扑快照
pub(crate) fn snapshot_of(devices: &[u64], links: &[(u64, u32, u64, u32)]) -> TopologySnapshot {
    let mut store = TopologyStore::new();
    for &id in devices {
        store.apply(TopoEvent::DeviceUp(d(id)));
    }
    for &(a, pa, b, pb) in links {
        store.apply(TopoEvent::LinkUp {
            a: d(a),
            port_a: PortNo(pa),
            b: d(b),
            port_b: PortNo(pb),
        });
    }
    store.snapshot()
}

/// 1 为中心、2/3/4 为叶子的星形；1 上通往 n 的端口为 n，叶子上通往 1 的端口为 2
pub(crate) fn star() -> RoutingTable {
    let snap = snapshot_of(&[1, 2, 3, 4], &[(1, 2, 2, 2), (1, 3, 3, 2), (1, 4, 4, 2)]);
    RoutingTable::compute(Arc::new(snap))
}

/// 1 - 2 - 3 - 4 的链；i 上通往 i+1 的端口为 2，通往 i-1 的端口为 3
pub(crate) fn chain4() -> RoutingTable {
    let snap = snapshot_of(
        &[1, 2, 3, 4],
        &[(1, 2, 2, 3), (2, 2, 3, 3), (3, 2, 4, 3)],
    );
    RoutingTable::compute(Arc::new(snap))
}
