//! 转发面抽象
//!
//! 控制器只通过 [`ForwardingPlane`] 操作设备：下发/删除规则、从端口发出原始帧、
//! 请求规则计数。所有异步结果（拓扑变化、帧上送、计数应答）都以 [`Notification`]
//! 的形式送入控制器的事件通道，与具体的宿主分发机制解耦。

mod flow;
mod frame;

pub use flow::{FlowMatch, MacAddr, Output, host_addr};
pub use frame::{PROBE_ETH_TYPE, ProbeFrame, eth_header, probe_mac};

use crate::net::{DeviceId, PortNo, TopoEvent};

/// 转发面操作失败
#[derive(Debug, thiserror::Error)]
pub enum PlaneError {
    #[error("unknown device {0}")]
    UnknownDevice(DeviceId),
    #[error("no port {port} on device {device}")]
    UnknownPort { device: DeviceId, port: PortNo },
    #[error("forwarding plane channel closed")]
    Closed,
}

/// 规则计数应答
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterReply {
    pub device: DeviceId,
    pub flow: FlowMatch,
    pub packet_count: u64,
}

/// 转发面送往控制器的异步通知
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Topo(TopoEvent),
    FrameArrived { device: DeviceId, data: Vec<u8> },
    Counters(CounterReply),
}

/// 每台设备暴露的转发面能力。
///
/// 所有方法都是“发出即返回”，不等待设备确认；
/// `request_counters` 的结果经 [`Notification::Counters`] 异步送回。
pub trait ForwardingPlane: Send + Sync {
    /// 在 `device` 上按优先级下发 match -> output 规则
    fn install_rule(
        &self,
        device: DeviceId,
        priority: u16,
        flow: &FlowMatch,
        out: Output,
    ) -> Result<(), PlaneError>;

    /// 删除 `device` 上匹配条件等于 `flow` 的所有规则
    fn delete_rules(&self, device: DeviceId, flow: &FlowMatch) -> Result<(), PlaneError>;

    /// 从 `device` 的 `port` 发出原始帧
    fn send_frame(&self, device: DeviceId, port: PortNo, data: Vec<u8>) -> Result<(), PlaneError>;

    /// 请求 `device` 上匹配 `flow` 的规则计数
    fn request_counters(&self, device: DeviceId, flow: &FlowMatch) -> Result<(), PlaneError>;
}
