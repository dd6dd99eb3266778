//! 引导路径管理
//!
//! 外发流量（固定源/目的地址）沿 入口 -> 当前出口 的最短路径转发。
//! 任一时刻最多只装一条引导路径；切换出口时先删旧路径，等待一段时间再装新路径，
//! 避免同一台交换机上的删除与下发互相竞争。

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::net::{DeviceId, RoutingTable};
use crate::plane::{FlowMatch, ForwardingPlane, Output, PlaneError};

/// 引导请求失败
#[derive(Debug, thiserror::Error)]
pub enum SteerError {
    #[error("invalid steering request {src} -> {dst}: src must be the ingress and dst an egress candidate")]
    InvalidRequest { src: DeviceId, dst: DeviceId },
    #[error("no path from {src} to {dst}")]
    NoPath { src: DeviceId, dst: DeviceId },
    #[error("{failed} of {total} rule operations failed, first: {first}")]
    Plane {
        failed: usize,
        total: usize,
        first: PlaneError,
    },
}

/// `switch_egress` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// 目标就是当前出口，什么都没做
    Unchanged,
    Switched { from: Option<DeviceId> },
}

pub struct PathManager {
    plane: Arc<dyn ForwardingPlane>,
    ingress: DeviceId,
    candidates: BTreeSet<DeviceId>,
    flow: FlowMatch,
    priority: u16,
    settle: Duration,
    current: Option<DeviceId>,
}

impl PathManager {
    pub fn new(
        plane: Arc<dyn ForwardingPlane>,
        ingress: DeviceId,
        candidates: impl IntoIterator<Item = DeviceId>,
        flow: FlowMatch,
        priority: u16,
        settle: Duration,
    ) -> Self {
        Self {
            plane,
            ingress,
            candidates: candidates.into_iter().collect(),
            flow,
            priority,
            settle,
            current: None,
        }
    }

    /// 当前承载外发流量的出口
    pub fn current_egress(&self) -> Option<DeviceId> {
        self.current
    }

    fn check_request(&self, src: DeviceId, dst: DeviceId) -> Result<(), SteerError> {
        if src != self.ingress || !self.candidates.contains(&dst) {
            warn!(%src, %dst, "拒绝非法的引导请求");
            return Err(SteerError::InvalidRequest { src, dst });
        }
        Ok(())
    }

    /// 在 src -> dst 路径的每一跳下发高优先级转发规则
    #[tracing::instrument(skip_all, fields(%src, %dst))]
    pub fn install_steering_path(
        &self,
        table: &RoutingTable,
        src: DeviceId,
        dst: DeviceId,
    ) -> Result<(), SteerError> {
        self.check_request(src, dst)?;
        let hops = table
            .hop_ports(src, dst)
            .ok_or(SteerError::NoPath { src, dst })?;
        debug!(hops = hops.len(), "下发引导路径");
        collect_failures(hops.iter().map(|&(dev, port)| {
            self.plane
                .install_rule(dev, self.priority, &self.flow, Output::Port(port))
        }))
    }

    /// 删除 src -> dst 路径每一跳上的引导规则
    #[tracing::instrument(skip_all, fields(%src, %dst))]
    pub fn withdraw_steering_path(
        &self,
        table: &RoutingTable,
        src: DeviceId,
        dst: DeviceId,
    ) -> Result<(), SteerError> {
        self.check_request(src, dst)?;
        let path = table.path(src, dst).ok_or(SteerError::NoPath { src, dst })?;
        debug!(hops = path.len(), "删除引导路径");
        collect_failures(path.iter().map(|&dev| self.plane.delete_rules(dev, &self.flow)))
    }

    /// 把外发流量切到 `new_egress`。
    ///
    /// 与当前出口相同时不做任何操作。旧路径删除失败只记日志；
    /// 新路径下发失败时当前出口已更新，错误返回给调用方记录。
    pub async fn switch_egress(
        &mut self,
        table: &RoutingTable,
        new_egress: DeviceId,
    ) -> Result<SwitchOutcome, SteerError> {
        if self.current == Some(new_egress) {
            debug!(egress = %new_egress, "出口未变化");
            return Ok(SwitchOutcome::Unchanged);
        }
        self.check_request(self.ingress, new_egress)?;
        info!(from = ?self.current, to = %new_egress, "切换出口");

        let from = self.current;
        if let Some(old) = from {
            if let Err(e) = self.withdraw_steering_path(table, self.ingress, old) {
                warn!(egress = %old, error = %e, "旧引导路径删除失败");
            }
        }
        tokio::time::sleep(self.settle).await;

        self.current = Some(new_egress);
        self.install_steering_path(table, self.ingress, new_egress)?;
        Ok(SwitchOutcome::Switched { from })
    }
}

fn collect_failures(results: impl Iterator<Item = Result<(), PlaneError>>) -> Result<(), SteerError> {
    let mut total = 0;
    let mut failed = 0;
    let mut first = None;
    for r in results {
        total += 1;
        if let Err(e) = r {
            failed += 1;
            first.get_or_insert(e);
        }
    }
    match first {
        None => Ok(()),
        Some(first) => Err(SteerError::Plane {
            failed,
            total,
            first,
        }),
    }
}
