//! 一次完整的路径测量：计数快照 -> 停留 + 时延探测 -> 计数快照

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::net::{DeviceId, RoutingTable};
use crate::plane::FlowMatch;

use super::counters::{CounterStore, loss_ratio};
use super::delay::{DelayProber, DelaySamples};

/// 测量计划
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasurePlan {
    /// 第一次计数快照之后、开始探测之前的停留
    pub dwell: Duration,
    pub probes: u32,
    pub spacing: Duration,
}

/// 一次测量的结果
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    /// 丢包率；计数不可用时为 None
    pub loss: Option<f64>,
    /// 有效时延样本的均值（毫秒）；全部丢失时为 None
    pub delay_ms: Option<f64>,
    pub delays: DelaySamples,
}

pub struct MeasurementEngine {
    prober: Arc<DelayProber>,
    counters: Arc<CounterStore>,
    host_subnet: Ipv4Addr,
}

impl MeasurementEngine {
    pub fn new(prober: Arc<DelayProber>, counters: Arc<CounterStore>, host_subnet: Ipv4Addr) -> Self {
        Self {
            prober,
            counters,
            host_subnet,
        }
    }

    /// 测量 (src, dst) 的丢包与时延。
    ///
    /// 丢包用的是业务流（两端主机之间的 IPv4 流）的计数，而不是探测帧。
    #[tracing::instrument(skip_all, fields(%src, %dst))]
    pub async fn measure(
        &self,
        table: &RoutingTable,
        src: DeviceId,
        dst: DeviceId,
        plan: MeasurePlan,
    ) -> Measurement {
        let flow = FlowMatch::host_ipv4(self.host_subnet, src, dst);

        let before = self.counters.snapshot(src, dst, flow).await.ok();
        tokio::time::sleep(plan.dwell).await;

        let delays = match self
            .prober
            .sample(table, src, dst, plan.probes, plan.spacing)
            .await
        {
            Ok(d) => d,
            Err(e) => {
                warn!(error = %e, "时延探测失败");
                DelaySamples::default()
            }
        };

        let after = self.counters.snapshot(src, dst, flow).await.ok();
        let loss = match (before, after) {
            (Some(b), Some(a)) => Some(loss_ratio(b.tx, b.rx, a.tx, a.rx)),
            _ => None,
        };
        let delay_ms = delays.mean();

        info!(
            loss = ?loss,
            delay_ms = ?delay_ms,
            samples = delays.samples.len(),
            lost = delays.lost,
            "测量完成"
        );
        Measurement {
            loss,
            delay_ms,
            delays,
        }
    }
}
