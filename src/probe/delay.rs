//! 单向时延探测
//!
//! 在 (src, dst) 路径的中间跳下发临时低优先级规则转发探测帧，目的设备把探测帧上送控制器；
//! 从源设备发出探测帧并等待上送通知。同一对端点同时只允许一个未决探测，
//! 避免把一次的到达时间记到另一次上。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::net::{DeviceId, RoutingTable};
use crate::plane::{ForwardingPlane, Output, ProbeFrame};

use super::MeasureError;

/// 探测会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStatus {
    Pending,
    Arrived,
    Lost,
}

/// 一次探测会话
#[derive(Debug)]
pub struct ProbeSession {
    pub sent_at: Option<Instant>,
    pub received_at: Option<Instant>,
    pub status: ProbeStatus,
    waiter: Option<oneshot::Sender<Instant>>,
}

/// 时延探测参数
#[derive(Debug, Clone, Copy)]
pub struct ProbeTiming {
    /// 下发临时规则后、发包前的等待
    pub arm: Duration,
    /// 等待上送的最长时间，超时即判定丢失
    pub timeout: Duration,
    /// 临时规则优先级
    pub priority: u16,
}

/// 一轮多次探测的结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DelaySamples {
    /// 有效样本（毫秒）
    pub samples: Vec<f64>,
    pub lost: usize,
}

impl DelaySamples {
    /// 有效样本的均值；全部丢失时为 None
    pub fn mean(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().sum::<f64>() / self.samples.len() as f64)
    }
}

pub struct DelayProber {
    plane: Arc<dyn ForwardingPlane>,
    timing: ProbeTiming,
    sessions: Mutex<HashMap<(DeviceId, DeviceId), ProbeSession>>,
}

impl DelayProber {
    pub fn new(plane: Arc<dyn ForwardingPlane>, timing: ProbeTiming) -> Self {
        Self {
            plane,
            timing,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// 最近一次 (src, dst) 探测的状态
    pub fn status(&self, src: DeviceId, dst: DeviceId) -> Option<ProbeStatus> {
        self.lock_sessions().get(&(src, dst)).map(|s| s.status)
    }

    /// 最近一次 (src, dst) 探测的到达时间；丢失或尚未到达时为 None
    pub fn received_at(&self, src: DeviceId, dst: DeviceId) -> Option<Instant> {
        self.lock_sessions().get(&(src, dst)).and_then(|s| s.received_at)
    }

    /// 发一次探测。`Ok(None)` 表示探测丢失（没有样本），不是错误。
    #[tracing::instrument(skip_all, fields(%src, %dst))]
    pub async fn probe(
        &self,
        table: &RoutingTable,
        src: DeviceId,
        dst: DeviceId,
    ) -> Result<Option<f64>, MeasureError> {
        let frame = ProbeFrame::new(src, dst).ok_or(MeasureError::Unencodable { src, dst })?;
        let hops = table
            .hop_ports(src, dst)
            .filter(|h| h.len() >= 2)
            .ok_or(MeasureError::NoPath { src, dst })?;

        let rx = self.open_session(src, dst)?;
        let flow = frame.flow_match();

        // 中间跳按路径端口转发，目的设备上送控制器
        for &(dev, port) in &hops[1..hops.len() - 1] {
            if let Err(e) = self.plane.install_rule(dev, self.timing.priority, &flow, Output::Port(port)) {
                warn!(device = %dev, error = %e, "探测规则下发失败");
            }
        }
        if let Err(e) = self.plane.install_rule(dst, self.timing.priority, &flow, Output::Controller) {
            warn!(device = %dst, error = %e, "探测上送规则下发失败");
        }

        tokio::time::sleep(self.timing.arm).await;

        let sent_at = Instant::now();
        self.mark_sent(src, dst, sent_at);
        let (_, first_port) = hops[0];
        let result = match self.plane.send_frame(src, first_port, frame.encode()) {
            Ok(()) => match tokio::time::timeout(self.timing.timeout, rx).await {
                Ok(Ok(received_at)) => Some(received_at.duration_since(sent_at)),
                _ => None,
            },
            Err(e) => {
                warn!(error = %e, "探测帧发送失败");
                None
            }
        };
        self.close_session(src, dst, result.is_some());

        for &(dev, _) in &hops {
            if let Err(e) = self.plane.delete_rules(dev, &flow) {
                debug!(device = %dev, error = %e, "探测规则删除失败");
            }
        }

        match result {
            Some(d) => {
                let ms = d.as_secs_f64() * 1000.0;
                trace!(delay_ms = ms, "探测到达");
                Ok(Some(ms))
            }
            None => {
                debug!("探测丢失");
                Ok(None)
            }
        }
    }

    /// 连续发 `count` 次探测，每次之后间隔 `spacing`
    pub async fn sample(
        &self,
        table: &RoutingTable,
        src: DeviceId,
        dst: DeviceId,
        count: u32,
        spacing: Duration,
    ) -> Result<DelaySamples, MeasureError> {
        let mut out = DelaySamples::default();
        for _ in 0..count {
            match self.probe(table, src, dst).await? {
                Some(ms) => out.samples.push(ms),
                None => out.lost += 1,
            }
            tokio::time::sleep(spacing).await;
        }
        Ok(out)
    }

    /// 帧上送处理，不阻塞
    pub fn on_frame(&self, device: DeviceId, data: &[u8]) {
        let received_at = Instant::now();
        let Some(frame) = ProbeFrame::decode(data) else {
            return;
        };
        if frame.dst != device {
            trace!(%device, dst = %frame.dst, "探测帧到达非目的设备，忽略");
            return;
        }
        let mut sessions = self.lock_sessions();
        let Some(session) = sessions.get_mut(&(frame.src, frame.dst)) else {
            return;
        };
        if session.status != ProbeStatus::Pending {
            return;
        }
        // 等待方已超时放弃时不再记到达时间，会话随后被标记为丢失
        let Some(waiter) = session.waiter.take() else {
            return;
        };
        if waiter.send(received_at).is_ok() {
            session.received_at = Some(received_at);
        }
    }

    pub(crate) fn open_session(
        &self,
        src: DeviceId,
        dst: DeviceId,
    ) -> Result<oneshot::Receiver<Instant>, MeasureError> {
        let mut sessions = self.lock_sessions();
        if sessions
            .get(&(src, dst))
            .is_some_and(|s| s.status == ProbeStatus::Pending)
        {
            return Err(MeasureError::Busy { src, dst });
        }
        let (tx, rx) = oneshot::channel();
        sessions.insert(
            (src, dst),
            ProbeSession {
                sent_at: None,
                received_at: None,
                status: ProbeStatus::Pending,
                waiter: Some(tx),
            },
        );
        Ok(rx)
    }

    fn mark_sent(&self, src: DeviceId, dst: DeviceId, at: Instant) {
        if let Some(s) = self.lock_sessions().get_mut(&(src, dst)) {
            s.sent_at = Some(at);
        }
    }

    fn close_session(&self, src: DeviceId, dst: DeviceId, arrived: bool) {
        if let Some(s) = self.lock_sessions().get_mut(&(src, dst)) {
            s.status = if arrived {
                ProbeStatus::Arrived
            } else {
                ProbeStatus::Lost
            };
            s.waiter = None;
        }
    }

    fn lock_sessions(&self) -> std::sync::MutexGuard<'_, HashMap<(DeviceId, DeviceId), ProbeSession>> {
        // 持锁期间不会 panic，中毒后数据仍然一致
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }
}
