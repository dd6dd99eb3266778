//! 规则计数快照与丢包率
//!
//! 向源设备请求发送计数、向目的设备请求接收计数，应答异步到达后按 (src, dst)
//! 写入快照表；请求方带超时等待两侧都被刷新，再把两侧作为一致的一对读出。
//! 同一对端点同时只允许一个未决查询，避免把应答记错对象。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, trace, warn};

use crate::net::DeviceId;
use crate::plane::{CounterReply, FlowMatch, ForwardingPlane};

use super::MeasureError;

/// 一对端点的计数（源设备发送数、目的设备接收数）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CounterSnapshot {
    pub tx: u64,
    pub rx: u64,
}

#[derive(Debug, Default)]
struct PairCounters {
    tx: Option<u64>,
    rx: Option<u64>,
    tx_fresh: bool,
    rx_fresh: bool,
}

#[derive(Debug, Default)]
struct Tables {
    /// 未决查询：匹配条件 -> (src, dst)
    pending: HashMap<FlowMatch, (DeviceId, DeviceId)>,
    snapshots: HashMap<(DeviceId, DeviceId), PairCounters>,
    /// 已超时查询仍欠的应答数：(匹配条件, 设备) -> 个数。
    /// 设备按请求顺序应答，这些迟到的应答先于新查询的应答到达，逐个丢弃。
    stale: HashMap<(FlowMatch, DeviceId), u32>,
}

pub struct CounterStore {
    plane: Arc<dyn ForwardingPlane>,
    timeout: Duration,
    tables: Mutex<Tables>,
    updated: Notify,
}

/// 丢包率：`max(0, 1 - Δrx / Δtx)`；Δtx <= 0（没有发送）时定义为 0
pub fn loss_ratio(tx1: u64, rx1: u64, tx2: u64, rx2: u64) -> f64 {
    let tx_diff = tx2 as i128 - tx1 as i128;
    if tx_diff <= 0 {
        return 0.0;
    }
    let rx_diff = rx2 as i128 - rx1 as i128;
    (1.0 - rx_diff as f64 / tx_diff as f64).max(0.0)
}

impl CounterStore {
    pub fn new(plane: Arc<dyn ForwardingPlane>, timeout: Duration) -> Self {
        Self {
            plane,
            timeout,
            tables: Mutex::new(Tables::default()),
            updated: Notify::new(),
        }
    }

    /// 请求 (src, dst) 的计数并等待两侧应答。超时返回 `MeasureError::Timeout`（视为无数据）。
    #[tracing::instrument(skip_all, fields(%src, %dst))]
    pub async fn snapshot(
        &self,
        src: DeviceId,
        dst: DeviceId,
        flow: FlowMatch,
    ) -> Result<CounterSnapshot, MeasureError> {
        {
            let mut t = self.lock_tables();
            if t.pending.values().any(|&p| p == (src, dst)) || t.pending.contains_key(&flow) {
                return Err(MeasureError::Busy { src, dst });
            }
            t.pending.insert(flow, (src, dst));
            let entry = t.snapshots.entry((src, dst)).or_default();
            entry.tx_fresh = false;
            entry.rx_fresh = false;
        }

        let mut sent = Vec::with_capacity(2);
        let mut requested = Ok(());
        for dev in [src, dst] {
            if let Err(e) = self.plane.request_counters(dev, &flow) {
                requested = Err(e);
                break;
            }
            sent.push(dev);
        }
        let result = match requested {
            Ok(()) => tokio::time::timeout(self.timeout, self.wait_both(src, dst))
                .await
                .map_err(|_| MeasureError::Timeout { src, dst }),
            Err(e) => Err(MeasureError::Plane(e)),
        };

        self.finish_query(src, dst, flow, &sent);
        match &result {
            Ok(s) => debug!(tx = s.tx, rx = s.rx, "计数快照"),
            Err(e) => warn!(error = %e, "计数快照失败"),
        }
        result
    }

    /// 结束查询：已发出但还没收到应答的一侧记为欠账
    fn finish_query(&self, src: DeviceId, dst: DeviceId, flow: FlowMatch, sent: &[DeviceId]) {
        let mut t = self.lock_tables();
        t.pending.remove(&flow);
        let (tx_fresh, rx_fresh) = t
            .snapshots
            .get(&(src, dst))
            .map(|p| (p.tx_fresh, p.rx_fresh))
            .unwrap_or_default();
        for &dev in sent {
            let answered = if dev == src { tx_fresh } else { rx_fresh };
            if !answered {
                *t.stale.entry((flow, dev)).or_insert(0) += 1;
                debug!(device = %dev, "等待迟到的计数应答");
            }
        }
    }

    async fn wait_both(&self, src: DeviceId, dst: DeviceId) -> CounterSnapshot {
        loop {
            let notified = self.updated.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let t = self.lock_tables();
                if let Some(p) = t.snapshots.get(&(src, dst)) {
                    if let (true, true, Some(tx), Some(rx)) = (p.tx_fresh, p.rx_fresh, p.tx, p.rx) {
                        return CounterSnapshot { tx, rx };
                    }
                }
            }
            notified.await;
        }
    }

    /// 计数应答处理，不阻塞。超时查询的迟到应答以及没有对应未决查询的应答被丢弃。
    pub fn on_reply(&self, reply: CounterReply) {
        let mut t = self.lock_tables();
        let key = (reply.flow, reply.device);
        if let Some(owed) = t.stale.get_mut(&key) {
            *owed -= 1;
            if *owed == 0 {
                t.stale.remove(&key);
            }
            trace!(device = %reply.device, "丢弃超时查询的迟到应答");
            return;
        }
        let Some(&(src, dst)) = t.pending.get(&reply.flow) else {
            trace!(device = %reply.device, "无主的计数应答");
            return;
        };
        let entry = t.snapshots.entry((src, dst)).or_default();
        if reply.device == src {
            entry.tx = Some(reply.packet_count);
            entry.tx_fresh = true;
        }
        if reply.device == dst {
            entry.rx = Some(reply.packet_count);
            entry.rx_fresh = true;
        }
        drop(t);
        self.updated.notify_waiters();
    }

    /// 最近一次记录的 (src, dst) 计数
    pub fn last(&self, src: DeviceId, dst: DeviceId) -> Option<CounterSnapshot> {
        let t = self.lock_tables();
        let p = t.snapshots.get(&(src, dst))?;
        Some(CounterSnapshot {
            tx: p.tx?,
            rx: p.rx?,
        })
    }

    fn lock_tables(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }
}
