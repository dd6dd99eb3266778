//! 进程内仿真转发面
//!
//! 每台设备一张按优先级查找的流表；帧沿链路逐跳转发，累计链路时延，并按链路丢包率随机丢弃，
//! 命中“上送控制器”规则时在累计时延之后发出 `FrameArrived` 通知。
//! 业务流计数是合成的：源设备发送数随时间线性增长，目的设备接收数按路径丢包率折减。

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Mutex;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::topo::EmuTopology;
use crate::net::{DeviceId, PortNo, TopoEvent};
use crate::plane::{
    CounterReply, FlowMatch, ForwardingPlane, Notification, Output, PROBE_ETH_TYPE, PlaneError,
    eth_header,
};

const MAX_HOPS: usize = 64;
const COUNTER_REPLY_DELAY: Duration = Duration::from_millis(1);
/// 合成业务流速率（包/秒）
const DEFAULT_RATE_PPS: f64 = 1_000.0;

#[derive(Debug, Clone, Copy)]
struct FlowRule {
    priority: u16,
    flow: FlowMatch,
    out: Output,
}

#[derive(Debug, Clone, Copy)]
struct EmuLink {
    a: (DeviceId, PortNo),
    b: (DeviceId, PortNo),
    latency: Duration,
    loss: f64,
    up: bool,
}

struct EmuState {
    tables: HashMap<DeviceId, Vec<FlowRule>>,
    /// (设备, 端口) -> 链路下标
    ports: HashMap<(DeviceId, PortNo), usize>,
    links: Vec<EmuLink>,
    host_subnet: Ipv4Addr,
    started: Instant,
    rate_pps: f64,
    rng: StdRng,
}

pub struct EmuPlane {
    state: Mutex<EmuState>,
    events: mpsc::UnboundedSender<Notification>,
}

impl EmuPlane {
    /// 按拓扑建好设备与链路；通知经 `events` 送出
    pub fn new(
        topo: &EmuTopology,
        host_subnet: Ipv4Addr,
        seed: u64,
        events: mpsc::UnboundedSender<Notification>,
    ) -> Self {
        let tables = topo.devices.iter().map(|&d| (d, Vec::new())).collect();
        let mut next_port: HashMap<DeviceId, u32> = HashMap::new();
        let mut alloc = |d: DeviceId| {
            let p = next_port.entry(d).or_insert(2);
            let port = PortNo(*p);
            *p += 1;
            port
        };

        let mut ports = HashMap::new();
        let mut links = Vec::with_capacity(topo.links.len());
        for spec in &topo.links {
            let pa = alloc(spec.a);
            let pb = alloc(spec.b);
            ports.insert((spec.a, pa), links.len());
            ports.insert((spec.b, pb), links.len());
            links.push(EmuLink {
                a: (spec.a, pa),
                b: (spec.b, pb),
                latency: spec.latency,
                loss: spec.loss,
                up: true,
            });
        }

        Self {
            state: Mutex::new(EmuState {
                tables,
                ports,
                links,
                host_subnet,
                started: Instant::now(),
                rate_pps: DEFAULT_RATE_PPS,
                rng: StdRng::seed_from_u64(seed),
            }),
            events,
        }
    }

    /// 发出所有设备接入与链路建立通知（相当于拓扑发现完成）
    pub fn announce(&self) -> Result<(), PlaneError> {
        let st = self.lock();
        let mut devices: Vec<_> = st.tables.keys().copied().collect();
        devices.sort();
        for d in devices {
            self.notify(Notification::Topo(TopoEvent::DeviceUp(d)))?;
        }
        for l in st.links.iter().filter(|l| l.up) {
            self.notify(Notification::Topo(TopoEvent::LinkUp {
                a: l.a.0,
                port_a: l.a.1,
                b: l.b.0,
                port_b: l.b.1,
            }))?;
        }
        Ok(())
    }

    /// 断开 a-b 之间的链路并发出通知
    pub fn fail_link(&self, a: DeviceId, b: DeviceId) -> Result<(), PlaneError> {
        {
            let mut st = self.lock();
            for l in st.links.iter_mut() {
                if (l.a.0 == a && l.b.0 == b) || (l.a.0 == b && l.b.0 == a) {
                    l.up = false;
                }
            }
        }
        self.notify(Notification::Topo(TopoEvent::LinkDown { a, b }))
    }

    /// 设备上当前的规则（按下发顺序）
    pub fn rules(&self, device: DeviceId) -> Vec<(u16, FlowMatch, Output)> {
        self.lock()
            .tables
            .get(&device)
            .map(|t| t.iter().map(|r| (r.priority, r.flow, r.out)).collect())
            .unwrap_or_default()
    }

    fn notify(&self, n: Notification) -> Result<(), PlaneError> {
        self.events.send(n).map_err(|_| PlaneError::Closed)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, EmuState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl EmuState {
    fn lookup(&self, device: DeviceId, flow: &FlowMatch) -> Option<Output> {
        self.tables
            .get(&device)?
            .iter()
            .filter(|r| r.flow == *flow)
            .max_by_key(|r| r.priority)
            .map(|r| r.out)
    }

    /// 从 (device, port) 出去的下一跳
    fn peer(&self, device: DeviceId, port: PortNo) -> Option<(DeviceId, EmuLink)> {
        let link = *self.links.get(*self.ports.get(&(device, port))?)?;
        if !link.up {
            return None;
        }
        let peer = if link.a == (device, port) { link.b.0 } else { link.a.0 };
        Some((peer, link))
    }

    fn host_device(&self, addr: Ipv4Addr) -> DeviceId {
        DeviceId(u64::from(u32::from(addr).wrapping_sub(u32::from(self.host_subnet))))
    }

    /// 按 src 起的流表逐跳转发业务流，返回到达 dst 主机端口的比例；转发不通时为 0
    fn delivered_fraction(&self, src: DeviceId, dst: DeviceId, flow: &FlowMatch) -> f64 {
        let mut at = src;
        let mut frac = 1.0;
        for _ in 0..MAX_HOPS {
            let Some(Output::Port(port)) = self.lookup(at, flow) else {
                return 0.0;
            };
            if port == PortNo::HOST {
                return if at == dst { frac } else { 0.0 };
            }
            let Some((peer, link)) = self.peer(at, port) else {
                return 0.0;
            };
            frac *= 1.0 - link.loss;
            at = peer;
        }
        0.0
    }
}

impl ForwardingPlane for EmuPlane {
    fn install_rule(
        &self,
        device: DeviceId,
        priority: u16,
        flow: &FlowMatch,
        out: Output,
    ) -> Result<(), PlaneError> {
        let mut st = self.lock();
        let table = st
            .tables
            .get_mut(&device)
            .ok_or(PlaneError::UnknownDevice(device))?;
        // 相同 match + 优先级的规则被覆盖
        table.retain(|r| !(r.flow == *flow && r.priority == priority));
        table.push(FlowRule {
            priority,
            flow: *flow,
            out,
        });
        trace!(%device, priority, ?flow, ?out, "规则下发");
        Ok(())
    }

    fn delete_rules(&self, device: DeviceId, flow: &FlowMatch) -> Result<(), PlaneError> {
        let mut st = self.lock();
        let table = st
            .tables
            .get_mut(&device)
            .ok_or(PlaneError::UnknownDevice(device))?;
        table.retain(|r| r.flow != *flow);
        trace!(%device, ?flow, "规则删除");
        Ok(())
    }

    fn send_frame(&self, device: DeviceId, port: PortNo, data: Vec<u8>) -> Result<(), PlaneError> {
        let mut st = self.lock();
        if !st.tables.contains_key(&device) {
            return Err(PlaneError::UnknownDevice(device));
        }
        if !st.ports.contains_key(&(device, port)) {
            return Err(PlaneError::UnknownPort { device, port });
        }
        let Some((eth_src, eth_dst, ethertype)) = eth_header(&data) else {
            return Ok(());
        };
        if ethertype != PROBE_ETH_TYPE {
            return Ok(());
        }
        let flow = FlowMatch::Probe { eth_src, eth_dst };

        let mut at = device;
        let mut out = port;
        let mut elapsed = Duration::ZERO;
        let mut delivered_to = None;
        for _ in 0..MAX_HOPS {
            let Some((peer, link)) = st.peer(at, out) else {
                break;
            };
            elapsed += link.latency;
            if st.rng.r#gen::<f64>() < link.loss {
                debug!(from = %at, to = %peer, "仿真链路丢弃探测帧");
                break;
            }
            at = peer;
            match st.lookup(at, &flow) {
                Some(Output::Controller) => {
                    delivered_to = Some(at);
                    break;
                }
                Some(Output::Port(p)) => out = p,
                None => break,
            }
        }
        drop(st);

        if let Some(dev) = delivered_to {
            let events = self.events.clone();
            tokio::spawn(async move {
                tokio::time::sleep(elapsed).await;
                let _ = events.send(Notification::FrameArrived { device: dev, data });
            });
        }
        Ok(())
    }

    fn request_counters(&self, device: DeviceId, flow: &FlowMatch) -> Result<(), PlaneError> {
        let st = self.lock();
        if !st.tables.contains_key(&device) {
            return Err(PlaneError::UnknownDevice(device));
        }
        let packet_count = match *flow {
            FlowMatch::Ipv4 { src, dst } => {
                let (s, d) = (st.host_device(src), st.host_device(dst));
                let tx = (st.rate_pps * st.started.elapsed().as_secs_f64()) as u64;
                if device == s {
                    tx
                } else if device == d {
                    (tx as f64 * st.delivered_fraction(s, d, flow)) as u64
                } else {
                    0
                }
            }
            _ => 0,
        };
        drop(st);

        let events = self.events.clone();
        let reply = CounterReply {
            device,
            flow: *flow,
            packet_count,
        };
        tokio::spawn(async move {
            tokio::time::sleep(COUNTER_REPLY_DELAY).await;
            let _ = events.send(Notification::Counters(reply));
        });
        Ok(())
    }
}
