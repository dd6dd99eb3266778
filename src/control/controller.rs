//! 控制器装配
//!
//! 三条相互独立的调度并发运行：
//! - 通知分发任务：唯一持有拓扑存储，把拓扑事件、探测帧上送、计数应答分发给各自的表；
//! - 路由刷新任务：定期基于最新拓扑快照重算路由表并整体替换；
//! - 控制循环。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{ControllerConfig, ms};
use crate::net::{RoutingTable, TopologySnapshot, TopologyStore};
use crate::plane::{FlowMatch, ForwardingPlane, Notification};
use crate::probe::{CounterStore, DelayProber, MeasurementEngine};

use super::base::BaseRouting;
use super::control_loop::{ControlLoop, LoopSettings, RunSummary};
use super::path::PathManager;
use super::results::ResultLog;

/// 启动通知分发任务。通道关闭时任务结束。
pub fn spawn_dispatcher(
    mut events: mpsc::UnboundedReceiver<Notification>,
    topo_tx: watch::Sender<Arc<TopologySnapshot>>,
    prober: Arc<DelayProber>,
    counters: Arc<CounterStore>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut store = TopologyStore::new();
        while let Some(ev) = events.recv().await {
            match ev {
                Notification::Topo(t) => {
                    store.apply(t);
                    topo_tx.send_replace(Arc::new(store.snapshot()));
                }
                Notification::FrameArrived { device, data } => prober.on_frame(device, &data),
                Notification::Counters(reply) => counters.on_reply(reply),
            }
        }
        debug!("通知通道关闭，分发任务退出");
    })
}

/// 启动路由刷新任务：先等待 `initial_delay`，之后每隔 `period` 重算一次。
///
/// 第一次得到非空路由表时，如果给了 `base`，预装所有设备对之间的基础路由。
pub fn spawn_route_refresher(
    topo_rx: watch::Receiver<Arc<TopologySnapshot>>,
    routes_tx: watch::Sender<Arc<RoutingTable>>,
    mut base: Option<BaseRouting>,
    initial_delay: Duration,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(initial_delay).await;
        loop {
            let snapshot = topo_rx.borrow().clone();
            let started = Instant::now();
            let table = Arc::new(RoutingTable::compute(snapshot));
            info!(
                devices = table.topology().device_count(),
                entries = table.len(),
                elapsed_us = started.elapsed().as_micros() as u64,
                "路由表已更新"
            );
            routes_tx.send_replace(Arc::clone(&table));

            if table.topology().device_count() > 1 {
                if let Some(b) = base.take() {
                    b.install_all(&table);
                }
            }
            tokio::time::sleep(period).await;
        }
    })
}

/// 把配置、转发面与控制循环装配在一起
pub struct Controller {
    cfg: ControllerConfig,
    plane: Arc<dyn ForwardingPlane>,
}

impl Controller {
    pub fn new(cfg: ControllerConfig, plane: Arc<dyn ForwardingPlane>) -> Self {
        Self { cfg, plane }
    }

    /// 运行到控制循环结束，随后停止后台任务。
    pub async fn run(self, events: mpsc::UnboundedReceiver<Notification>) -> RunSummary {
        let cfg = self.cfg;
        let plane = self.plane;

        let prober = Arc::new(DelayProber::new(Arc::clone(&plane), cfg.probe_timing()));
        let counters = Arc::new(CounterStore::new(Arc::clone(&plane), ms(cfg.stats_timeout_ms)));

        let (topo_tx, topo_rx) = watch::channel(Arc::new(TopologySnapshot::default()));
        let (routes_tx, routes_rx) = watch::channel(Arc::new(RoutingTable::default()));

        let dispatcher = spawn_dispatcher(events, topo_tx, Arc::clone(&prober), Arc::clone(&counters));
        let base = cfg.install_base_routes.then(|| {
            BaseRouting::new(Arc::clone(&plane), cfg.host_subnet, cfg.base_route_priority)
        });
        let refresher = spawn_route_refresher(
            topo_rx,
            routes_tx,
            base,
            ms(cfg.topology_initial_delay_ms),
            ms(cfg.topology_refresh_ms),
        );

        let results = cfg.results_path.as_deref().and_then(|p| match ResultLog::open(p) {
            Ok(log) => Some(log),
            Err(e) => {
                warn!(error = %e, "结果日志不可用，继续运行");
                None
            }
        });

        let outbound = FlowMatch::Ipv4 {
            src: cfg.outbound_src,
            dst: cfg.outbound_dst,
        };
        let paths = PathManager::new(
            Arc::clone(&plane),
            cfg.ingress,
            cfg.egress_candidates.iter().copied(),
            outbound,
            cfg.steering_priority,
            ms(cfg.switch_settle_ms),
        );
        let engine = MeasurementEngine::new(prober, counters, cfg.host_subnet);
        let settings = LoopSettings {
            ingress: cfg.ingress,
            rounds: cfg.rounds,
            timesteps_per_round: cfg.timesteps_per_round,
            cold_start: cfg.cold_start_plan(),
            timestep: cfg.timestep_plan(),
            settle: ms(cfg.settle_ms),
        };
        let policy = cfg.policy.build(cfg.seed);
        info!(policy = %cfg.policy, seed = cfg.seed, "选臂策略");

        let control = ControlLoop::new(
            settings,
            &cfg.egress_candidates,
            policy,
            paths,
            engine,
            cfg.reward,
            routes_rx,
            results,
        );

        tokio::time::sleep(ms(cfg.loop_start_delay_ms)).await;
        let summary = control.run().await;

        refresher.abort();
        dispatcher.abort();
        summary
    }
}
