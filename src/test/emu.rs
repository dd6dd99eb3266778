use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::d;
use crate::emu::{EmuLinkSpec, EmuPlane, EmuTopology};
use crate::net::{PortNo, RoutingTable, TopoEvent, TopologyStore};
use crate::plane::{FlowMatch, ForwardingPlane, Notification, Output, ProbeFrame};
use crate::probe::{DelayProber, ProbeTiming};

const SUBNET: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 0);

/// 1 - 2 - 3 的无损链路，每段 4ms
fn line3() -> EmuTopology {
    let link = |a, b| EmuLinkSpec {
        a: d(a),
        b: d(b),
        latency: Duration::from_millis(4),
        loss: 0.0,
    };
    EmuTopology {
        devices: vec![d(1), d(2), d(3)],
        links: vec![link(1, 2), link(2, 3)],
    }
}

/// 收下 announce 产生的全部拓扑事件，建路由表
fn discover(events: &mut mpsc::UnboundedReceiver<Notification>) -> RoutingTable {
    let mut store = TopologyStore::new();
    while let Ok(n) = events.try_recv() {
        if let Notification::Topo(ev) = n {
            store.apply(ev);
        }
    }
    RoutingTable::compute(Arc::new(store.snapshot()))
}

#[test]
fn builtin_topologies_have_expected_sizes() {
    let bso = EmuTopology::bso();
    assert_eq!(bso.devices.len(), 14);
    assert_eq!(bso.links.len(), 18);
    let funet = EmuTopology::funet();
    assert_eq!(funet.devices.len(), 24);
    assert_eq!(funet.links.len(), 27);
    assert!(EmuTopology::by_name("bso").is_some());
    assert!(EmuTopology::by_name("nope").is_none());
}

#[tokio::test]
async fn announce_reports_devices_then_links() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let plane = EmuPlane::new(&line3(), SUBNET, 1, tx);
    plane.announce().expect("announce");

    let mut events = Vec::new();
    while let Ok(Notification::Topo(ev)) = rx.try_recv() {
        events.push(ev);
    }
    assert_eq!(
        events,
        vec![
            TopoEvent::DeviceUp(d(1)),
            TopoEvent::DeviceUp(d(2)),
            TopoEvent::DeviceUp(d(3)),
            TopoEvent::LinkUp {
                a: d(1),
                port_a: PortNo(2),
                b: d(2),
                port_b: PortNo(2),
            },
            TopoEvent::LinkUp {
                a: d(2),
                port_a: PortNo(3),
                b: d(3),
                port_b: PortNo(2),
            },
        ]
    );
}

#[tokio::test]
async fn install_replaces_same_match_and_priority() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let plane = EmuPlane::new(&line3(), SUBNET, 1, tx);
    let flow = FlowMatch::host_ipv4(SUBNET, d(1), d(3));

    plane.install_rule(d(2), 10, &flow, Output::Port(PortNo(2))).expect("install");
    plane.install_rule(d(2), 10, &flow, Output::Port(PortNo(3))).expect("install");
    plane.install_rule(d(2), 20, &flow, Output::Controller).expect("install");
    assert_eq!(
        plane.rules(d(2)),
        vec![
            (10, flow, Output::Port(PortNo(3))),
            (20, flow, Output::Controller)
        ]
    );

    plane.delete_rules(d(2), &flow).expect("delete");
    assert!(plane.rules(d(2)).is_empty());
    assert!(matches!(
        plane.install_rule(d(9), 10, &flow, Output::Controller),
        Err(crate::plane::PlaneError::UnknownDevice(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn probe_crosses_emulated_links() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let plane = Arc::new(EmuPlane::new(&line3(), SUBNET, 1, tx));
    plane.announce().expect("announce");
    let table = discover(&mut rx);

    let prober = Arc::new(DelayProber::new(
        plane.clone(),
        ProbeTiming {
            arm: Duration::from_millis(5),
            timeout: Duration::from_millis(100),
            priority: 1,
        },
    ));
    let pump = {
        let prober = Arc::clone(&prober);
        tokio::spawn(async move {
            while let Some(n) = rx.recv().await {
                if let Notification::FrameArrived { device, data } = n {
                    prober.on_frame(device, &data);
                }
            }
        })
    };

    let delay = prober
        .probe(&table, d(1), d(3))
        .await
        .expect("probe")
        .expect("arrived");
    assert!((delay - 8.0).abs() < 1e-6, "delay = {delay}");
    // 临时规则已经撤掉
    let flow = ProbeFrame::new(d(1), d(3)).expect("encodable").flow_match();
    for dev in 1..=3 {
        assert!(plane.rules(d(dev)).iter().all(|(_, f, _)| *f != flow));
    }
    pump.abort();
}

#[tokio::test(start_paused = true)]
async fn counters_follow_installed_forwarding() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let plane = EmuPlane::new(&line3(), SUBNET, 1, tx);
    let flow = FlowMatch::host_ipv4(SUBNET, d(1), d(3));

    tokio::time::sleep(Duration::from_secs(2)).await;
    // 没有转发规则时目的侧收不到
    plane.request_counters(d(1), &flow).expect("query");
    plane.request_counters(d(3), &flow).expect("query");
    let counts = replies(&mut rx, 2).await;
    assert_eq!(counts, vec![(d(1), 2000), (d(3), 0)]);

    plane.install_rule(d(1), 1, &flow, Output::Port(PortNo(2))).expect("install");
    plane.install_rule(d(2), 1, &flow, Output::Port(PortNo(3))).expect("install");
    plane.install_rule(d(3), 1, &flow, Output::Port(PortNo::HOST)).expect("install");
    plane.request_counters(d(1), &flow).expect("query");
    plane.request_counters(d(3), &flow).expect("query");
    let counts = replies(&mut rx, 2).await;
    assert!(counts[0].1 > 2000);
    assert_eq!(counts[0].1, counts[1].1);
}

/// 收 `n` 个计数应答，按设备排序
async fn replies(
    rx: &mut mpsc::UnboundedReceiver<Notification>,
    n: usize,
) -> Vec<(crate::net::DeviceId, u64)> {
    let mut counts = Vec::new();
    while counts.len() < n {
        if let Some(Notification::Counters(reply)) = rx.recv().await {
            counts.push((reply.device, reply.packet_count));
        }
    }
    counts.sort();
    counts
}

#[tokio::test]
async fn failed_link_is_announced_and_stops_forwarding() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let plane = EmuPlane::new(&line3(), SUBNET, 1, tx);
    plane.fail_link(d(3), d(2)).expect("fail link");
    assert_eq!(
        rx.try_recv().expect("notification"),
        Notification::Topo(TopoEvent::LinkDown { a: d(3), b: d(2) })
    );

    // announce 不再报告断开的链路
    plane.announce().expect("announce");
    let table = discover(&mut rx);
    assert!(table.path(d(1), d(3)).is_none());
    assert!(table.path(d(1), d(2)).is_some());
}
