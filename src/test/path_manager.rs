use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use super::{PlaneOp, RecordingPlane, chain4, d, star};
use crate::control::{PathManager, SteerError, SwitchOutcome};
use crate::net::PortNo;
use crate::plane::{FlowMatch, Output};

fn outbound() -> FlowMatch {
    FlowMatch::Ipv4 {
        src: Ipv4Addr::new(11, 0, 0, 1),
        dst: Ipv4Addr::new(11, 0, 0, 2),
    }
}

fn manager(plane: Arc<RecordingPlane>, candidates: &[u64]) -> PathManager {
    PathManager::new(
        plane,
        d(1),
        candidates.iter().map(|&c| d(c)),
        outbound(),
        65_000,
        Duration::from_millis(500),
    )
}

fn install(dev: u64, port: u32) -> PlaneOp {
    PlaneOp::Install {
        device: d(dev),
        priority: 65_000,
        flow: outbound(),
        out: Output::Port(PortNo(port)),
    }
}

fn delete(dev: u64) -> PlaneOp {
    PlaneOp::Delete {
        device: d(dev),
        flow: outbound(),
    }
}

#[test]
fn install_puts_a_rule_on_every_hop() {
    let plane = Arc::new(RecordingPlane::new());
    let pm = manager(plane.clone(), &[3, 4]);
    pm.install_steering_path(&chain4(), d(1), d(4)).expect("install");
    // 最后一跳走主机端口 1
    assert_eq!(
        plane.ops(),
        vec![install(1, 2), install(2, 2), install(3, 2), install(4, 1)]
    );
}

#[test]
fn withdraw_deletes_on_every_hop() {
    let plane = Arc::new(RecordingPlane::new());
    let pm = manager(plane.clone(), &[3, 4]);
    pm.withdraw_steering_path(&chain4(), d(1), d(3)).expect("withdraw");
    assert_eq!(plane.ops(), vec![delete(1), delete(2), delete(3)]);
}

#[test]
fn requests_outside_ingress_and_candidates_are_rejected() {
    let plane = Arc::new(RecordingPlane::new());
    let pm = manager(plane.clone(), &[3, 4]);
    let table = chain4();

    let err = pm.install_steering_path(&table, d(2), d(4)).expect_err("wrong src");
    assert!(matches!(err, SteerError::InvalidRequest { .. }));
    let err = pm.install_steering_path(&table, d(1), d(2)).expect_err("not a candidate");
    assert!(matches!(err, SteerError::InvalidRequest { .. }));
    let err = pm.withdraw_steering_path(&table, d(3), d(1)).expect_err("reversed");
    assert!(matches!(err, SteerError::InvalidRequest { .. }));
    assert!(plane.ops().is_empty());
}

#[test]
fn unreachable_candidate_has_no_path() {
    let plane = Arc::new(RecordingPlane::new());
    let pm = manager(plane.clone(), &[4, 9]);
    let err = pm.install_steering_path(&chain4(), d(1), d(9)).expect_err("no path");
    assert!(matches!(err, SteerError::NoPath { .. }));
}

#[test]
fn plane_failures_are_counted_but_other_hops_proceed() {
    let plane = Arc::new(RecordingPlane::rejecting(&[d(2)]));
    let pm = manager(plane.clone(), &[4]);
    let err = pm.install_steering_path(&chain4(), d(1), d(4)).expect_err("one hop fails");
    match err {
        SteerError::Plane { failed, total, .. } => {
            assert_eq!(failed, 1);
            assert_eq!(total, 4);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(plane.ops(), vec![install(1, 2), install(3, 2), install(4, 1)]);
}

#[tokio::test(start_paused = true)]
async fn switch_withdraws_old_path_before_installing_new_one() {
    let plane = Arc::new(RecordingPlane::new());
    let mut pm = manager(plane.clone(), &[2, 3, 4]);
    let table = star();

    let first = pm.switch_egress(&table, d(2)).await.expect("first switch");
    assert_eq!(first, SwitchOutcome::Switched { from: None });
    assert_eq!(pm.current_egress(), Some(d(2)));
    plane.clear();

    let started = tokio::time::Instant::now();
    let second = pm.switch_egress(&table, d(3)).await.expect("second switch");
    assert_eq!(second, SwitchOutcome::Switched { from: Some(d(2)) });
    assert!(started.elapsed() >= Duration::from_millis(500));
    assert_eq!(
        plane.ops(),
        vec![delete(1), delete(2), install(1, 3), install(3, 1)]
    );
    assert_eq!(pm.current_egress(), Some(d(3)));
}

#[tokio::test(start_paused = true)]
async fn switching_to_the_current_egress_is_a_no_op() {
    let plane = Arc::new(RecordingPlane::new());
    let mut pm = manager(plane.clone(), &[2, 3, 4]);
    let table = star();

    pm.switch_egress(&table, d(4)).await.expect("switch");
    plane.clear();
    let started = tokio::time::Instant::now();
    let again = pm.switch_egress(&table, d(4)).await.expect("switch again");
    assert_eq!(again, SwitchOutcome::Unchanged);
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert!(plane.ops().is_empty());
}

#[tokio::test(start_paused = true)]
async fn switch_to_a_non_candidate_keeps_current_egress() {
    let plane = Arc::new(RecordingPlane::new());
    let mut pm = manager(plane.clone(), &[2, 3]);
    let table = star();

    pm.switch_egress(&table, d(2)).await.expect("switch");
    plane.clear();
    let err = pm.switch_egress(&table, d(4)).await.expect_err("invalid");
    assert!(matches!(err, SteerError::InvalidRequest { .. }));
    assert_eq!(pm.current_egress(), Some(d(2)));
    assert!(plane.ops().is_empty());
}
