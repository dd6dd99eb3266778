use super::d;
use crate::plane::{FlowMatch, PROBE_ETH_TYPE, ProbeFrame, eth_header, host_addr, probe_mac};
use std::net::Ipv4Addr;

#[test]
fn probe_frame_round_trips_endpoints() {
    let frame = ProbeFrame::new(d(1), d(14)).expect("encodable");
    let raw = frame.encode();
    assert_eq!(raw.len(), 34);
    assert_eq!(ProbeFrame::decode(&raw), Some(frame));
}

#[test]
fn probe_frame_header_matches_its_flow_match() {
    let frame = ProbeFrame::new(d(3), d(300)).expect("encodable");
    let raw = frame.encode();
    let (src, dst, ethertype) = eth_header(&raw).expect("header");
    assert_eq!(ethertype, PROBE_ETH_TYPE);
    assert_eq!(
        frame.flow_match(),
        FlowMatch::Probe {
            eth_src: src,
            eth_dst: dst
        }
    );
    assert_eq!(src.to_string(), "ff:ff:00:00:00:03");
    assert_eq!(dst.to_string(), "ff:ff:00:00:01:2c");
}

#[test]
fn non_probe_frames_are_ignored() {
    let mut raw = ProbeFrame::new(d(1), d(2)).expect("encodable").encode();
    raw[12] = 0x08;
    raw[13] = 0x00;
    assert_eq!(ProbeFrame::decode(&raw), None);
    assert_eq!(ProbeFrame::decode(&raw[..10]), None);
}

#[test]
fn oversized_device_ids_are_rejected() {
    assert!(probe_mac(d(u64::from(u32::MAX))).is_some());
    assert!(probe_mac(d(u64::from(u32::MAX) + 1)).is_none());
    assert!(ProbeFrame::new(d(1), d(1 << 40)).is_none());
}

#[test]
fn host_addresses_follow_the_subnet() {
    let subnet = Ipv4Addr::new(10, 0, 0, 0);
    assert_eq!(host_addr(subnet, d(4)), Ipv4Addr::new(10, 0, 0, 4));
    assert_eq!(
        FlowMatch::host_ipv4(subnet, d(1), d(12)),
        FlowMatch::Ipv4 {
            src: Ipv4Addr::new(10, 0, 0, 1),
            dst: Ipv4Addr::new(10, 0, 0, 12)
        }
    );
}
