//! 流表匹配与输出动作

use std::fmt;
use std::net::Ipv4Addr;

use crate::net::{DeviceId, PortNo};

/// 以太网地址
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddr(pub [u8; 6]);

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// 规则的匹配条件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowMatch {
    /// eth_type=0x0800, ipv4_src, ipv4_dst
    Ipv4 { src: Ipv4Addr, dst: Ipv4Addr },
    /// eth_type=0x0806, arp_spa, arp_tpa
    Arp { spa: Ipv4Addr, tpa: Ipv4Addr },
    /// 探测帧：eth_type=0x7777, eth_src, eth_dst
    Probe { eth_src: MacAddr, eth_dst: MacAddr },
}

impl FlowMatch {
    /// 两台设备下挂主机之间的 IPv4 业务流
    pub fn host_ipv4(subnet: Ipv4Addr, src: DeviceId, dst: DeviceId) -> Self {
        FlowMatch::Ipv4 {
            src: host_addr(subnet, src),
            dst: host_addr(subnet, dst),
        }
    }

    /// 两台设备下挂主机之间的 ARP
    pub fn host_arp(subnet: Ipv4Addr, src: DeviceId, dst: DeviceId) -> Self {
        FlowMatch::Arp {
            spa: host_addr(subnet, src),
            tpa: host_addr(subnet, dst),
        }
    }
}

/// 规则的输出动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Output {
    Port(PortNo),
    /// 上送控制器
    Controller,
}

/// 设备 `dev` 下挂主机的地址：`subnet + dev`（例如 10.0.0.0 + 4 = 10.0.0.4）
pub fn host_addr(subnet: Ipv4Addr, dev: DeviceId) -> Ipv4Addr {
    Ipv4Addr::from(u32::from(subnet).wrapping_add(dev.0 as u32))
}
