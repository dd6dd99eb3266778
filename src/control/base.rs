//! 基础路由：为所有设备对预装 IPv4 与 ARP 转发规则，
//! 承载被监测的业务流（其计数用于丢包测量）。

use std::net::Ipv4Addr;
use std::sync::Arc;

use tracing::{info, warn};

use crate::net::RoutingTable;
use crate::plane::{FlowMatch, ForwardingPlane, Output};

pub struct BaseRouting {
    plane: Arc<dyn ForwardingPlane>,
    host_subnet: Ipv4Addr,
    priority: u16,
}

impl BaseRouting {
    pub fn new(plane: Arc<dyn ForwardingPlane>, host_subnet: Ipv4Addr, priority: u16) -> Self {
        Self {
            plane,
            host_subnet,
            priority,
        }
    }

    /// 为路由表中每个有路径的有序设备对 (src != dst) 下发规则，返回成功下发的规则数
    pub fn install_all(&self, table: &RoutingTable) -> usize {
        let mut pairs: Vec<_> = table
            .iter()
            .map(|(&pair, _)| pair)
            .filter(|(src, dst)| src != dst)
            .collect();
        pairs.sort();

        let mut installed = 0;
        for (src, dst) in pairs {
            let Some(hops) = table.hop_ports(src, dst) else {
                continue;
            };
            let matches = [
                FlowMatch::host_ipv4(self.host_subnet, src, dst),
                FlowMatch::host_arp(self.host_subnet, src, dst),
            ];
            for (dev, port) in hops {
                for flow in &matches {
                    match self.plane.install_rule(dev, self.priority, flow, Output::Port(port)) {
                        Ok(()) => installed += 1,
                        Err(e) => warn!(device = %dev, error = %e, "基础路由下发失败"),
                    }
                }
            }
        }
        info!(rules = installed, "基础路由下发完成");
        installed
    }
}
