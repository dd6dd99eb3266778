//! 时延探测帧
//!
//! 帧格式：以太网头（dst MAC、src MAC、ethertype 0x7777）+ 最小 IPv4 头（20 字节）。
//! 源/目的设备 id 编码在 MAC 地址的低 4 字节中（前缀 `ff:ff`），
//! 接收方无需查表即可还原路径端点。

use super::flow::{FlowMatch, MacAddr};
use crate::net::DeviceId;

/// 保留的探测帧 ethertype
pub const PROBE_ETH_TYPE: u16 = 0x7777;

const ETH_HEADER_LEN: usize = 14;
const IPV4_HEADER_LEN: usize = 20;
const MAC_PREFIX: [u8; 2] = [0xff, 0xff];

/// 探测帧的端点
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProbeFrame {
    pub src: DeviceId,
    pub dst: DeviceId,
}

impl ProbeFrame {
    /// 两端 id 都必须能放进 32 位，否则返回 None
    pub fn new(src: DeviceId, dst: DeviceId) -> Option<Self> {
        probe_mac(src)?;
        probe_mac(dst)?;
        Some(Self { src, dst })
    }

    /// 中间跳/目的设备上用于匹配该探测帧的条件
    pub fn flow_match(&self) -> FlowMatch {
        FlowMatch::Probe {
            eth_src: mac_of(self.src),
            eth_dst: mac_of(self.dst),
        }
    }

    /// 序列化为原始帧
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(ETH_HEADER_LEN + IPV4_HEADER_LEN);
        buf.extend_from_slice(&mac_of(self.dst).0);
        buf.extend_from_slice(&mac_of(self.src).0);
        buf.extend_from_slice(&PROBE_ETH_TYPE.to_be_bytes());
        let mut ip = [0u8; IPV4_HEADER_LEN];
        ip[0] = 0x45; // version 4, IHL 5
        buf.extend_from_slice(&ip);
        buf
    }

    /// 解析原始帧；不是探测帧时返回 None
    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < ETH_HEADER_LEN {
            return None;
        }
        let ethertype = u16::from_be_bytes([data[12], data[13]]);
        if ethertype != PROBE_ETH_TYPE {
            return None;
        }
        let dst = device_of(&data[0..6])?;
        let src = device_of(&data[6..12])?;
        Some(Self { src, dst })
    }
}

/// 读取任意以太网帧的 (src MAC, dst MAC, ethertype)
pub fn eth_header(data: &[u8]) -> Option<(MacAddr, MacAddr, u16)> {
    if data.len() < ETH_HEADER_LEN {
        return None;
    }
    let mut dst = [0u8; 6];
    let mut src = [0u8; 6];
    dst.copy_from_slice(&data[0..6]);
    src.copy_from_slice(&data[6..12]);
    Some((MacAddr(src), MacAddr(dst), u16::from_be_bytes([data[12], data[13]])))
}

/// 设备 id 对应的探测 MAC：`ff:ff:<id u32 BE>`
pub fn probe_mac(dev: DeviceId) -> Option<MacAddr> {
    u32::try_from(dev.0).ok().map(|_| mac_of(dev))
}

// 仅在 `ProbeFrame::new` 校验过之后调用
fn mac_of(dev: DeviceId) -> MacAddr {
    let b = (dev.0 as u32).to_be_bytes();
    MacAddr([MAC_PREFIX[0], MAC_PREFIX[1], b[0], b[1], b[2], b[3]])
}

fn device_of(mac: &[u8]) -> Option<DeviceId> {
    if mac[0..2] != MAC_PREFIX {
        return None;
    }
    let id = u32::from_be_bytes([mac[2], mac[3], mac[4], mac[5]]);
    Some(DeviceId(u64::from(id)))
}
