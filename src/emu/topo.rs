//! 仿真拓扑构建
//!
//! 每台交换机 1 号端口下挂一台主机；交换机之间的链路按加入顺序从 2 号端口开始编号。

use std::time::Duration;

use crate::net::DeviceId;

/// 一条双向链路
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmuLinkSpec {
    pub a: DeviceId,
    pub b: DeviceId,
    /// 单向传播时延
    pub latency: Duration,
    /// 每个方向的丢包概率
    pub loss: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmuTopology {
    pub devices: Vec<DeviceId>,
    pub links: Vec<EmuLinkSpec>,
}

impl EmuTopology {
    /// 交换机 1..=n，按 (from, to) 列表连线；`wide` 判定为宽链路的用低时延、无丢包
    fn from_lists(
        n: u64,
        from: &[u64],
        to: &[u64],
        wide: impl Fn(u64, u64) -> bool,
    ) -> Self {
        let devices = (1..=n).map(DeviceId).collect();
        let links = from
            .iter()
            .zip(to)
            .map(|(&a, &b)| {
                let (latency, loss) = if wide(a, b) {
                    (Duration::from_millis(2), 0.0)
                } else {
                    (Duration::from_millis(5), 0.01)
                };
                EmuLinkSpec {
                    a: DeviceId(a),
                    b: DeviceId(b),
                    latency,
                    loss,
                }
            })
            .collect();
        Self { devices, links }
    }

    /// 14 台交换机的测试网络（默认候选出口 4/6/11/12/14 取自此拓扑）
    pub fn bso() -> Self {
        let from = [1, 2, 2, 2, 2, 2, 3, 3, 5, 7, 8, 8, 9, 9, 10, 11, 12, 13];
        let to = [2, 3, 4, 5, 7, 8, 4, 5, 6, 9, 9, 12, 10, 13, 11, 13, 13, 14];
        Self::from_lists(14, &from, &to, |a, b| {
            matches!((a, b), (1, 2) | (2, 7) | (7, 9) | (9, 13))
        })
    }

    /// 24 台交换机的 FUNET 网络
    pub fn funet() -> Self {
        let from = [
            1, 1, 1, 2, 3, 3, 4, 5, 6, 6, 7, 7, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21,
            22, 23,
        ];
        let to = [
            3, 21, 23, 23, 4, 6, 5, 7, 7, 10, 8, 9, 13, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21,
            22, 23, 24,
        ];
        Self::from_lists(24, &from, &to, |a, b| {
            matches!(
                (a, b),
                (1, 3) | (1, 23) | (1, 21) | (21, 20) | (20, 19) | (3, 6) | (6, 7) | (9, 13)
            )
        })
    }

    /// 按名字取内置拓扑
    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "bso" => Some(Self::bso()),
            "funet" => Some(Self::funet()),
            _ => None,
        }
    }
}
