//! 臂（候选出口）的统计量

use serde::Serialize;

use crate::net::DeviceId;

/// 一个候选出口设备及其被选次数与平均奖励。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Action {
    pub device: DeviceId,
    /// 被选次数
    pub n: u64,
    /// 平均奖励
    pub mean: f64,
}

impl Action {
    pub fn new(device: DeviceId) -> Self {
        Self {
            device,
            n: 0,
            mean: 0.0,
        }
    }

    /// 增量均值更新：先 n += 1，再 mean += (reward - mean) / n
    pub fn update(&mut self, reward: f64) {
        self.n += 1;
        self.mean += (reward - self.mean) / self.n as f64;
    }
}

/// 所有臂被选次数之和
pub fn total_pulls(actions: &[Action]) -> u64 {
    actions.iter().map(|a| a.n).sum()
}
