//! 奖励函数
//!
//! `reward = r0 - alpha * loss - beta * delay / d`，对丢包最敏感，对时延次之。

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardFn {
    pub r0: f64,
    pub alpha: f64,
    pub beta: f64,
    pub d: f64,
}

impl Default for RewardFn {
    fn default() -> Self {
        Self {
            r0: 11.0,
            alpha: 150.0,
            beta: 25.0,
            d: 100.0,
        }
    }
}

impl RewardFn {
    /// `loss` 为比例（0..=1），`delay_ms` 为毫秒
    pub fn reward(&self, loss: f64, delay_ms: f64) -> f64 {
        self.r0 - self.alpha * loss - self.beta * delay_ms / self.d
    }
}
