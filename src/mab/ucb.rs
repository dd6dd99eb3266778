//! UCB1 与 SP-UCB2
//!
//! 两者都要求冷启动阶段已经让每个臂至少被选过一次。

use super::action::{Action, total_pulls};
use super::policy::{BanditPolicy, argmax_by, eligible};

/// `mean + sqrt(2 * log10(t) / n)`，`t = 1 + 总选择次数`
#[derive(Debug, Clone, Copy, Default)]
pub struct Ucb1;

impl Ucb1 {
    pub fn index(a: &Action, t: u64) -> f64 {
        a.mean + (2.0 * (t as f64).log10() / a.n as f64).sqrt()
    }
}

impl BanditPolicy for Ucb1 {
    fn name(&self) -> &'static str {
        "ucb1"
    }

    fn choose(&mut self, actions: &[Action]) -> usize {
        let t = total_pulls(actions) + 1;
        let any_pulled = t > 1;
        argmax_by(actions, |_, a| {
            if eligible(a, any_pulled) {
                Self::index(a, t)
            } else {
                f64::NEG_INFINITY
            }
        })
    }
}

/// `mean + sqrt((1 + alpha) * max(1, log10(e * t)) / (2 * s))`。
///
/// 每个臂维护一个 epoch 计数 `s`（初始 1），只在该臂被选中时加 1，
/// 与 `Action::n`（奖励更新时加 1）相互独立。
#[derive(Debug, Clone)]
pub struct SpUcb2 {
    alpha: f64,
    epochs: Vec<u64>,
}

impl SpUcb2 {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            epochs: Vec::new(),
        }
    }

    pub fn upper_bound(&self, t: u64, s: u64) -> f64 {
        let log_term = (std::f64::consts::E * t as f64).log10().max(1.0);
        ((1.0 + self.alpha) * log_term / (2.0 * s as f64)).sqrt()
    }

    /// 各臂当前的 epoch 计数
    pub fn epochs(&self) -> &[u64] {
        &self.epochs
    }
}

impl BanditPolicy for SpUcb2 {
    fn name(&self) -> &'static str {
        "sp_ucb2"
    }

    fn choose(&mut self, actions: &[Action]) -> usize {
        if self.epochs.len() != actions.len() {
            self.epochs.resize(actions.len(), 1);
        }
        let t = total_pulls(actions) + 1;
        let any_pulled = t > 1;
        let chosen = argmax_by(actions, |i, a| {
            if eligible(a, any_pulled) {
                a.mean + self.upper_bound(t, self.epochs[i])
            } else {
                f64::NEG_INFINITY
            }
        });
        self.epochs[chosen] += 1;
        chosen
    }
}
