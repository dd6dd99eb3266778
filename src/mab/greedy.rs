//! ε-greedy

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::action::Action;
use super::policy::{BanditPolicy, argmax_by};

/// 以概率 ε 均匀随机选臂，否则选当前平均奖励最大的臂。
#[derive(Debug, Clone)]
pub struct EpsilonGreedy {
    epsilon: f64,
    rng: StdRng,
}

impl EpsilonGreedy {
    pub fn with_seed(epsilon: f64, seed: u64) -> Self {
        Self {
            epsilon,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl BanditPolicy for EpsilonGreedy {
    fn name(&self) -> &'static str {
        "epsilon_greedy"
    }

    fn choose(&mut self, actions: &[Action]) -> usize {
        if self.rng.r#gen::<f64>() < self.epsilon {
            self.rng.gen_range(0..actions.len())
        } else {
            argmax_by(actions, |_, a| a.mean)
        }
    }
}
