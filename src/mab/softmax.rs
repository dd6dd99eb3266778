//! Softmax（Boltzmann）选臂

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::action::Action;
use super::policy::BanditPolicy;

#[derive(Debug, Clone)]
pub struct Softmax {
    tau: f64,
    rng: StdRng,
}

impl Softmax {
    pub fn with_seed(tau: f64, seed: u64) -> Self {
        Self {
            tau,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

/// `p_i = exp(mean_i / tau) / sum_j exp(mean_j / tau)`。
///
/// 先减去最大均值再取指数，分布不变但不会溢出。
pub fn softmax_probabilities(actions: &[Action], tau: f64) -> Vec<f64> {
    let max = actions
        .iter()
        .map(|a| a.mean)
        .fold(f64::NEG_INFINITY, f64::max);
    let weights: Vec<f64> = actions
        .iter()
        .map(|a| ((a.mean - max) / tau).exp())
        .collect();
    let z: f64 = weights.iter().sum();
    weights.into_iter().map(|w| w / z).collect()
}

impl BanditPolicy for Softmax {
    fn name(&self) -> &'static str {
        "softmax"
    }

    fn choose(&mut self, actions: &[Action]) -> usize {
        let probs = softmax_probabilities(actions, self.tau);
        let p = self.rng.r#gen::<f64>();
        let mut cumulative = 0.0;
        for (i, prob) in probs.iter().enumerate() {
            cumulative += prob;
            if cumulative > p {
                return i;
            }
        }
        actions.len() - 1
    }
}
