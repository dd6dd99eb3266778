//! 选臂策略接口与配置

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::action::Action;
use super::greedy::EpsilonGreedy;
use super::softmax::Softmax;
use super::ucb::{SpUcb2, Ucb1};

/// 选臂策略：根据所有臂的 (n, mean) 选出下一个臂的下标。
///
/// 奖励更新由 [`Action::update`] 完成，策略本身没有单独的 update 步骤
/// （SP-UCB2 在选择时维护自己的 epoch 计数）。
pub trait BanditPolicy: Send {
    fn name(&self) -> &'static str;

    /// `actions` 至少包含 2 个臂；返回值是 `actions` 中的下标
    fn choose(&mut self, actions: &[Action]) -> usize;
}

/// 配置中的策略选择及其超参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyKind {
    EpsilonGreedy {
        #[serde(default = "default_epsilon")]
        epsilon: f64,
    },
    Softmax {
        #[serde(default = "default_tau")]
        tau: f64,
    },
    Ucb1,
    SpUcb2 {
        #[serde(default = "default_sp_alpha")]
        alpha: f64,
    },
}

fn default_epsilon() -> f64 {
    0.1
}

fn default_tau() -> f64 {
    1.0
}

fn default_sp_alpha() -> f64 {
    0.1
}

impl Default for PolicyKind {
    fn default() -> Self {
        PolicyKind::SpUcb2 {
            alpha: default_sp_alpha(),
        }
    }
}

impl PolicyKind {
    /// 构建策略实例；`seed` 只被随机策略使用
    pub fn build(&self, seed: u64) -> Box<dyn BanditPolicy> {
        match *self {
            PolicyKind::EpsilonGreedy { epsilon } => Box::new(EpsilonGreedy::with_seed(epsilon, seed)),
            PolicyKind::Softmax { tau } => Box::new(Softmax::with_seed(tau, seed)),
            PolicyKind::Ucb1 => Box::new(Ucb1),
            PolicyKind::SpUcb2 { alpha } => Box::new(SpUcb2::new(alpha)),
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyKind::EpsilonGreedy { epsilon } => write!(f, "epsilon_greedy:{epsilon}"),
            PolicyKind::Softmax { tau } => write!(f, "softmax:{tau}"),
            PolicyKind::Ucb1 => write!(f, "ucb1"),
            PolicyKind::SpUcb2 { alpha } => write!(f, "sp_ucb2:{alpha}"),
        }
    }
}

/// 命令行写法：`ucb1`、`sp_ucb2[:alpha]`、`softmax[:tau]`、`epsilon_greedy[:epsilon]`
impl FromStr for PolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, param) = match s.split_once(':') {
            Some((n, p)) => (n, Some(p)),
            None => (s, None),
        };
        let param = |default: f64| -> Result<f64, String> {
            match param {
                Some(p) => p.parse::<f64>().map_err(|e| format!("bad parameter {p:?}: {e}")),
                None => Ok(default),
            }
        };
        match name {
            "epsilon_greedy" | "egreedy" => Ok(PolicyKind::EpsilonGreedy {
                epsilon: param(default_epsilon())?,
            }),
            "softmax" => Ok(PolicyKind::Softmax {
                tau: param(default_tau())?,
            }),
            "ucb1" => Ok(PolicyKind::Ucb1),
            "sp_ucb2" => Ok(PolicyKind::SpUcb2 {
                alpha: param(default_sp_alpha())?,
            }),
            other => Err(format!("unknown policy {other:?}")),
        }
    }
}

/// 按分数取最大值的下标；并列时取最靠前的一个
pub(crate) fn argmax_by(actions: &[Action], mut score: impl FnMut(usize, &Action) -> f64) -> usize {
    let mut best = 0;
    let mut best_score = f64::NEG_INFINITY;
    for (i, a) in actions.iter().enumerate() {
        let s = score(i, a);
        if s > best_score {
            best = i;
            best_score = s;
        }
    }
    best
}

/// UCB 类公式只对 n >= 1 的臂有定义。
///
/// 只要还有臂被选过，就只在这些臂里比较；全部为 0 时所有臂都参与。
pub(crate) fn eligible(a: &Action, any_pulled: bool) -> bool {
    !any_pulled || a.n > 0
}
