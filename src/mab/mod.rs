//! 多臂老虎机（MAB）选臂
//!
//! 每个候选出口是一个臂；策略根据各臂的 (n, mean) 选出下一个出口，
//! 测得的丢包与时延经奖励函数折算后回写到被选中的臂。

mod action;
mod greedy;
mod policy;
mod reward;
mod softmax;
mod ucb;

pub use action::{Action, total_pulls};
pub use greedy::EpsilonGreedy;
pub use policy::{BanditPolicy, PolicyKind};
pub use reward::RewardFn;
pub use softmax::{Softmax, softmax_probabilities};
pub use ucb::{SpUcb2, Ucb1};
