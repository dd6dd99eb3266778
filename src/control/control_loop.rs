//! 闭环控制：冷启动 -> 若干轮稳态 -> 结束
//!
//! 每个时间步：策略选臂 -> 切换出口 -> 等待 -> 测量丢包与时延 -> 计算奖励 -> 更新该臂。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::mab::{Action, BanditPolicy, RewardFn};
use crate::net::{DeviceId, RoutingTable};
use crate::probe::{MeasurePlan, Measurement, MeasurementEngine};

use super::path::{PathManager, SteerError};
use super::results::{ResultLog, ResultRecord};

/// 控制循环所处阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    ColdStart,
    SteadyState { round: u32 },
    Finished,
}

/// 循环的节奏参数
#[derive(Debug, Clone, Copy)]
pub struct LoopSettings {
    pub ingress: DeviceId,
    pub rounds: u32,
    pub timesteps_per_round: u32,
    pub cold_start: MeasurePlan,
    pub timestep: MeasurePlan,
    /// 稳态中切换出口之后、测量之前的等待
    pub settle: Duration,
}

/// 运行结束时的统计
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub actions: Vec<Action>,
    /// 每轮平均奖励；整轮都没有有效奖励时为 None
    pub round_rewards: Vec<Option<f64>>,
}

pub struct ControlLoop {
    settings: LoopSettings,
    actions: Vec<Action>,
    policy: Box<dyn BanditPolicy>,
    paths: PathManager,
    engine: MeasurementEngine,
    reward: RewardFn,
    routes: watch::Receiver<Arc<RoutingTable>>,
    results: Option<ResultLog>,
    phase: LoopPhase,
    /// 每个出口最近一次有效的平均时延（毫秒）
    last_delay: HashMap<DeviceId, f64>,
}

impl ControlLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: LoopSettings,
        candidates: &[DeviceId],
        policy: Box<dyn BanditPolicy>,
        paths: PathManager,
        engine: MeasurementEngine,
        reward: RewardFn,
        routes: watch::Receiver<Arc<RoutingTable>>,
        results: Option<ResultLog>,
    ) -> Self {
        Self {
            settings,
            actions: candidates.iter().copied().map(Action::new).collect(),
            policy,
            paths,
            engine,
            reward,
            routes,
            results,
            phase: LoopPhase::ColdStart,
            last_delay: HashMap::new(),
        }
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// 跑完配置的轮数后返回；不会自行重启。
    pub async fn run(mut self) -> RunSummary {
        let mut round_rewards = Vec::new();

        if self.routes.wait_for(|t| !t.is_empty()).await.is_err() {
            warn!("路由表发布端已关闭，控制循环退出");
            return self.finish(round_rewards);
        }

        self.record(&ResultRecord::Start {
            policy: self.policy.name().to_string(),
            ingress: self.settings.ingress,
            candidates: &self.actions.iter().map(|a| a.device).collect::<Vec<_>>(),
        });

        self.cold_start().await;

        for round in 1..=self.settings.rounds {
            self.phase = LoopPhase::SteadyState { round };
            info!(round, "开始新一轮");
            let started = Instant::now();

            let mut rewards = Vec::with_capacity(self.settings.timesteps_per_round as usize);
            for _ in 0..self.settings.timesteps_per_round {
                let idx = self.policy.choose(&self.actions);
                let plan = self.settings.timestep;
                if let Some(r) = self.pull(idx, plan, self.settings.settle).await {
                    rewards.push(r);
                }
            }

            let mean_reward = (!rewards.is_empty())
                .then(|| rewards.iter().sum::<f64>() / rewards.len() as f64);
            let elapsed_ms = started.elapsed().as_millis() as u64;
            info!(round, mean_reward = ?mean_reward, elapsed_ms, "本轮结束");
            self.record(&ResultRecord::Round {
                round,
                mean_reward,
                elapsed_ms,
            });
            round_rewards.push(mean_reward);
        }

        self.finish(round_rewards)
    }

    /// 每个候选出口恰好访问一次，保证进入稳态前所有臂 n >= 1
    async fn cold_start(&mut self) {
        self.phase = LoopPhase::ColdStart;
        info!(candidates = self.actions.len(), "冷启动");
        for idx in 0..self.actions.len() {
            let plan = self.settings.cold_start;
            self.pull(idx, plan, Duration::ZERO).await;
        }
        self.record(&ResultRecord::ColdStart {
            actions: &self.actions.clone(),
        });
        info!(actions = ?self.actions, "冷启动完成");
    }

    /// 选中第 `idx` 个臂并完成一次测量与更新，返回奖励；无法测量时返回 None
    async fn pull(&mut self, idx: usize, plan: MeasurePlan, settle: Duration) -> Option<f64> {
        let egress = self.actions[idx].device;
        let ingress = self.settings.ingress;
        let table = self.routes.borrow().clone();
        if table.path(ingress, egress).is_none() {
            warn!(%egress, "当前路由表中没有到该出口的路径，跳过本次测量");
            return None;
        }

        match self.paths.switch_egress(&table, egress).await {
            Ok(_) => {}
            Err(e @ (SteerError::InvalidRequest { .. } | SteerError::NoPath { .. })) => {
                warn!(%egress, error = %e, "跳过本次测量");
                return None;
            }
            Err(e) => warn!(%egress, error = %e, "引导路径下发不完整，继续测量"),
        }
        tokio::time::sleep(settle).await;

        let m = self.engine.measure(&table, ingress, egress, plan).await;
        let reward = self.score(egress, &m);
        self.actions[idx].update(reward);
        info!(%egress, reward, n = self.actions[idx].n, mean = self.actions[idx].mean, "更新奖励");
        Some(reward)
    }

    /// 丢包计数不可用时按 0 计；时延全部丢失时沿用该出口上一次的有效时延，没有则按 0 计
    fn score(&mut self, egress: DeviceId, m: &Measurement) -> f64 {
        let loss = m.loss.unwrap_or_else(|| {
            warn!(%egress, "没有可用的计数快照，丢包按 0 计");
            0.0
        });
        let delay = match m.delay_ms {
            Some(d) => {
                self.last_delay.insert(egress, d);
                d
            }
            None => {
                let inherited = self.last_delay.get(&egress).copied();
                warn!(%egress, inherited = ?inherited, "本次没有有效的时延样本");
                inherited.unwrap_or(0.0)
            }
        };
        self.reward.reward(loss, delay)
    }

    fn finish(&mut self, round_rewards: Vec<Option<f64>>) -> RunSummary {
        self.phase = LoopPhase::Finished;
        self.record(&ResultRecord::Final {
            actions: &self.actions.clone(),
        });
        info!(actions = ?self.actions, "控制循环结束");
        RunSummary {
            actions: self.actions.clone(),
            round_rewards,
        }
    }

    fn record(&mut self, record: &ResultRecord<'_>) {
        if let Some(log) = self.results.as_mut() {
            if let Err(e) = log.append(record) {
                warn!(error = %e, "结果日志写入失败");
            }
        }
    }
}
