//! 控制器配置
//!
//! 从 JSON 文件加载，所有字段都有默认值；时间字段均以毫秒为单位。

use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::mab::{PolicyKind, RewardFn};
use crate::net::DeviceId;
use crate::probe::{MeasurePlan, ProbeTiming};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub ingress: DeviceId,
    pub egress_candidates: Vec<DeviceId>,
    /// 被引导的外发流量的源/目的地址
    pub outbound_src: Ipv4Addr,
    pub outbound_dst: Ipv4Addr,
    /// 设备 n 下挂主机地址为 `host_subnet + n`
    pub host_subnet: Ipv4Addr,

    pub policy: PolicyKind,
    /// 随机策略的种子
    pub seed: u64,
    pub reward: RewardFn,

    pub rounds: u32,
    pub timesteps_per_round: u32,

    pub cold_start_probes: u32,
    pub cold_start_spacing_ms: u64,
    pub cold_start_dwell_ms: u64,
    pub probes_per_timestep: u32,
    pub probe_spacing_ms: u64,
    /// 切换出口之后、开始测量之前的等待
    pub settle_ms: u64,

    /// 删除旧路径与安装新路径之间的等待
    pub switch_settle_ms: u64,
    pub probe_arm_ms: u64,
    pub probe_timeout_ms: u64,
    pub stats_timeout_ms: u64,

    pub topology_initial_delay_ms: u64,
    pub topology_refresh_ms: u64,
    pub loop_start_delay_ms: u64,

    pub steering_priority: u16,
    pub probe_priority: u16,
    pub base_route_priority: u16,
    /// 是否在第一次得到路由表后预装全部设备对之间的基础路由
    pub install_base_routes: bool,

    /// 结果日志（JSON lines，追加写）
    pub results_path: Option<PathBuf>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            ingress: DeviceId(1),
            egress_candidates: [4, 6, 11, 12, 14].into_iter().map(DeviceId).collect(),
            outbound_src: Ipv4Addr::new(11, 0, 0, 1),
            outbound_dst: Ipv4Addr::new(11, 0, 0, 2),
            host_subnet: Ipv4Addr::new(10, 0, 0, 0),
            policy: PolicyKind::default(),
            seed: 0,
            reward: RewardFn::default(),
            rounds: 12,
            timesteps_per_round: 20,
            cold_start_probes: 10,
            cold_start_spacing_ms: 1_000,
            cold_start_dwell_ms: 3_000,
            probes_per_timestep: 20,
            probe_spacing_ms: 5_000,
            settle_ms: 2_000,
            switch_settle_ms: 500,
            probe_arm_ms: 500,
            probe_timeout_ms: 1_000,
            stats_timeout_ms: 1_500,
            topology_initial_delay_ms: 2_000,
            topology_refresh_ms: 60_000,
            loop_start_delay_ms: 3_000,
            steering_priority: 65_000,
            probe_priority: 1,
            base_route_priority: 65_535,
            install_base_routes: true,
            results_path: None,
        }
    }
}

impl ControllerConfig {
    /// 从 JSON 文件加载并校验
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.egress_candidates.len() < 2 {
            return invalid("at least two egress candidates are required".into());
        }
        let unique: BTreeSet<_> = self.egress_candidates.iter().collect();
        if unique.len() != self.egress_candidates.len() {
            return invalid("duplicate egress candidates".into());
        }
        if unique.contains(&self.ingress) {
            return invalid(format!("ingress {} is also an egress candidate", self.ingress));
        }
        match self.policy {
            PolicyKind::EpsilonGreedy { epsilon } if !(0.0..=1.0).contains(&epsilon) => {
                return invalid(format!("epsilon must be in [0, 1], got {epsilon}"));
            }
            PolicyKind::Softmax { tau } if !(tau > 0.0 && tau.is_finite()) => {
                return invalid(format!("tau must be positive, got {tau}"));
            }
            PolicyKind::SpUcb2 { alpha } if !(alpha >= 0.0 && alpha.is_finite()) => {
                return invalid(format!("alpha must be non-negative, got {alpha}"));
            }
            _ => {}
        }
        if self.rounds == 0 || self.timesteps_per_round == 0 {
            return invalid("rounds and timesteps_per_round must be positive".into());
        }
        if self.cold_start_probes == 0 || self.probes_per_timestep == 0 {
            return invalid("probe counts must be positive".into());
        }
        if self.reward.d == 0.0 {
            return invalid("reward.d must be non-zero".into());
        }
        Ok(())
    }

    pub fn cold_start_plan(&self) -> MeasurePlan {
        MeasurePlan {
            dwell: ms(self.cold_start_dwell_ms),
            probes: self.cold_start_probes,
            spacing: ms(self.cold_start_spacing_ms),
        }
    }

    pub fn timestep_plan(&self) -> MeasurePlan {
        MeasurePlan {
            dwell: Duration::ZERO,
            probes: self.probes_per_timestep,
            spacing: ms(self.probe_spacing_ms),
        }
    }

    pub fn probe_timing(&self) -> ProbeTiming {
        ProbeTiming {
            arm: ms(self.probe_arm_ms),
            timeout: ms(self.probe_timeout_ms),
            priority: self.probe_priority,
        }
    }
}

/// 毫秒转 Duration
pub fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}
