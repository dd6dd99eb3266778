//! 探测与测量
//!
//! 时延：探测帧沿路径转发，目的设备上送，按收发时间差计算单向时延。
//! 丢包：停留前后各取一次业务流计数，按发送/接收增量计算。

mod counters;
mod delay;
mod engine;

pub use counters::{CounterSnapshot, CounterStore, loss_ratio};
pub use delay::{DelayProber, DelaySamples, ProbeSession, ProbeStatus, ProbeTiming};
pub use engine::{MeasurePlan, Measurement, MeasurementEngine};

use crate::net::DeviceId;
use crate::plane::PlaneError;

/// 测量失败。都不是致命错误，调用方按“没有样本”处理。
#[derive(Debug, thiserror::Error)]
pub enum MeasureError {
    #[error("no path from {src} to {dst}")]
    NoPath { src: DeviceId, dst: DeviceId },
    #[error("a measurement for {src} -> {dst} is already in flight")]
    Busy { src: DeviceId, dst: DeviceId },
    #[error("timed out waiting for {src} -> {dst}")]
    Timeout { src: DeviceId, dst: DeviceId },
    #[error("device ids {src}/{dst} do not fit in a probe address")]
    Unencodable { src: DeviceId, dst: DeviceId },
    #[error(transparent)]
    Plane(#[from] PlaneError),
}
