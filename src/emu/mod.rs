//! 进程内仿真转发面（用于演示与端到端测试）

mod plane;
mod topo;

pub use plane::EmuPlane;
pub use topo::{EmuLinkSpec, EmuTopology};
