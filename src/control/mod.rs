//! 控制面：引导路径、基础路由、闭环控制与装配

mod base;
mod control_loop;
mod controller;
mod path;
mod results;

pub use base::BaseRouting;
pub use control_loop::{ControlLoop, LoopPhase, LoopSettings, RunSummary};
pub use controller::{Controller, spawn_dispatcher, spawn_route_refresher};
pub use path::{PathManager, SteerError, SwitchOutcome};
pub use results::{ResultLog, ResultLogError, ResultRecord};
