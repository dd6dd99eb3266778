//! 网络拓扑模块
//!
//! 此模块包含设备/端口标识、拓扑存储与最短路径路由表。

// 子模块声明
mod id;
mod routing;
mod topology;

// 重新导出公共接口
pub use id::{DeviceId, PortNo};
pub use routing::{Path, RoutingTable, all_simple_paths, shortest_path};
pub use topology::{TopoEvent, TopologySnapshot, TopologyStore};
