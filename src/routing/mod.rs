//! 路由决策模块
//!
//! - `decision`：决策的纯函数计算
//! - `table`：按操作类型记忆化的决策表

pub mod decision;
pub mod table;

pub use decision::{compute_decision, RoutingDecision};
pub use table::RoutingTable;
