//! 领域事件定义
//!
//! 事件类型是封闭集合，每种类型只接受一种负载形状。

pub mod domain_event;

// 重新导出事件类型
pub use domain_event::*;
