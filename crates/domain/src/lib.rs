//! 社交平台事件管道核心领域模型
//!
//! 包含领域事件、通知、提及、在线状态与订阅主题等核心类型，
//! 以及持久化协作方需要实现的仓储接口。

pub mod entities;
pub mod errors;
pub mod events;
pub mod repositories;
pub mod value_objects;

// 重新导出常用类型
pub use entities::*;
pub use errors::*;
pub use events::*;
pub use repositories::*;
pub use value_objects::*;
