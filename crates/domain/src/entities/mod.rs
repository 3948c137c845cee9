//! 领域实体定义
//!
//! 包含通知、提及、在线状态、订阅主题等核心实体。

pub mod mention;
pub mod notification;
pub mod presence;
pub mod topic;
pub mod user;

// 重新导出核心实体
pub use mention::{Mention, MentionTarget};
pub use notification::{ContentRef, Notification, NotificationKind, TargetType};
pub use presence::{PresenceEntry, TypingEntry};
pub use topic::{Topic, TopicSubscription};
pub use user::UserSummary;
