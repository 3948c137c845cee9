//! Repository接口定义
//!
//! 事件管道通过这些窄接口访问持久化协作方，内层定义接口，外层实现接口。

pub mod content_directory;
pub mod mention_repository;
pub mod notification_repository;
pub mod user_directory;

pub use content_directory::ContentDirectory;
pub use mention_repository::MentionRepository;
pub use notification_repository::NotificationRepository;
pub use user_directory::UserDirectory;

#[cfg(feature = "testing")]
pub use content_directory::MockContentDirectory;
#[cfg(feature = "testing")]
pub use mention_repository::MockMentionRepository;
#[cfg(feature = "testing")]
pub use notification_repository::MockNotificationRepository;
#[cfg(feature = "testing")]
pub use user_directory::MockUserDirectory;

/// 分页参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u32,
}

impl Pagination {
    pub const MAX_LIMIT: u32 = 100;

    /// 超过上限的 `limit` 会被截断
    pub fn new(limit: u32, offset: u32) -> Self {
        Self {
            limit: limit.clamp(1, Self::MAX_LIMIT),
            offset,
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 20,
            offset: 0,
        }
    }
}
