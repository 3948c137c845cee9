//! 通知Repository接口定义

use async_trait::async_trait;

use crate::entities::Notification;
use crate::errors::RepositoryResult;
use crate::repositories::Pagination;
use crate::value_objects::{NotificationId, UserId};

/// 通知Repository接口
///
/// 除 `insert` 外的所有操作都以接收者为作用域，别人的通知视为不存在。
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// 持久化一条新通知
    async fn insert(&self, notification: &Notification) -> RepositoryResult<()>;

    async fn find_by_id(&self, id: NotificationId) -> RepositoryResult<Option<Notification>>;

    /// 按创建时间倒序列出
    async fn list_for_recipient(
        &self,
        recipient_id: UserId,
        pagination: Pagination,
        unread_only: bool,
    ) -> RepositoryResult<Vec<Notification>>;

    async fn count_unread(&self, recipient_id: UserId) -> RepositoryResult<u64>;

    /// 返回是否找到该通知
    async fn mark_read(&self, recipient_id: UserId, id: NotificationId) -> RepositoryResult<bool>;

    async fn mark_all_read(&self, recipient_id: UserId) -> RepositoryResult<u64>;

    /// 返回是否删除了记录
    async fn delete(&self, recipient_id: UserId, id: NotificationId) -> RepositoryResult<bool>;

    /// 删除所有已读通知，返回删除数量
    async fn delete_read(&self, recipient_id: UserId) -> RepositoryResult<u64>;
}
