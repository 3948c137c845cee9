//! 通知读取与变更接口，供 HTTP 层使用
//!
//! 所有操作都以接收者为作用域：别人的通知一律按不存在处理。

use std::sync::Arc;

use domain::{Notification, NotificationId, NotificationRepository, Pagination, UserId};
use tracing::info;

use crate::error::{ApplicationError, ApplicationResult};

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationPage {
    pub items: Vec<Notification>,
    pub unread_count: u64,
    pub pagination: Pagination,
}

pub struct NotificationService {
    notifications: Arc<dyn NotificationRepository>,
}

impl NotificationService {
    pub fn new(notifications: Arc<dyn NotificationRepository>) -> Self {
        Self { notifications }
    }

    /// 按时间倒序
    pub async fn list(
        &self,
        recipient_id: UserId,
        pagination: Pagination,
        unread_only: bool,
    ) -> ApplicationResult<NotificationPage> {
        let items = self
            .notifications
            .list_for_recipient(recipient_id, pagination, unread_only)
            .await?;
        let unread_count = self.notifications.count_unread(recipient_id).await?;
        Ok(NotificationPage {
            items,
            unread_count,
            pagination,
        })
    }

    pub async fn unread_count(&self, recipient_id: UserId) -> ApplicationResult<u64> {
        Ok(self.notifications.count_unread(recipient_id).await?)
    }

    pub async fn mark_read(
        &self,
        recipient_id: UserId,
        notification_id: NotificationId,
    ) -> ApplicationResult<()> {
        if !self
            .notifications
            .mark_read(recipient_id, notification_id)
            .await?
        {
            return Err(ApplicationError::not_found("notification", notification_id));
        }
        Ok(())
    }

    pub async fn mark_all_read(&self, recipient_id: UserId) -> ApplicationResult<u64> {
        let updated = self.notifications.mark_all_read(recipient_id).await?;
        info!(user_id = %recipient_id, updated, "全部通知标记为已读");
        Ok(updated)
    }

    pub async fn delete(
        &self,
        recipient_id: UserId,
        notification_id: NotificationId,
    ) -> ApplicationResult<()> {
        if !self
            .notifications
            .delete(recipient_id, notification_id)
            .await?
        {
            return Err(ApplicationError::not_found("notification", notification_id));
        }
        Ok(())
    }

    /// 删除全部已读通知
    pub async fn delete_all_read(&self, recipient_id: UserId) -> ApplicationResult<u64> {
        let deleted = self.notifications.delete_read(recipient_id).await?;
        info!(user_id = %recipient_id, deleted, "已读通知已清理");
        Ok(deleted)
    }
}
