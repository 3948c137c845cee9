use async_trait::async_trait;

use crate::entities::UserSummary;
use crate::errors::RepositoryResult;
use crate::value_objects::{Handle, UserId};

/// 身份目录
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_handle(&self, handle: &Handle) -> RepositoryResult<Option<UserSummary>>;

    async fn find_by_id(&self, id: UserId) -> RepositoryResult<Option<UserSummary>>;

    /// 所有活跃用户，用于新帖广播
    async fn list_active_ids(&self) -> RepositoryResult<Vec<UserId>>;
}
