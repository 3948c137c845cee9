use async_trait::async_trait;

use crate::entities::{Mention, MentionTarget};
use crate::errors::RepositoryResult;

#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait MentionRepository: Send + Sync {
    /// 用新集合替换目标上的全部提及。
    ///
    /// 删除与插入必须在同一事务内完成，读者不会看到中间的空窗口。
    async fn replace_for_target(
        &self,
        target: MentionTarget,
        mentions: Vec<Mention>,
    ) -> RepositoryResult<()>;

    async fn delete_for_target(&self, target: MentionTarget) -> RepositoryResult<u64>;

    async fn list_for_target(&self, target: MentionTarget) -> RepositoryResult<Vec<Mention>>;
}
