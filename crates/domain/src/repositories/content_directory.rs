use async_trait::async_trait;

use crate::errors::RepositoryResult;
use crate::value_objects::{CommentId, PostId, UserId};

/// 内容归属查询，事件负载里不携带作者以外的所有者信息
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait ContentDirectory: Send + Sync {
    async fn post_author(&self, post_id: PostId) -> RepositoryResult<Option<UserId>>;

    async fn comment_author(&self, comment_id: CommentId) -> RepositoryResult<Option<UserId>>;

    async fn comment_count(&self, post_id: PostId) -> RepositoryResult<u64>;
}
