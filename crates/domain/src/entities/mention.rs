//! 提及实体定义

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::notification::TargetType;
use crate::value_objects::{CommentId, PostId, Timestamp, UserId};

/// 提及所在的内容（帖子或评论）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MentionTarget {
    pub target_type: TargetType,
    pub target_id: Uuid,
}

impl MentionTarget {
    pub fn post(post_id: PostId) -> Self {
        Self {
            target_type: TargetType::Post,
            target_id: post_id.into(),
        }
    }

    pub fn comment(comment_id: CommentId) -> Self {
        Self {
            target_type: TargetType::Comment,
            target_id: comment_id.into(),
        }
    }
}

/// 一条提及记录：`mentioning_user_id` 在 `target` 中提到了 `mentioned_user_id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    pub mentioning_user_id: UserId,
    pub target: MentionTarget,
    pub mentioned_user_id: UserId,
    pub created_at: Timestamp,
}

impl Mention {
    pub fn new(
        mentioning_user_id: UserId,
        target: MentionTarget,
        mentioned_user_id: UserId,
        created_at: Timestamp,
    ) -> Self {
        Self {
            mentioning_user_id,
            target,
            mentioned_user_id,
            created_at,
        }
    }
}
