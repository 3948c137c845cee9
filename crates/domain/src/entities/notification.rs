//! 通知实体定义

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;
use crate::value_objects::{CommentId, MessageId, NotificationId, PostId, Timestamp, UserId};

/// 通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewPost,
    Like,
    Comment,
    Mention,
    DirectMessage,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::NewPost => "new_post",
            NotificationKind::Like => "like",
            NotificationKind::Comment => "comment",
            NotificationKind::Mention => "mention",
            NotificationKind::DirectMessage => "direct_message",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new_post" => Ok(NotificationKind::NewPost),
            "like" => Ok(NotificationKind::Like),
            "comment" => Ok(NotificationKind::Comment),
            "mention" => Ok(NotificationKind::Mention),
            "direct_message" => Ok(NotificationKind::DirectMessage),
            other => Err(DomainError::invalid_argument(
                "notification_kind",
                format!("unknown kind {other}"),
            )),
        }
    }
}

/// 被引用内容的类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Post,
    Comment,
    Message,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Post => "post",
            TargetType::Comment => "comment",
            TargetType::Message => "message",
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "post" => Ok(TargetType::Post),
            "comment" => Ok(TargetType::Comment),
            "message" => Ok(TargetType::Message),
            other => Err(DomainError::invalid_argument(
                "target_type",
                format!("unknown target type {other}"),
            )),
        }
    }
}

/// 通知指向的内容。
///
/// `post_id` 让客户端在评论类通知上也能直接跳转到所属帖子。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentRef {
    pub target_type: TargetType,
    pub target_id: Uuid,
    pub post_id: Option<PostId>,
}

impl ContentRef {
    pub fn post(post_id: PostId) -> Self {
        Self {
            target_type: TargetType::Post,
            target_id: post_id.into(),
            post_id: Some(post_id),
        }
    }

    pub fn comment(post_id: PostId, comment_id: CommentId) -> Self {
        Self {
            target_type: TargetType::Comment,
            target_id: comment_id.into(),
            post_id: Some(post_id),
        }
    }

    pub fn message(message_id: MessageId) -> Self {
        Self {
            target_type: TargetType::Message,
            target_id: message_id.into(),
            post_id: None,
        }
    }
}

/// 通知实体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// 通知ID
    pub id: NotificationId,
    /// 接收者
    pub recipient_id: UserId,
    /// 通知类型
    pub kind: NotificationKind,
    /// 触发通知的用户
    pub source_actor_id: UserId,
    /// 关联内容
    pub content_ref: ContentRef,
    /// 是否已读
    pub is_read: bool,
    /// 创建时间
    pub created_at: Timestamp,
}

impl Notification {
    /// 创建新通知（未读）
    pub fn new(
        recipient_id: UserId,
        kind: NotificationKind,
        source_actor_id: UserId,
        content_ref: ContentRef,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id: NotificationId::generate(),
            recipient_id,
            kind,
            source_actor_id,
            content_ref,
            is_read: false,
            created_at,
        }
    }

    /// 标记为已读
    pub fn mark_as_read(&mut self) {
        self.is_read = true;
    }

    /// 接收者是否就是触发者本人
    pub fn is_self_addressed(&self) -> bool {
        self.recipient_id == self.source_actor_id
    }
}
