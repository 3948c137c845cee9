//! 实时推送主题
//!
//! 主题是扁平字符串，没有层级：订阅 `post:42` 不会收到 `post:42:comments`。

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;
use crate::value_objects::{PostId, SessionId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Topic(String);

impl Topic {
    pub const MAX_LEN: usize = 128;

    pub fn parse(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        if value.is_empty() {
            return Err(DomainError::invalid_argument("topic", "cannot be empty"));
        }
        if value.len() > Self::MAX_LEN {
            return Err(DomainError::invalid_argument("topic", "too long"));
        }
        if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(DomainError::invalid_argument(
                "topic",
                "must not contain whitespace",
            ));
        }
        Ok(Self(value))
    }

    /// 个人通知频道 `user:{id}:notifications`
    pub fn user_notifications(user_id: UserId) -> Self {
        Self(format!("user:{user_id}:notifications"))
    }

    /// 个人私信频道 `user:{id}:messages`
    pub fn user_messages(user_id: UserId) -> Self {
        Self(format!("user:{user_id}:messages"))
    }

    /// 帖子本身的变更（编辑、删除、点赞数）
    pub fn post(post_id: PostId) -> Self {
        Self(format!("post:{post_id}"))
    }

    /// 帖子评论区
    pub fn post_comments(post_id: PostId) -> Self {
        Self(format!("post:{post_id}:comments"))
    }

    /// 全局信息流计数频道
    pub fn feed() -> Self {
        Self("feed".to_owned())
    }

    /// `user:{id}:*` 主题的所属用户，其余主题返回 `None`
    pub fn owner(&self) -> Option<UserId> {
        let rest = self.0.strip_prefix("user:")?;
        let (id, _) = rest.split_once(':')?;
        Uuid::parse_str(id).ok().map(UserId::from)
    }

    pub fn is_personal(&self) -> bool {
        self.0.starts_with("user:")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Topic {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Topic::parse(value)
    }
}

impl From<Topic> for String {
    fn from(value: Topic) -> Self {
        value.0
    }
}

/// 会话对主题的临时订阅，从不持久化
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicSubscription {
    pub session_id: SessionId,
    pub topic: Topic,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn personal_topics_expose_owner() {
        let user = UserId::generate();
        assert_eq!(Topic::user_notifications(user).owner(), Some(user));
        assert_eq!(Topic::user_messages(user).owner(), Some(user));
        assert_eq!(Topic::post(PostId::generate()).owner(), None);
        assert_eq!(Topic::feed().owner(), None);
        assert_eq!(Topic::parse("user:not-a-uuid:x").unwrap().owner(), None);
    }

    #[test]
    fn post_topics_are_distinct_strings() {
        let post = PostId::generate();
        assert_ne!(Topic::post(post), Topic::post_comments(post));
        assert!(Topic::post_comments(post).as_str().ends_with(":comments"));
    }

    #[test]
    fn parse_rejects_whitespace() {
        assert!(Topic::parse("post 1").is_err());
        assert!(Topic::parse("").is_err());
        assert!(Topic::parse("feed").is_ok());
    }
}
