//! 社交内容相关的领域事件
//!
//! 事件在写入事务内部同步创建，构造后不可变，分发后即丢弃。

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::entities::{MentionTarget, Notification, TargetType};
use crate::errors::{DomainError, DomainResult};
use crate::value_objects::{
    CommentId, EventId, Handle, MessageId, PostId, Timestamp, UnitOfWorkId, UserId,
};

/// 正文长度上限（字符数）
pub const MAX_CONTENT_CHARS: usize = 20_000;
/// 私信预览长度上限（字符数）
pub const MAX_PREVIEW_CHARS: usize = 280;

/// 事件类型（封闭集合）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    PostCreated,
    PostUpdated,
    PostDeleted,
    CommentCreated,
    CommentUpdated,
    CommentDeleted,
    LikeToggled,
    MentionsDetected,
    DirectMessageSent,
    NotificationReady,
    UserRegistered,
    PasswordResetRequested,
    PasswordChanged,
}

impl EventKind {
    pub const ALL: [EventKind; 13] = [
        EventKind::PostCreated,
        EventKind::PostUpdated,
        EventKind::PostDeleted,
        EventKind::CommentCreated,
        EventKind::CommentUpdated,
        EventKind::CommentDeleted,
        EventKind::LikeToggled,
        EventKind::MentionsDetected,
        EventKind::DirectMessageSent,
        EventKind::NotificationReady,
        EventKind::UserRegistered,
        EventKind::PasswordResetRequested,
        EventKind::PasswordChanged,
    ];

    /// 获取事件类型名称（用于日志）
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::PostCreated => "post_created",
            EventKind::PostUpdated => "post_updated",
            EventKind::PostDeleted => "post_deleted",
            EventKind::CommentCreated => "comment_created",
            EventKind::CommentUpdated => "comment_updated",
            EventKind::CommentDeleted => "comment_deleted",
            EventKind::LikeToggled => "like_toggled",
            EventKind::MentionsDetected => "mentions_detected",
            EventKind::DirectMessageSent => "direct_message_sent",
            EventKind::NotificationReady => "notification_ready",
            EventKind::UserRegistered => "user_registered",
            EventKind::PasswordResetRequested => "password_reset_requested",
            EventKind::PasswordChanged => "password_changed",
        }
    }

    /// 该事件类型是否接受给定负载
    pub fn accepts(&self, payload: &EventPayload) -> bool {
        matches!(
            (self, payload),
            (EventKind::PostCreated | EventKind::PostUpdated, EventPayload::Post(_))
                | (EventKind::PostDeleted, EventPayload::PostRemoved(_))
                | (
                    EventKind::CommentCreated | EventKind::CommentUpdated,
                    EventPayload::Comment(_)
                )
                | (EventKind::CommentDeleted, EventPayload::CommentRemoved(_))
                | (EventKind::LikeToggled, EventPayload::Like(_))
                | (EventKind::MentionsDetected, EventPayload::Mentions(_))
                | (EventKind::DirectMessageSent, EventPayload::DirectMessage(_))
                | (EventKind::NotificationReady, EventPayload::NotificationReady(_))
                | (
                    EventKind::UserRegistered
                        | EventKind::PasswordResetRequested
                        | EventKind::PasswordChanged,
                    EventPayload::Account(_)
                )
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 帖子创建 / 编辑
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostPayload {
    pub post_id: PostId,
    pub author_id: UserId,
    pub content: String,
}

/// 帖子删除
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRemovedPayload {
    pub post_id: PostId,
    pub author_id: UserId,
}

/// 评论创建 / 编辑，`parent_comment_id` 非空即为回复
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentPayload {
    pub post_id: PostId,
    pub comment_id: CommentId,
    pub parent_comment_id: Option<CommentId>,
    pub author_id: UserId,
    pub content: String,
}

/// 评论删除
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentRemovedPayload {
    pub post_id: PostId,
    pub comment_id: CommentId,
    pub author_id: UserId,
}

/// 点赞切换。`liked` 为切换后的状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LikePayload {
    pub post_id: PostId,
    pub actor_id: UserId,
    pub liked: bool,
    pub like_count: u64,
}

/// 待解析的提及文本
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MentionsPayload {
    pub target: MentionTarget,
    pub post_id: PostId,
    pub author_id: UserId,
    pub text: String,
}

/// 私信发送
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectMessagePayload {
    pub message_id: MessageId,
    pub sender_id: UserId,
    pub recipient_id: UserId,
    pub preview: String,
}

/// 已持久化、等待实时投递的通知
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationReadyPayload {
    pub notification: Notification,
    pub unread_count: u64,
}

/// 账户类事件（欢迎、重置密码、密码变更）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountPayload {
    pub user_id: UserId,
    pub handle: Handle,
    pub email: String,
    pub reset_link: Option<String>,
}

/// 事件负载
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    Post(PostPayload),
    PostRemoved(PostRemovedPayload),
    Comment(CommentPayload),
    CommentRemoved(CommentRemovedPayload),
    Like(LikePayload),
    Mentions(MentionsPayload),
    DirectMessage(DirectMessagePayload),
    NotificationReady(NotificationReadyPayload),
    Account(AccountPayload),
}

impl EventPayload {
    pub fn name(&self) -> &'static str {
        match self {
            EventPayload::Post(_) => "post",
            EventPayload::PostRemoved(_) => "post_removed",
            EventPayload::Comment(_) => "comment",
            EventPayload::CommentRemoved(_) => "comment_removed",
            EventPayload::Like(_) => "like",
            EventPayload::Mentions(_) => "mentions",
            EventPayload::DirectMessage(_) => "direct_message",
            EventPayload::NotificationReady(_) => "notification_ready",
            EventPayload::Account(_) => "account",
        }
    }

    /// 触发事件的用户（如果有）
    pub fn actor_id(&self) -> Option<UserId> {
        match self {
            EventPayload::Post(p) => Some(p.author_id),
            EventPayload::PostRemoved(p) => Some(p.author_id),
            EventPayload::Comment(c) => Some(c.author_id),
            EventPayload::CommentRemoved(c) => Some(c.author_id),
            EventPayload::Like(l) => Some(l.actor_id),
            EventPayload::Mentions(m) => Some(m.author_id),
            EventPayload::DirectMessage(d) => Some(d.sender_id),
            EventPayload::NotificationReady(n) => Some(n.notification.source_actor_id),
            EventPayload::Account(a) => Some(a.user_id),
        }
    }

    fn validate(&self, kind: EventKind) -> DomainResult<()> {
        match self {
            EventPayload::Post(p) => check_content("content", &p.content),
            EventPayload::Comment(c) => {
                if c.parent_comment_id == Some(c.comment_id) {
                    return Err(DomainError::invalid_argument(
                        "parent_comment_id",
                        "a comment cannot reply to itself",
                    ));
                }
                check_content("content", &c.content)
            }
            EventPayload::Mentions(m) => {
                if m.target.target_type == TargetType::Message {
                    return Err(DomainError::invalid_argument(
                        "target",
                        "mentions are tracked on posts and comments only",
                    ));
                }
                if m.target.target_type == TargetType::Post
                    && m.target.target_id != m.post_id.as_uuid()
                {
                    return Err(DomainError::invalid_argument(
                        "post_id",
                        "must match the mentioned post",
                    ));
                }
                check_content("text", &m.text)
            }
            EventPayload::DirectMessage(d) => {
                if d.sender_id == d.recipient_id {
                    return Err(DomainError::invalid_argument(
                        "recipient_id",
                        "cannot message yourself",
                    ));
                }
                if d.preview.chars().count() > MAX_PREVIEW_CHARS {
                    return Err(DomainError::invalid_argument("preview", "too long"));
                }
                Ok(())
            }
            EventPayload::NotificationReady(n) => {
                if n.notification.is_self_addressed() {
                    return Err(DomainError::invalid_argument(
                        "notification",
                        "self-addressed notifications are never delivered",
                    ));
                }
                Ok(())
            }
            EventPayload::Account(a) => {
                if a.email.trim().is_empty() || !a.email.contains('@') {
                    return Err(DomainError::invalid_argument("email", "invalid address"));
                }
                if kind == EventKind::PasswordResetRequested && a.reset_link.is_none() {
                    return Err(DomainError::invalid_argument(
                        "reset_link",
                        "required for password reset",
                    ));
                }
                Ok(())
            }
            EventPayload::PostRemoved(_)
            | EventPayload::CommentRemoved(_)
            | EventPayload::Like(_) => Ok(()),
        }
    }
}

fn check_content(field: &str, content: &str) -> DomainResult<()> {
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(DomainError::invalid_argument(field, "too long"));
    }
    Ok(())
}

/// 事件来源上下文
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginContext {
    pub actor_id: Option<UserId>,
    pub unit_of_work: Option<UnitOfWorkId>,
}

impl OriginContext {
    pub fn actor(actor_id: UserId) -> Self {
        Self {
            actor_id: Some(actor_id),
            ..Self::default()
        }
    }

    /// 由系统内部（例如其他事件处理器）产生
    pub fn system() -> Self {
        Self::default()
    }

    pub fn with_unit_of_work(mut self, id: UnitOfWorkId) -> Self {
        self.unit_of_work = Some(id);
        self
    }
}

/// 领域事件 `{kind, payload, origin}`，构造后不可变
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainEvent {
    id: EventId,
    kind: EventKind,
    payload: EventPayload,
    origin: OriginContext,
    occurred_at: Timestamp,
}

impl DomainEvent {
    /// 构造事件并校验负载；校验失败属于生产者错误
    pub fn new(kind: EventKind, payload: EventPayload, origin: OriginContext) -> DomainResult<Self> {
        Self::at(kind, payload, origin, Utc::now())
    }

    pub fn at(
        kind: EventKind,
        payload: EventPayload,
        origin: OriginContext,
        occurred_at: Timestamp,
    ) -> DomainResult<Self> {
        if !kind.accepts(&payload) {
            return Err(DomainError::payload_mismatch(kind.as_str(), payload.name()));
        }
        payload.validate(kind)?;

        Ok(Self {
            id: EventId::generate(),
            kind,
            payload,
            origin,
            occurred_at,
        })
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    pub fn origin(&self) -> &OriginContext {
        &self.origin
    }

    pub fn occurred_at(&self) -> Timestamp {
        self.occurred_at
    }

    /// 显式来源优先，否则取负载中的触发者
    pub fn actor_id(&self) -> Option<UserId> {
        self.origin.actor_id.or_else(|| self.payload.actor_id())
    }

    pub fn post_created(payload: PostPayload, origin: OriginContext) -> DomainResult<Self> {
        Self::new(EventKind::PostCreated, EventPayload::Post(payload), origin)
    }

    pub fn comment_created(payload: CommentPayload, origin: OriginContext) -> DomainResult<Self> {
        Self::new(EventKind::CommentCreated, EventPayload::Comment(payload), origin)
    }

    pub fn like_toggled(payload: LikePayload, origin: OriginContext) -> DomainResult<Self> {
        Self::new(EventKind::LikeToggled, EventPayload::Like(payload), origin)
    }

    /// 帖子或评论正文中需要解析 `@handle` 的文本
    pub fn mentions_detected(
        payload: MentionsPayload,
        origin: OriginContext,
    ) -> DomainResult<Self> {
        Self::new(
            EventKind::MentionsDetected,
            EventPayload::Mentions(payload),
            origin,
        )
    }

    pub fn direct_message_sent(
        payload: DirectMessagePayload,
        origin: OriginContext,
    ) -> DomainResult<Self> {
        Self::new(
            EventKind::DirectMessageSent,
            EventPayload::DirectMessage(payload),
            origin,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{ContentRef, NotificationKind};

    fn comment(parent: Option<CommentId>) -> CommentPayload {
        CommentPayload {
            post_id: PostId::generate(),
            comment_id: CommentId::generate(),
            parent_comment_id: parent,
            author_id: UserId::generate(),
            content: "nice".into(),
        }
    }

    #[test]
    fn every_kind_has_exactly_matching_payloads() {
        let like = EventPayload::Like(LikePayload {
            post_id: PostId::generate(),
            actor_id: UserId::generate(),
            liked: true,
            like_count: 1,
        });
        let accepted: Vec<_> = EventKind::ALL
            .iter()
            .filter(|kind| kind.accepts(&like))
            .collect();
        assert_eq!(accepted, vec![&EventKind::LikeToggled]);
    }

    #[test]
    fn mismatched_payload_is_rejected() {
        let err = DomainEvent::new(
            EventKind::PostCreated,
            EventPayload::Comment(comment(None)),
            OriginContext::system(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::PayloadMismatch { .. }));
    }

    #[test]
    fn self_reply_is_rejected() {
        let mut payload = comment(None);
        payload.parent_comment_id = Some(payload.comment_id);
        let result = DomainEvent::new(
            EventKind::CommentCreated,
            EventPayload::Comment(payload),
            OriginContext::system(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn password_reset_requires_link() {
        let payload = AccountPayload {
            user_id: UserId::generate(),
            handle: Handle::parse("bob").unwrap(),
            email: "bob@example.com".into(),
            reset_link: None,
        };
        assert!(DomainEvent::new(
            EventKind::PasswordResetRequested,
            EventPayload::Account(payload.clone()),
            OriginContext::system(),
        )
        .is_err());
        assert!(DomainEvent::new(
            EventKind::PasswordChanged,
            EventPayload::Account(payload),
            OriginContext::system(),
        )
        .is_ok());
    }

    #[test]
    fn self_addressed_notification_cannot_be_emitted() {
        let user = UserId::generate();
        let notification = Notification::new(
            user,
            NotificationKind::Like,
            user,
            ContentRef::post(PostId::generate()),
            Utc::now(),
        );
        let result = DomainEvent::new(
            EventKind::NotificationReady,
            EventPayload::NotificationReady(NotificationReadyPayload {
                notification,
                unread_count: 1,
            }),
            OriginContext::system(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn typed_constructors_pick_matching_kind() {
        let event = DomainEvent::comment_created(comment(None), OriginContext::system()).unwrap();
        assert_eq!(event.kind(), EventKind::CommentCreated);

        let sender = UserId::generate();
        let err = DomainEvent::direct_message_sent(
            DirectMessagePayload {
                message_id: MessageId::generate(),
                sender_id: sender,
                recipient_id: sender,
                preview: "hi".into(),
            },
            OriginContext::actor(sender),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvalidArgument { .. }));
    }

    #[test]
    fn post_mentions_must_name_the_same_post() {
        let author = UserId::generate();
        let post_id = PostId::generate();
        let payload = MentionsPayload {
            target: MentionTarget::post(post_id),
            post_id: PostId::generate(),
            author_id: author,
            text: "hi @bob".into(),
        };
        let err = DomainEvent::mentions_detected(payload.clone(), OriginContext::actor(author))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidArgument { ref field, .. } if field == "post_id"));

        let matching = MentionsPayload { post_id, ..payload };
        assert!(DomainEvent::mentions_detected(matching, OriginContext::actor(author)).is_ok());
    }

    #[test]
    fn actor_falls_back_to_payload() {
        let payload = comment(None);
        let author = payload.author_id;
        let event = DomainEvent::new(
            EventKind::CommentCreated,
            EventPayload::Comment(payload),
            OriginContext::system(),
        )
        .unwrap();
        assert_eq!(event.actor_id(), Some(author));
        assert_eq!(event.kind().as_str(), "comment_created");
    }
}
