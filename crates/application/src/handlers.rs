//! 内置事件处理器
//!
//! 每个处理器内部的步骤是顺序执行的（例如先解析提及、再写提及、最后通知），
//! 不同处理器之间没有顺序保证。

use std::sync::Arc;

use async_trait::async_trait;
use domain::{
    AccountPayload, ContentDirectory, DomainEvent, EventKind, EventPayload, MentionTarget, PostId,
    Topic,
};
use tracing::debug;

use crate::dispatcher::{Dispatcher, EventHandler};
use crate::error::HandlerError;
use crate::fanout::NotificationFanout;
use crate::mailer::{Mailer, OutboundMail};
use crate::mention::MentionResolver;
use crate::realtime::RealtimePayload;
use crate::topic_router::TopicRouter;

fn unexpected(handler: &str, event: &DomainEvent) -> HandlerError {
    HandlerError::failed(format!(
        "{handler} cannot handle {} with payload {}",
        event.kind(),
        event.payload().name()
    ))
}

/// 新帖、点赞、评论、私信 -> 持久化通知
pub struct NotificationFanoutHandler {
    fanout: Arc<NotificationFanout>,
}

impl NotificationFanoutHandler {
    pub fn new(fanout: Arc<NotificationFanout>) -> Self {
        Self { fanout }
    }
}

#[async_trait]
impl EventHandler for NotificationFanoutHandler {
    fn name(&self) -> &'static str {
        "notification_fanout"
    }

    fn handles(&self, kind: EventKind) -> bool {
        matches!(
            kind,
            EventKind::PostCreated
                | EventKind::LikeToggled
                | EventKind::CommentCreated
                | EventKind::DirectMessageSent
        )
    }

    async fn handle(&self, event: Arc<DomainEvent>) -> Result<(), HandlerError> {
        match (event.kind(), event.payload()) {
            (EventKind::PostCreated, EventPayload::Post(post)) => {
                self.fanout.on_post_created(post).await?;
            }
            (EventKind::LikeToggled, EventPayload::Like(like)) => {
                self.fanout.on_like_toggled(like).await?;
            }
            (EventKind::CommentCreated, EventPayload::Comment(comment)) => {
                self.fanout.on_comment_created(comment).await?;
            }
            (EventKind::DirectMessageSent, EventPayload::DirectMessage(message)) => {
                self.fanout.on_direct_message(message).await?;
            }
            _ => return Err(unexpected(self.name(), &event)),
        }
        Ok(())
    }
}

/// 解析提及 -> 替换提及记录 -> 通知被提及者；内容删除时清理提及
pub struct MentionHandler {
    resolver: Arc<MentionResolver>,
    fanout: Arc<NotificationFanout>,
}

impl MentionHandler {
    pub fn new(resolver: Arc<MentionResolver>, fanout: Arc<NotificationFanout>) -> Self {
        Self { resolver, fanout }
    }
}

#[async_trait]
impl EventHandler for MentionHandler {
    fn name(&self) -> &'static str {
        "mentions"
    }

    fn handles(&self, kind: EventKind) -> bool {
        matches!(
            kind,
            EventKind::MentionsDetected | EventKind::PostDeleted | EventKind::CommentDeleted
        )
    }

    async fn handle(&self, event: Arc<DomainEvent>) -> Result<(), HandlerError> {
        match event.payload() {
            EventPayload::Mentions(mentions) => {
                let resolved = self
                    .resolver
                    .resolve_text(&mentions.text, mentions.author_id)
                    .await?;
                self.resolver
                    .reconcile(mentions.target, mentions.author_id, &resolved)
                    .await?;
                self.fanout
                    .on_mentions(
                        mentions.target,
                        mentions.post_id,
                        mentions.author_id,
                        &resolved,
                    )
                    .await?;
            }
            EventPayload::PostRemoved(post) => {
                let removed = self.resolver.clear(MentionTarget::post(post.post_id)).await?;
                debug!(post_id = %post.post_id, removed, "帖子删除，清理提及");
            }
            EventPayload::CommentRemoved(comment) => {
                let removed = self
                    .resolver
                    .clear(MentionTarget::comment(comment.comment_id))
                    .await?;
                debug!(comment_id = %comment.comment_id, removed, "评论删除，清理提及");
            }
            _ => return Err(unexpected(self.name(), &event)),
        }
        Ok(())
    }
}

/// 内容变更推送给正在查看该内容的会话，以及全局计数频道
pub struct ContentBroadcastHandler {
    router: Arc<TopicRouter>,
    content: Arc<dyn ContentDirectory>,
}

impl ContentBroadcastHandler {
    pub fn new(router: Arc<TopicRouter>, content: Arc<dyn ContentDirectory>) -> Self {
        Self { router, content }
    }

    async fn publish_comment_count(&self, post_id: PostId) -> Result<(), HandlerError> {
        let comment_count = self.content.comment_count(post_id).await?;
        self.router
            .publish(
                Topic::feed(),
                RealtimePayload::CommentCountChanged {
                    post_id,
                    comment_count,
                },
            )
            .await;
        Ok(())
    }
}

#[async_trait]
impl EventHandler for ContentBroadcastHandler {
    fn name(&self) -> &'static str {
        "content_broadcast"
    }

    fn handles(&self, kind: EventKind) -> bool {
        matches!(
            kind,
            EventKind::PostUpdated
                | EventKind::PostDeleted
                | EventKind::CommentCreated
                | EventKind::CommentUpdated
                | EventKind::CommentDeleted
                | EventKind::LikeToggled
        )
    }

    async fn handle(&self, event: Arc<DomainEvent>) -> Result<(), HandlerError> {
        match (event.kind(), event.payload()) {
            (EventKind::CommentCreated, EventPayload::Comment(comment)) => {
                self.router
                    .publish(
                        Topic::post_comments(comment.post_id),
                        RealtimePayload::CommentCreated {
                            post_id: comment.post_id,
                            comment_id: comment.comment_id,
                            parent_comment_id: comment.parent_comment_id,
                            author_id: comment.author_id,
                            content: comment.content.clone(),
                        },
                    )
                    .await;
                self.publish_comment_count(comment.post_id).await?;
            }
            (EventKind::CommentUpdated, EventPayload::Comment(comment)) => {
                self.router
                    .publish(
                        Topic::post_comments(comment.post_id),
                        RealtimePayload::CommentUpdated {
                            post_id: comment.post_id,
                            comment_id: comment.comment_id,
                            content: comment.content.clone(),
                        },
                    )
                    .await;
            }
            (EventKind::CommentDeleted, EventPayload::CommentRemoved(comment)) => {
                self.router
                    .publish(
                        Topic::post_comments(comment.post_id),
                        RealtimePayload::CommentDeleted {
                            post_id: comment.post_id,
                            comment_id: comment.comment_id,
                        },
                    )
                    .await;
                self.publish_comment_count(comment.post_id).await?;
            }
            (EventKind::PostUpdated, EventPayload::Post(post)) => {
                self.router
                    .publish(
                        Topic::post(post.post_id),
                        RealtimePayload::PostUpdated {
                            post_id: post.post_id,
                            content: post.content.clone(),
                        },
                    )
                    .await;
            }
            (EventKind::PostDeleted, EventPayload::PostRemoved(post)) => {
                self.router
                    .publish(
                        Topic::post(post.post_id),
                        RealtimePayload::PostDeleted {
                            post_id: post.post_id,
                        },
                    )
                    .await;
            }
            (EventKind::LikeToggled, EventPayload::Like(like)) => {
                self.router
                    .publish(
                        Topic::post(like.post_id),
                        RealtimePayload::LikeUpdated {
                            post_id: like.post_id,
                            like_count: like.like_count,
                        },
                    )
                    .await;
            }
            _ => return Err(unexpected(self.name(), &event)),
        }
        Ok(())
    }
}

/// 已持久化的通知和私信推送到接收者的个人频道。
///
/// 是否推送只看订阅表：在线状态是启发式的，仍然连着的会话即使错过心跳也照常收到
pub struct RealtimeDeliveryHandler {
    router: Arc<TopicRouter>,
}

impl RealtimeDeliveryHandler {
    pub fn new(router: Arc<TopicRouter>) -> Self {
        Self { router }
    }
}

#[async_trait]
impl EventHandler for RealtimeDeliveryHandler {
    fn name(&self) -> &'static str {
        "realtime_delivery"
    }

    fn handles(&self, kind: EventKind) -> bool {
        matches!(
            kind,
            EventKind::NotificationReady | EventKind::DirectMessageSent
        )
    }

    async fn handle(&self, event: Arc<DomainEvent>) -> Result<(), HandlerError> {
        let (recipient_id, topic, payload) = match event.payload() {
            EventPayload::NotificationReady(ready) => (
                ready.notification.recipient_id,
                Topic::user_notifications(ready.notification.recipient_id),
                RealtimePayload::NotificationCreated {
                    notification: ready.notification.clone(),
                    unread_count: ready.unread_count,
                },
            ),
            EventPayload::DirectMessage(message) => (
                message.recipient_id,
                Topic::user_messages(message.recipient_id),
                RealtimePayload::DirectMessage {
                    message_id: message.message_id,
                    sender_id: message.sender_id,
                    preview: message.preview.clone(),
                },
            ),
            _ => return Err(unexpected(self.name(), &event)),
        };

        // 没有订阅的接收者下次拉取时会看到持久化的记录
        let report = self.router.publish(topic, payload).await;
        debug!(
            user_id = %recipient_id,
            delivered = report.delivered,
            unreachable = report.unreachable,
            "实时推送完成"
        );
        Ok(())
    }
}

/// 欢迎、重置密码、密码变更邮件
pub struct AccountMailHandler {
    mailer: Arc<dyn Mailer>,
}

impl AccountMailHandler {
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Self { mailer }
    }

    fn compose(kind: EventKind, account: &AccountPayload) -> Option<OutboundMail> {
        let (subject, body) = match kind {
            EventKind::UserRegistered => (
                "Welcome to socialhub".to_owned(),
                format!("Hi @{}, your account is ready.", account.handle),
            ),
            EventKind::PasswordResetRequested => (
                "Reset your password".to_owned(),
                format!(
                    "Hi @{}, use this link to reset your password: {}",
                    account.handle,
                    account.reset_link.as_deref()?
                ),
            ),
            EventKind::PasswordChanged => (
                "Your password was changed".to_owned(),
                format!(
                    "Hi @{}, your password was just changed. If this wasn't you, reset it immediately.",
                    account.handle
                ),
            ),
            _ => return None,
        };
        Some(OutboundMail {
            to: account.email.clone(),
            subject,
            body,
        })
    }
}

#[async_trait]
impl EventHandler for AccountMailHandler {
    fn name(&self) -> &'static str {
        "account_mail"
    }

    fn handles(&self, kind: EventKind) -> bool {
        matches!(
            kind,
            EventKind::UserRegistered
                | EventKind::PasswordResetRequested
                | EventKind::PasswordChanged
        )
    }

    async fn handle(&self, event: Arc<DomainEvent>) -> Result<(), HandlerError> {
        let EventPayload::Account(account) = event.payload() else {
            return Err(unexpected(self.name(), &event));
        };
        let mail = Self::compose(event.kind(), account)
            .ok_or_else(|| unexpected(self.name(), &event))?;
        self.mailer.send(mail).await?;
        debug!(user_id = %account.user_id, event_kind = %event.kind(), "账户邮件已发送");
        Ok(())
    }
}

/// 默认处理器需要的协作方
pub struct HandlerDependencies {
    pub fanout: Arc<NotificationFanout>,
    pub resolver: Arc<MentionResolver>,
    pub router: Arc<TopicRouter>,
    pub content: Arc<dyn ContentDirectory>,
    pub mailer: Arc<dyn Mailer>,
}

pub fn register_default_handlers(dispatcher: &Dispatcher, deps: HandlerDependencies) {
    dispatcher.register(Arc::new(NotificationFanoutHandler::new(deps.fanout.clone())));
    dispatcher.register(Arc::new(MentionHandler::new(deps.resolver, deps.fanout)));
    dispatcher.register(Arc::new(ContentBroadcastHandler::new(
        deps.router.clone(),
        deps.content,
    )));
    dispatcher.register(Arc::new(RealtimeDeliveryHandler::new(deps.router)));
    dispatcher.register(Arc::new(AccountMailHandler::new(deps.mailer)));
}
