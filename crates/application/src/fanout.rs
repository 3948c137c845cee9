//! 通知扇出服务
//!
//! 先持久化通知，再发出 `NotificationReady` 次级事件交给实时投递。
//! 实时投递失败不影响已写入的通知，客户端下次拉取时仍能看到。

use std::collections::BTreeSet;
use std::sync::Arc;

use domain::{
    CommentId, CommentPayload, ContentDirectory, ContentRef, DirectMessagePayload, EventKind,
    EventPayload, LikePayload, MentionTarget, Notification, NotificationKind,
    NotificationReadyPayload, NotificationRepository, OriginContext, PostId, PostPayload,
    TargetType, UserDirectory, UserId,
};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{ApplicationError, ApplicationResult};
use crate::publisher::EventPublisher;

pub struct NotificationFanout {
    notifications: Arc<dyn NotificationRepository>,
    users: Arc<dyn UserDirectory>,
    content: Arc<dyn ContentDirectory>,
    publisher: EventPublisher,
    clock: Arc<dyn Clock>,
}

impl NotificationFanout {
    pub fn new(
        notifications: Arc<dyn NotificationRepository>,
        users: Arc<dyn UserDirectory>,
        content: Arc<dyn ContentDirectory>,
        publisher: EventPublisher,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            notifications,
            users,
            content,
            publisher,
            clock,
        }
    }

    /// 为单个接收者创建通知。接收者就是触发者本人时不创建，返回 `None`
    pub async fn notify(
        &self,
        recipient_id: UserId,
        kind: NotificationKind,
        source_actor_id: UserId,
        content_ref: ContentRef,
    ) -> ApplicationResult<Option<Notification>> {
        if recipient_id == source_actor_id {
            debug!(user_id = %recipient_id, kind = %kind, "跳过发给自己的通知");
            return Ok(None);
        }

        let notification = Notification::new(
            recipient_id,
            kind,
            source_actor_id,
            content_ref,
            self.clock.now(),
        );
        self.notifications.insert(&notification).await?;
        debug!(
            notification_id = %notification.id,
            recipient_id = %recipient_id,
            kind = %kind,
            "通知已持久化"
        );

        self.emit_ready(&notification).await;
        Ok(Some(notification))
    }

    // 尽力而为：失败只记录日志
    async fn emit_ready(&self, notification: &Notification) {
        let unread_count = match self
            .notifications
            .count_unread(notification.recipient_id)
            .await
        {
            Ok(count) => count,
            Err(err) => {
                warn!(
                    notification_id = %notification.id,
                    error = %err,
                    "统计未读数失败，跳过实时投递"
                );
                return;
            }
        };

        let result = self.publisher.publish_detached(
            OriginContext::actor(notification.source_actor_id),
            EventKind::NotificationReady,
            EventPayload::NotificationReady(NotificationReadyPayload {
                notification: notification.clone(),
                unread_count,
            }),
        );
        if let Err(err) = result {
            warn!(
                notification_id = %notification.id,
                error = %err,
                "通知实时投递事件发布失败"
            );
        }
    }

    /// 逐个尝试所有接收者；有失败时在全部尝试后返回最后一个错误
    async fn notify_each(
        &self,
        recipients: impl IntoIterator<Item = UserId>,
        kind: NotificationKind,
        source_actor_id: UserId,
        content_ref: ContentRef,
    ) -> ApplicationResult<Vec<Notification>> {
        let mut created = Vec::new();
        let mut last_error: Option<ApplicationError> = None;
        for recipient_id in recipients {
            match self
                .notify(recipient_id, kind, source_actor_id, content_ref)
                .await
            {
                Ok(Some(notification)) => created.push(notification),
                Ok(None) => {}
                Err(err) => {
                    warn!(recipient_id = %recipient_id, kind = %kind, error = %err, "创建通知失败");
                    last_error = Some(err);
                }
            }
        }
        match last_error {
            Some(err) => Err(err),
            None => Ok(created),
        }
    }

    /// 新帖通知所有其他活跃用户。
    ///
    /// 没有关注关系，这是全量广播，用户量大时代价很高。
    pub async fn on_post_created(&self, post: &PostPayload) -> ApplicationResult<Vec<Notification>> {
        let recipients: Vec<UserId> = self
            .users
            .list_active_ids()
            .await?
            .into_iter()
            .filter(|id| *id != post.author_id)
            .collect();
        info!(
            post_id = %post.post_id,
            recipients = recipients.len(),
            "新帖全量通知"
        );
        self.notify_each(
            recipients,
            NotificationKind::NewPost,
            post.author_id,
            ContentRef::post(post.post_id),
        )
        .await
    }

    /// 只有点赞（而非取消）且点赞者不是作者时通知作者
    pub async fn on_like_toggled(&self, like: &LikePayload) -> ApplicationResult<Option<Notification>> {
        if !like.liked {
            return Ok(None);
        }
        let Some(owner) = self.content.post_author(like.post_id).await? else {
            debug!(post_id = %like.post_id, "帖子不存在，跳过点赞通知");
            return Ok(None);
        };
        self.notify(
            owner,
            NotificationKind::Like,
            like.actor_id,
            ContentRef::post(like.post_id),
        )
        .await
    }

    /// 通知帖子作者，回复时再通知父评论作者；去重并排除评论者本人
    pub async fn on_comment_created(
        &self,
        comment: &CommentPayload,
    ) -> ApplicationResult<Vec<Notification>> {
        let mut recipients = BTreeSet::new();
        if let Some(owner) = self.content.post_author(comment.post_id).await? {
            recipients.insert(owner);
        }
        if let Some(parent_id) = comment.parent_comment_id {
            if let Some(parent_owner) = self.content.comment_author(parent_id).await? {
                recipients.insert(parent_owner);
            }
        }
        recipients.remove(&comment.author_id);

        self.notify_each(
            recipients,
            NotificationKind::Comment,
            comment.author_id,
            ContentRef::comment(comment.post_id, comment.comment_id),
        )
        .await
    }

    /// 每个被提及的用户一条提及通知，与评论通知相互独立
    pub async fn on_mentions(
        &self,
        target: MentionTarget,
        post_id: PostId,
        author_id: UserId,
        mentioned: &BTreeSet<UserId>,
    ) -> ApplicationResult<Vec<Notification>> {
        let content_ref = match target.target_type {
            TargetType::Comment => ContentRef::comment(post_id, CommentId::from(target.target_id)),
            TargetType::Post | TargetType::Message => ContentRef::post(post_id),
        };
        self.notify_each(
            mentioned.iter().copied(),
            NotificationKind::Mention,
            author_id,
            content_ref,
        )
        .await
    }

    pub async fn on_direct_message(
        &self,
        message: &DirectMessagePayload,
    ) -> ApplicationResult<Option<Notification>> {
        self.notify(
            message.recipient_id,
            NotificationKind::DirectMessage,
            message.sender_id,
            ContentRef::message(message.message_id),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::commit_gate::CommitGate;
    use crate::dispatcher::EventSink;
    use crate::error::DispatchError;
    use domain::{
        DomainEvent, MockContentDirectory, MockNotificationRepository, MockUserDirectory,
        RepositoryError,
    };
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording(Mutex<Vec<Arc<DomainEvent>>>);

    impl EventSink for Recording {
        fn dispatch(&self, event: Arc<DomainEvent>) -> Result<(), DispatchError> {
            self.0.lock().unwrap().push(event);
            Ok(())
        }
    }

    struct Fixture {
        notifications: MockNotificationRepository,
        users: MockUserDirectory,
        content: MockContentDirectory,
    }

    impl Fixture {
        fn new() -> Self {
            let mut notifications = MockNotificationRepository::new();
            notifications.expect_count_unread().returning(|_| Ok(1));
            Self {
                notifications,
                users: MockUserDirectory::new(),
                content: MockContentDirectory::new(),
            }
        }

        fn build(self) -> (Arc<Recording>, NotificationFanout) {
            let sink = Arc::new(Recording::default());
            let publisher = EventPublisher::new(Arc::new(CommitGate::new(sink.clone())));
            let fanout = NotificationFanout::new(
                Arc::new(self.notifications),
                Arc::new(self.users),
                Arc::new(self.content),
                publisher,
                Arc::new(SystemClock),
            );
            (sink, fanout)
        }
    }

    fn like(actor: UserId, liked: bool) -> LikePayload {
        LikePayload {
            post_id: PostId::generate(),
            actor_id: actor,
            liked,
            like_count: 1,
        }
    }

    #[tokio::test]
    async fn self_addressed_notify_creates_nothing() {
        let mut fixture = Fixture::new();
        fixture.notifications.expect_insert().never();
        let (sink, fanout) = fixture.build();
        let me = UserId::generate();

        let result = fanout
            .notify(me, NotificationKind::Like, me, ContentRef::post(PostId::generate()))
            .await
            .unwrap();
        assert!(result.is_none());
        assert!(sink.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn like_notifies_owner_only_when_added() {
        let owner = UserId::generate();
        let mut fixture = Fixture::new();
        fixture
            .content
            .expect_post_author()
            .returning(move |_| Ok(Some(owner)));
        fixture.notifications.expect_insert().times(1).returning(|_| Ok(()));
        let (sink, fanout) = fixture.build();
        let fan = UserId::generate();

        assert!(fanout.on_like_toggled(&like(fan, false)).await.unwrap().is_none());
        let created = fanout.on_like_toggled(&like(fan, true)).await.unwrap();
        let created = created.expect("notification");
        assert_eq!(created.recipient_id, owner);
        assert_eq!(created.kind, NotificationKind::Like);

        // 作者给自己点赞不通知
        assert!(fanout.on_like_toggled(&like(owner, true)).await.unwrap().is_none());

        let emitted = sink.0.lock().unwrap();
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].kind(), EventKind::NotificationReady);
    }

    #[tokio::test]
    async fn reply_notifies_post_and_parent_owner_once_each() {
        let post_owner = UserId::generate();
        let parent_owner = UserId::generate();
        let mut fixture = Fixture::new();
        fixture
            .content
            .expect_post_author()
            .returning(move |_| Ok(Some(post_owner)));
        fixture
            .content
            .expect_comment_author()
            .returning(move |_| Ok(Some(parent_owner)));
        fixture.notifications.expect_insert().times(2).returning(|_| Ok(()));
        let (_, fanout) = fixture.build();

        let comment = CommentPayload {
            post_id: PostId::generate(),
            comment_id: CommentId::generate(),
            parent_comment_id: Some(CommentId::generate()),
            author_id: UserId::generate(),
            content: "reply".into(),
        };
        let created = fanout.on_comment_created(&comment).await.unwrap();
        let recipients: BTreeSet<_> = created.iter().map(|n| n.recipient_id).collect();
        assert_eq!(recipients, BTreeSet::from([post_owner, parent_owner]));
        assert!(created.iter().all(|n| n.kind == NotificationKind::Comment));
    }

    #[tokio::test]
    async fn reply_to_own_thread_on_own_post_notifies_nobody() {
        let author = UserId::generate();
        let mut fixture = Fixture::new();
        fixture
            .content
            .expect_post_author()
            .returning(move |_| Ok(Some(author)));
        fixture
            .content
            .expect_comment_author()
            .returning(move |_| Ok(Some(author)));
        fixture.notifications.expect_insert().never();
        let (_, fanout) = fixture.build();

        let comment = CommentPayload {
            post_id: PostId::generate(),
            comment_id: CommentId::generate(),
            parent_comment_id: Some(CommentId::generate()),
            author_id: author,
            content: "me again".into(),
        };
        assert!(fanout.on_comment_created(&comment).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn new_post_fans_out_to_everyone_else() {
        let author = UserId::generate();
        let others = [UserId::generate(), UserId::generate()];
        let mut fixture = Fixture::new();
        let all = vec![author, others[0], others[1]];
        fixture
            .users
            .expect_list_active_ids()
            .returning(move || Ok(all.clone()));
        fixture.notifications.expect_insert().times(2).returning(|_| Ok(()));
        let (_, fanout) = fixture.build();

        let created = fanout
            .on_post_created(&PostPayload {
                post_id: PostId::generate(),
                author_id: author,
                content: "hello".into(),
            })
            .await
            .unwrap();
        assert_eq!(created.len(), 2);
        assert!(created.iter().all(|n| n.recipient_id != author));
    }

    #[tokio::test]
    async fn persistence_failure_is_reported_after_trying_everyone() {
        let mut fixture = Fixture::new();
        let recipients = vec![UserId::generate(), UserId::generate(), UserId::generate()];
        let failing = recipients[1];
        let listed = recipients.clone();
        fixture
            .users
            .expect_list_active_ids()
            .returning(move || Ok(listed.clone()));
        fixture.notifications.expect_insert().times(3).returning(move |n| {
            if n.recipient_id == failing {
                Err(RepositoryError::storage("disk full"))
            } else {
                Ok(())
            }
        });
        let (sink, fanout) = fixture.build();

        let result = fanout
            .on_post_created(&PostPayload {
                post_id: PostId::generate(),
                author_id: UserId::generate(),
                content: "hello".into(),
            })
            .await;
        assert!(matches!(result, Err(ApplicationError::Repository(_))));
        assert_eq!(sink.0.lock().unwrap().len(), 2);
    }
}
