//! 内存实现的持久化协作方，用于测试和单机演示

use std::collections::HashMap;

use async_trait::async_trait;
use domain::{
    CommentId, ContentDirectory, Handle, Mention, MentionRepository, MentionTarget, Notification,
    NotificationId, NotificationRepository, Pagination, PostId, RepositoryResult, UserDirectory,
    UserId, UserSummary,
};
use tokio::sync::RwLock;

#[derive(Default)]
struct State {
    users: HashMap<UserId, UserSummary>,
    posts: HashMap<PostId, UserId>,
    comments: HashMap<CommentId, (PostId, UserId)>,
    notifications: Vec<Notification>,
    mentions: HashMap<MentionTarget, Vec<Mention>>,
}

/// 所有仓储接口共用一把锁，提及替换天然是原子的
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, handle: Handle, is_active: bool) -> UserId {
        let id = UserId::generate();
        self.state.write().await.users.insert(
            id,
            UserSummary {
                id,
                handle,
                is_active,
            },
        );
        id
    }

    pub async fn add_post(&self, author_id: UserId) -> PostId {
        let id = PostId::generate();
        self.state.write().await.posts.insert(id, author_id);
        id
    }

    pub async fn add_comment(&self, post_id: PostId, author_id: UserId) -> CommentId {
        let id = CommentId::generate();
        self.state
            .write()
            .await
            .comments
            .insert(id, (post_id, author_id));
        id
    }

    pub async fn remove_post(&self, post_id: PostId) {
        let mut state = self.state.write().await;
        state.posts.remove(&post_id);
        state.comments.retain(|_, (post, _)| *post != post_id);
    }

    pub async fn notifications_for(&self, recipient_id: UserId) -> Vec<Notification> {
        self.state
            .read()
            .await
            .notifications
            .iter()
            .filter(|n| n.recipient_id == recipient_id)
            .cloned()
            .collect()
    }

    pub async fn notification_count(&self) -> usize {
        self.state.read().await.notifications.len()
    }
}

#[async_trait]
impl NotificationRepository for InMemoryStore {
    async fn insert(&self, notification: &Notification) -> RepositoryResult<()> {
        self.state
            .write()
            .await
            .notifications
            .push(notification.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: NotificationId) -> RepositoryResult<Option<Notification>> {
        Ok(self
            .state
            .read()
            .await
            .notifications
            .iter()
            .find(|n| n.id == id)
            .cloned())
    }

    async fn list_for_recipient(
        &self,
        recipient_id: UserId,
        pagination: Pagination,
        unread_only: bool,
    ) -> RepositoryResult<Vec<Notification>> {
        let state = self.state.read().await;
        let mut items: Vec<Notification> = state
            .notifications
            .iter()
            .filter(|n| n.recipient_id == recipient_id && (!unread_only || !n.is_read))
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(items
            .into_iter()
            .skip(pagination.offset as usize)
            .take(pagination.limit as usize)
            .collect())
    }

    async fn count_unread(&self, recipient_id: UserId) -> RepositoryResult<u64> {
        Ok(self
            .state
            .read()
            .await
            .notifications
            .iter()
            .filter(|n| n.recipient_id == recipient_id && !n.is_read)
            .count() as u64)
    }

    async fn mark_read(&self, recipient_id: UserId, id: NotificationId) -> RepositoryResult<bool> {
        let mut state = self.state.write().await;
        match state
            .notifications
            .iter_mut()
            .find(|n| n.id == id && n.recipient_id == recipient_id)
        {
            Some(notification) => {
                notification.mark_as_read();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_all_read(&self, recipient_id: UserId) -> RepositoryResult<u64> {
        let mut state = self.state.write().await;
        let mut updated = 0;
        for notification in state
            .notifications
            .iter_mut()
            .filter(|n| n.recipient_id == recipient_id && !n.is_read)
        {
            notification.mark_as_read();
            updated += 1;
        }
        Ok(updated)
    }

    async fn delete(&self, recipient_id: UserId, id: NotificationId) -> RepositoryResult<bool> {
        let mut state = self.state.write().await;
        let before = state.notifications.len();
        state
            .notifications
            .retain(|n| !(n.id == id && n.recipient_id == recipient_id));
        Ok(state.notifications.len() < before)
    }

    async fn delete_read(&self, recipient_id: UserId) -> RepositoryResult<u64> {
        let mut state = self.state.write().await;
        let before = state.notifications.len();
        state
            .notifications
            .retain(|n| !(n.recipient_id == recipient_id && n.is_read));
        Ok((before - state.notifications.len()) as u64)
    }
}

#[async_trait]
impl MentionRepository for InMemoryStore {
    async fn replace_for_target(
        &self,
        target: MentionTarget,
        mentions: Vec<Mention>,
    ) -> RepositoryResult<()> {
        let mut state = self.state.write().await;
        if mentions.is_empty() {
            state.mentions.remove(&target);
        } else {
            state.mentions.insert(target, mentions);
        }
        Ok(())
    }

    async fn delete_for_target(&self, target: MentionTarget) -> RepositoryResult<u64> {
        Ok(self
            .state
            .write()
            .await
            .mentions
            .remove(&target)
            .map(|rows| rows.len() as u64)
            .unwrap_or(0))
    }

    async fn list_for_target(&self, target: MentionTarget) -> RepositoryResult<Vec<Mention>> {
        Ok(self
            .state
            .read()
            .await
            .mentions
            .get(&target)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl UserDirectory for InMemoryStore {
    async fn find_by_handle(&self, handle: &Handle) -> RepositoryResult<Option<UserSummary>> {
        Ok(self
            .state
            .read()
            .await
            .users
            .values()
            .find(|user| user.handle == *handle)
            .cloned())
    }

    async fn find_by_id(&self, id: UserId) -> RepositoryResult<Option<UserSummary>> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn list_active_ids(&self) -> RepositoryResult<Vec<UserId>> {
        Ok(self
            .state
            .read()
            .await
            .users
            .values()
            .filter(|user| user.is_active)
            .map(|user| user.id)
            .collect())
    }
}

#[async_trait]
impl ContentDirectory for InMemoryStore {
    async fn post_author(&self, post_id: PostId) -> RepositoryResult<Option<UserId>> {
        Ok(self.state.read().await.posts.get(&post_id).copied())
    }

    async fn comment_author(&self, comment_id: CommentId) -> RepositoryResult<Option<UserId>> {
        Ok(self
            .state
            .read()
            .await
            .comments
            .get(&comment_id)
            .map(|(_, author)| *author))
    }

    async fn comment_count(&self, post_id: PostId) -> RepositoryResult<u64> {
        Ok(self
            .state
            .read()
            .await
            .comments
            .values()
            .filter(|(post, _)| *post == post_id)
            .count() as u64)
    }
}
