//! 主题广播路由
//!
//! 订阅表同时维护主题到会话、会话到主题两个索引，二者在同一把锁下更新，
//! 读者不会看到只改了一半的订阅集合。主题没有层级，按字符串精确匹配。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use domain::{SessionId, Topic, TopicSubscription};
use futures::future::join_all;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::realtime::{RealtimePayload, TopicMessage};

#[derive(Debug, Error)]
pub enum DeliveryError {
    /// 会话已断开，属于正常情况
    #[error("session {0} is not connected")]
    Disconnected(SessionId),
    #[error("delivery failed: {0}")]
    Failed(String),
}

/// 传输层协作方：把一帧推给某个会话
#[async_trait]
pub trait SessionTransport: Send + Sync {
    async fn send_to_session(
        &self,
        session_id: SessionId,
        message: &TopicMessage,
    ) -> Result<(), DeliveryError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    /// 已断开的会话，其订阅已被移除
    pub unreachable: usize,
    pub failed: usize,
}

#[derive(Debug, Default)]
struct SubscriptionTable {
    by_topic: HashMap<Topic, HashSet<SessionId>>,
    by_session: HashMap<SessionId, HashSet<Topic>>,
}

impl SubscriptionTable {
    fn insert(&mut self, session_id: SessionId, topic: Topic) -> bool {
        let added = self
            .by_session
            .entry(session_id)
            .or_default()
            .insert(topic.clone());
        self.by_topic.entry(topic).or_default().insert(session_id);
        added
    }

    fn remove(&mut self, session_id: SessionId, topic: &Topic) -> bool {
        let removed = match self.by_session.get_mut(&session_id) {
            Some(topics) => {
                let removed = topics.remove(topic);
                if topics.is_empty() {
                    self.by_session.remove(&session_id);
                }
                removed
            }
            None => false,
        };
        if let Some(sessions) = self.by_topic.get_mut(topic) {
            sessions.remove(&session_id);
            if sessions.is_empty() {
                self.by_topic.remove(topic);
            }
        }
        removed
    }

    fn remove_session(&mut self, session_id: SessionId) -> Vec<TopicSubscription> {
        let Some(topics) = self.by_session.remove(&session_id) else {
            return Vec::new();
        };
        let mut removed = Vec::with_capacity(topics.len());
        for topic in topics {
            if let Some(sessions) = self.by_topic.get_mut(&topic) {
                sessions.remove(&session_id);
                if sessions.is_empty() {
                    self.by_topic.remove(&topic);
                }
            }
            removed.push(TopicSubscription { session_id, topic });
        }
        removed
    }
}

pub struct TopicRouter {
    table: RwLock<SubscriptionTable>,
    transport: Arc<dyn SessionTransport>,
    clock: Arc<dyn Clock>,
}

impl TopicRouter {
    pub fn new(transport: Arc<dyn SessionTransport>, clock: Arc<dyn Clock>) -> Self {
        Self {
            table: RwLock::new(SubscriptionTable::default()),
            transport,
            clock,
        }
    }

    /// 返回是否为新增订阅
    pub async fn subscribe(&self, session_id: SessionId, topic: Topic) -> bool {
        debug!(session_id = %session_id, topic = %topic, "订阅主题");
        self.table.write().await.insert(session_id, topic)
    }

    pub async fn unsubscribe(&self, session_id: SessionId, topic: &Topic) -> bool {
        debug!(session_id = %session_id, topic = %topic, "取消订阅");
        self.table.write().await.remove(session_id, topic)
    }

    /// 断开连接时调用，返回被移除的订阅
    pub async fn unsubscribe_all(&self, session_id: SessionId) -> Vec<TopicSubscription> {
        self.table.write().await.remove_session(session_id)
    }

    pub async fn subscribers(&self, topic: &Topic) -> Vec<SessionId> {
        self.table
            .read()
            .await
            .by_topic
            .get(topic)
            .map(|sessions| sessions.iter().copied().collect())
            .unwrap_or_default()
    }

    pub async fn topics_for(&self, session_id: SessionId) -> Vec<Topic> {
        let mut topics: Vec<Topic> = self
            .table
            .read()
            .await
            .by_session
            .get(&session_id)
            .map(|topics| topics.iter().cloned().collect())
            .unwrap_or_default();
        topics.sort();
        topics
    }

    /// 推送给当前订阅了该主题的所有会话；没有回放缓冲
    pub async fn publish(&self, topic: Topic, payload: RealtimePayload) -> PublishReport {
        // 先取快照，发送时不持有锁
        let sessions = self.subscribers(&topic).await;
        if sessions.is_empty() {
            return PublishReport::default();
        }

        let message = TopicMessage {
            topic,
            payload,
            sent_at: self.clock.now(),
        };
        let results = join_all(sessions.iter().map(|session_id| {
            let message = &message;
            async move {
                (
                    *session_id,
                    self.transport.send_to_session(*session_id, message).await,
                )
            }
        }))
        .await;

        let mut report = PublishReport::default();
        for (session_id, result) in results {
            match result {
                Ok(()) => report.delivered += 1,
                Err(DeliveryError::Disconnected(_)) => {
                    debug!(session_id = %session_id, topic = %message.topic, "会话已断开，移除订阅");
                    self.unsubscribe_all(session_id).await;
                    report.unreachable += 1;
                }
                Err(err) => {
                    warn!(
                        session_id = %session_id,
                        topic = %message.topic,
                        error = %err,
                        "实时推送失败"
                    );
                    report.failed += 1;
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use domain::PostId;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeTransport {
        sent: Mutex<Vec<(SessionId, String)>>,
        disconnected: Mutex<HashSet<SessionId>>,
    }

    #[async_trait]
    impl SessionTransport for FakeTransport {
        async fn send_to_session(
            &self,
            session_id: SessionId,
            message: &TopicMessage,
        ) -> Result<(), DeliveryError> {
            if self.disconnected.lock().unwrap().contains(&session_id) {
                return Err(DeliveryError::Disconnected(session_id));
            }
            self.sent
                .lock()
                .unwrap()
                .push((session_id, message.topic.to_string()));
            Ok(())
        }
    }

    fn router() -> (Arc<FakeTransport>, TopicRouter) {
        let transport = Arc::new(FakeTransport::default());
        let router = TopicRouter::new(transport.clone(), Arc::new(SystemClock));
        (transport, router)
    }

    fn like(post_id: PostId) -> RealtimePayload {
        RealtimePayload::LikeUpdated {
            post_id,
            like_count: 1,
        }
    }

    #[tokio::test]
    async fn publish_is_exact_match_not_hierarchical() {
        let (transport, router) = router();
        let post = PostId::generate();
        let (a, b) = (SessionId::generate(), SessionId::generate());
        router.subscribe(a, Topic::post(post)).await;
        router.subscribe(b, Topic::post_comments(post)).await;

        let report = router.publish(Topic::post(post), like(post)).await;
        assert_eq!(report.delivered, 1);
        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, a);
    }

    #[tokio::test]
    async fn both_indices_stay_consistent() {
        let (_, router) = router();
        let post = PostId::generate();
        let session = SessionId::generate();

        assert!(router.subscribe(session, Topic::post(post)).await);
        assert!(!router.subscribe(session, Topic::post(post)).await);
        router.subscribe(session, Topic::feed()).await;
        assert_eq!(router.topics_for(session).await.len(), 2);

        assert!(router.unsubscribe(session, &Topic::post(post)).await);
        assert!(router.subscribers(&Topic::post(post)).await.is_empty());
        assert_eq!(router.topics_for(session).await, vec![Topic::feed()]);

        assert_eq!(
            router.unsubscribe_all(session).await,
            vec![TopicSubscription {
                session_id: session,
                topic: Topic::feed()
            }]
        );
        assert!(router.subscribers(&Topic::feed()).await.is_empty());
        assert!(router.topics_for(session).await.is_empty());
    }

    #[tokio::test]
    async fn disconnected_sessions_are_dropped_quietly() {
        let (transport, router) = router();
        let post = PostId::generate();
        let (live, gone) = (SessionId::generate(), SessionId::generate());
        router.subscribe(live, Topic::post(post)).await;
        router.subscribe(gone, Topic::post(post)).await;
        router.subscribe(gone, Topic::feed()).await;
        transport.disconnected.lock().unwrap().insert(gone);

        let report = router.publish(Topic::post(post), like(post)).await;
        assert_eq!(
            report,
            PublishReport {
                delivered: 1,
                unreachable: 1,
                failed: 0
            }
        );
        assert!(router.topics_for(gone).await.is_empty());
        assert_eq!(router.subscribers(&Topic::post(post)).await, vec![live]);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_noop() {
        let (transport, router) = router();
        let report = router.publish(Topic::feed(), like(PostId::generate())).await;
        assert_eq!(report, PublishReport::default());
        assert!(transport.sent.lock().unwrap().is_empty());
    }
}
