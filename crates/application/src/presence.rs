use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{PresenceEntry, Timestamp, TypingEntry, UserId};
use tokio::sync::RwLock;

use crate::clock::Clock;

/// 在线判定参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceSettings {
    /// `now - last_activity_at` 小于该窗口即视为在线
    pub online_window: chrono::Duration,
    /// 输入状态超过该时长未刷新即视为停止
    pub typing_timeout: chrono::Duration,
}

impl Default for PresenceSettings {
    fn default() -> Self {
        Self {
            online_window: chrono::Duration::seconds(300),
            typing_timeout: chrono::Duration::seconds(5),
        }
    }
}

impl From<&config::PresenceConfig> for PresenceSettings {
    fn from(value: &config::PresenceConfig) -> Self {
        // chrono 的秒数上限是 i64::MAX / 1000
        let secs = |v: u64| chrono::Duration::seconds(v.min(i64::MAX as u64 / 1000) as i64);
        Self {
            online_window: secs(value.online_window_secs),
            typing_timeout: secs(value.typing_timeout_secs),
        }
    }
}

/// 在线与输入状态登记表
///
/// 状态完全由最近活动时间推导，查询时计算，没有上下线推送。
#[async_trait]
pub trait PresenceRegistry: Send + Sync {
    /// 任何已认证操作和心跳都会调用
    async fn touch(&self, user_id: UserId);

    async fn is_online(&self, user_id: UserId) -> bool;

    /// 从候选中筛出在线用户，保持输入顺序
    async fn online_users(&self, candidates: &[UserId]) -> Vec<UserId>;

    async fn last_seen(&self, user_id: UserId) -> Option<Timestamp>;

    /// `is_typing == false` 立即清除；登记表本身从不过期条目
    async fn set_typing(&self, user_id: UserId, counterpart_id: UserId, is_typing: bool);

    /// 过期条目按未输入处理
    async fn is_typing(&self, user_id: UserId, counterpart_id: UserId) -> bool;
}

/// 内存实现的在线状态登记表
pub struct InMemoryPresenceRegistry {
    activity: RwLock<HashMap<UserId, PresenceEntry>>,
    typing: RwLock<HashMap<(UserId, UserId), TypingEntry>>,
    settings: PresenceSettings,
    clock: Arc<dyn Clock>,
}

impl InMemoryPresenceRegistry {
    pub fn new(settings: PresenceSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            activity: RwLock::new(HashMap::new()),
            typing: RwLock::new(HashMap::new()),
            settings,
            clock,
        }
    }

    pub fn settings(&self) -> PresenceSettings {
        self.settings
    }
}

#[async_trait]
impl PresenceRegistry for InMemoryPresenceRegistry {
    async fn touch(&self, user_id: UserId) {
        let now = self.clock.now();
        self.activity
            .write()
            .await
            .insert(user_id, PresenceEntry::new(user_id, now));
        tracing::trace!(user_id = %user_id, "刷新活动时间");
    }

    async fn is_online(&self, user_id: UserId) -> bool {
        let now = self.clock.now();
        self.activity
            .read()
            .await
            .get(&user_id)
            .is_some_and(|entry| entry.is_online_at(now, self.settings.online_window))
    }

    async fn online_users(&self, candidates: &[UserId]) -> Vec<UserId> {
        let now = self.clock.now();
        let activity = self.activity.read().await;
        candidates
            .iter()
            .copied()
            .filter(|id| {
                activity
                    .get(id)
                    .is_some_and(|entry| entry.is_online_at(now, self.settings.online_window))
            })
            .collect()
    }

    async fn last_seen(&self, user_id: UserId) -> Option<Timestamp> {
        self.activity
            .read()
            .await
            .get(&user_id)
            .map(|entry| entry.last_activity_at)
    }

    async fn set_typing(&self, user_id: UserId, counterpart_id: UserId, is_typing: bool) {
        let mut typing = self.typing.write().await;
        if is_typing {
            typing.insert(
                (user_id, counterpart_id),
                TypingEntry {
                    user_id,
                    counterpart_id,
                    updated_at: self.clock.now(),
                },
            );
        } else {
            typing.remove(&(user_id, counterpart_id));
        }
    }

    async fn is_typing(&self, user_id: UserId, counterpart_id: UserId) -> bool {
        let now = self.clock.now();
        self.typing
            .read()
            .await
            .get(&(user_id, counterpart_id))
            .is_some_and(|entry| entry.is_fresh_at(now, self.settings.typing_timeout))
    }
}
