//! 在线状态与输入状态
//!
//! 两者都是由最近活动时间推导出的启发式状态，不代表真实的连接。

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::value_objects::{Timestamp, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEntry {
    pub user_id: UserId,
    pub last_activity_at: Timestamp,
}

impl PresenceEntry {
    pub fn new(user_id: UserId, last_activity_at: Timestamp) -> Self {
        Self {
            user_id,
            last_activity_at,
        }
    }

    /// `now - last_activity_at < window`
    pub fn is_online_at(&self, now: Timestamp, window: Duration) -> bool {
        now.signed_duration_since(self.last_activity_at) < window
    }
}

/// `user_id` 正在给 `counterpart_id` 输入
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingEntry {
    pub user_id: UserId,
    pub counterpart_id: UserId,
    pub updated_at: Timestamp,
}

impl TypingEntry {
    /// 超过 `timeout` 没有刷新即视为已停止输入
    pub fn is_fresh_at(&self, now: Timestamp, timeout: Duration) -> bool {
        now.signed_duration_since(self.updated_at) < timeout
    }
}
