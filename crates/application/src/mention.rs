//! `@handle` 提及解析

use std::collections::BTreeSet;
use std::sync::Arc;

use domain::{
    Handle, Mention, MentionRepository, MentionTarget, RepositoryResult, UserDirectory, UserId,
};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::clock::Clock;

// `@` 前面不能紧跟单词字符，`user@example.com` 不算提及
static HANDLE_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[^A-Za-z0-9_])@([A-Za-z0-9_]+)").expect("Failed to compile regex")
});

/// 从文本中提取候选 handle，已去重。超长的 token 直接忽略
pub fn extract_handles(text: &str) -> BTreeSet<Handle> {
    HANDLE_TOKEN
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| Handle::parse(m.as_str()).ok())
        .collect()
}

pub struct MentionResolver {
    users: Arc<dyn UserDirectory>,
    mentions: Arc<dyn MentionRepository>,
    clock: Arc<dyn Clock>,
}

impl MentionResolver {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        mentions: Arc<dyn MentionRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            users,
            mentions,
            clock,
        }
    }

    /// 把候选 handle 解析为用户。未知或停用的 handle 静默丢弃，作者本人被排除
    pub async fn resolve(
        &self,
        candidates: &BTreeSet<Handle>,
        author_id: UserId,
    ) -> RepositoryResult<BTreeSet<UserId>> {
        let mut resolved = BTreeSet::new();
        for handle in candidates {
            match self.users.find_by_handle(handle).await? {
                Some(user) if user.is_active && user.id != author_id => {
                    resolved.insert(user.id);
                }
                Some(_) => {}
                None => debug!(handle = %handle, "提及了未知用户，忽略"),
            }
        }
        Ok(resolved)
    }

    pub async fn resolve_text(
        &self,
        text: &str,
        author_id: UserId,
    ) -> RepositoryResult<BTreeSet<UserId>> {
        self.resolve(&extract_handles(text), author_id).await
    }

    /// 用新集合整体替换目标上的提及，重复调用结果不变
    pub async fn reconcile(
        &self,
        target: MentionTarget,
        author_id: UserId,
        mentioned: &BTreeSet<UserId>,
    ) -> RepositoryResult<Vec<Mention>> {
        let now = self.clock.now();
        let rows: Vec<Mention> = mentioned
            .iter()
            .filter(|id| **id != author_id)
            .map(|id| Mention::new(author_id, target, *id, now))
            .collect();

        self.mentions
            .replace_for_target(target, rows.clone())
            .await?;
        debug!(
            target_type = %target.target_type,
            target_id = %target.target_id,
            count = rows.len(),
            "提及已更新"
        );
        Ok(rows)
    }

    /// 内容删除时清理全部提及
    pub async fn clear(&self, target: MentionTarget) -> RepositoryResult<u64> {
        self.mentions.delete_for_target(target).await
    }

    pub async fn mentions_for(&self, target: MentionTarget) -> RepositoryResult<Vec<Mention>> {
        self.mentions.list_for_target(target).await
    }
}
