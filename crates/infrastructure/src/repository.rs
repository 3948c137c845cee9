use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    CommentId, ContentDirectory, ContentRef, Handle, Mention, MentionRepository, MentionTarget,
    Notification, NotificationId, NotificationKind, NotificationRepository, Pagination, PostId,
    RepositoryError, RepositoryResult, TargetType, UserDirectory, UserId, UserSummary,
};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use uuid::Uuid;

pub(crate) fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    RepositoryError::storage_with_source("database operation failed", err)
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

fn to_count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

#[derive(Debug, FromRow)]
struct NotificationRecord {
    id: Uuid,
    recipient_id: Uuid,
    kind: String,
    source_actor_id: Uuid,
    target_type: String,
    target_id: Uuid,
    post_id: Option<Uuid>,
    is_read: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<NotificationRecord> for Notification {
    type Error = RepositoryError;

    fn try_from(value: NotificationRecord) -> Result<Self, Self::Error> {
        let kind: NotificationKind = value
            .kind
            .parse()
            .map_err(|err: domain::DomainError| invalid_data(err.to_string()))?;
        let target_type: TargetType = value
            .target_type
            .parse()
            .map_err(|err: domain::DomainError| invalid_data(err.to_string()))?;

        Ok(Notification {
            id: NotificationId::from(value.id),
            recipient_id: UserId::from(value.recipient_id),
            kind,
            source_actor_id: UserId::from(value.source_actor_id),
            content_ref: ContentRef {
                target_type,
                target_id: value.target_id,
                post_id: value.post_id.map(PostId::from),
            },
            is_read: value.is_read,
            created_at: value.created_at,
        })
    }
}

const NOTIFICATION_COLUMNS: &str =
    "id, recipient_id, kind, source_actor_id, target_type, target_id, post_id, is_read, created_at";

#[derive(Clone)]
pub struct PgNotificationRepository {
    pool: PgPool,
}

impl PgNotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationRepository for PgNotificationRepository {
    async fn insert(&self, notification: &Notification) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications
                (id, recipient_id, kind, source_actor_id, target_type, target_id, post_id, is_read, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(Uuid::from(notification.id))
        .bind(Uuid::from(notification.recipient_id))
        .bind(notification.kind.as_str())
        .bind(Uuid::from(notification.source_actor_id))
        .bind(notification.content_ref.target_type.as_str())
        .bind(notification.content_ref.target_id)
        .bind(notification.content_ref.post_id.map(Uuid::from))
        .bind(notification.is_read)
        .bind(notification.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn find_by_id(&self, id: NotificationId) -> RepositoryResult<Option<Notification>> {
        let record = sqlx::query_as::<_, NotificationRecord>(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = $1"
        ))
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        record.map(Notification::try_from).transpose()
    }

    async fn list_for_recipient(
        &self,
        recipient_id: UserId,
        pagination: Pagination,
        unread_only: bool,
    ) -> RepositoryResult<Vec<Notification>> {
        let records = sqlx::query_as::<_, NotificationRecord>(&format!(
            r#"
            SELECT {NOTIFICATION_COLUMNS}
            FROM notifications
            WHERE recipient_id = $1 AND ($2 = FALSE OR is_read = FALSE)
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(Uuid::from(recipient_id))
        .bind(unread_only)
        .bind(i64::from(pagination.limit))
        .bind(i64::from(pagination.offset))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(Notification::try_from).collect()
    }

    async fn count_unread(&self, recipient_id: UserId) -> RepositoryResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = $1 AND is_read = FALSE",
        )
        .bind(Uuid::from(recipient_id))
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(to_count(count))
    }

    async fn mark_read(&self, recipient_id: UserId, id: NotificationId) -> RepositoryResult<bool> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE WHERE id = $1 AND recipient_id = $2",
        )
        .bind(Uuid::from(id))
        .bind(Uuid::from(recipient_id))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_all_read(&self, recipient_id: UserId) -> RepositoryResult<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE WHERE recipient_id = $1 AND is_read = FALSE",
        )
        .bind(Uuid::from(recipient_id))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(result.rows_affected())
    }

    async fn delete(&self, recipient_id: UserId, id: NotificationId) -> RepositoryResult<bool> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND recipient_id = $2")
            .bind(Uuid::from(id))
            .bind(Uuid::from(recipient_id))
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_read(&self, recipient_id: UserId) -> RepositoryResult<u64> {
        let result =
            sqlx::query("DELETE FROM notifications WHERE recipient_id = $1 AND is_read = TRUE")
                .bind(Uuid::from(recipient_id))
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_err)?;
        Ok(result.rows_affected())
    }
}

#[derive(Debug, FromRow)]
struct MentionRecord {
    mentioning_user_id: Uuid,
    target_type: String,
    target_id: Uuid,
    mentioned_user_id: Uuid,
    created_at: DateTime<Utc>,
}

impl TryFrom<MentionRecord> for Mention {
    type Error = RepositoryError;

    fn try_from(value: MentionRecord) -> Result<Self, Self::Error> {
        let target_type: TargetType = value
            .target_type
            .parse()
            .map_err(|err: domain::DomainError| invalid_data(err.to_string()))?;
        Ok(Mention {
            mentioning_user_id: UserId::from(value.mentioning_user_id),
            target: MentionTarget {
                target_type,
                target_id: value.target_id,
            },
            mentioned_user_id: UserId::from(value.mentioned_user_id),
            created_at: value.created_at,
        })
    }
}

#[derive(Clone)]
pub struct PgMentionRepository {
    pool: PgPool,
}

impl PgMentionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MentionRepository for PgMentionRepository {
    async fn replace_for_target(
        &self,
        target: MentionTarget,
        mentions: Vec<Mention>,
    ) -> RepositoryResult<()> {
        // 删除和插入在同一事务里，并发读者看不到中间状态
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        sqlx::query("DELETE FROM mentions WHERE target_type = $1 AND target_id = $2")
            .bind(target.target_type.as_str())
            .bind(target.target_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;

        for mention in &mentions {
            sqlx::query(
                r#"
                INSERT INTO mentions (mentioning_user_id, target_type, target_id, mentioned_user_id, created_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (target_type, target_id, mentioned_user_id) DO NOTHING
                "#,
            )
            .bind(Uuid::from(mention.mentioning_user_id))
            .bind(target.target_type.as_str())
            .bind(target.target_id)
            .bind(Uuid::from(mention.mentioned_user_id))
            .bind(mention.created_at)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;
        }

        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn delete_for_target(&self, target: MentionTarget) -> RepositoryResult<u64> {
        let result = sqlx::query("DELETE FROM mentions WHERE target_type = $1 AND target_id = $2")
            .bind(target.target_type.as_str())
            .bind(target.target_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(result.rows_affected())
    }

    async fn list_for_target(&self, target: MentionTarget) -> RepositoryResult<Vec<Mention>> {
        let records = sqlx::query_as::<_, MentionRecord>(
            r#"
            SELECT mentioning_user_id, target_type, target_id, mentioned_user_id, created_at
            FROM mentions
            WHERE target_type = $1 AND target_id = $2
            ORDER BY mentioned_user_id
            "#,
        )
        .bind(target.target_type.as_str())
        .bind(target.target_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(Mention::try_from).collect()
    }
}

#[derive(Debug, FromRow)]
struct UserRecord {
    id: Uuid,
    handle: String,
    is_active: bool,
}

impl TryFrom<UserRecord> for UserSummary {
    type Error = RepositoryError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        let handle = Handle::parse(value.handle).map_err(|err| invalid_data(err.to_string()))?;
        Ok(UserSummary {
            id: UserId::from(value.id),
            handle,
            is_active: value.is_active,
        })
    }
}

#[derive(Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_by_handle(&self, handle: &Handle) -> RepositoryResult<Option<UserSummary>> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT id, handle, is_active FROM users WHERE handle = $1",
        )
        .bind(handle.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        record.map(UserSummary::try_from).transpose()
    }

    async fn find_by_id(&self, id: UserId) -> RepositoryResult<Option<UserSummary>> {
        let record =
            sqlx::query_as::<_, UserRecord>("SELECT id, handle, is_active FROM users WHERE id = $1")
                .bind(Uuid::from(id))
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_err)?;
        record.map(UserSummary::try_from).transpose()
    }

    async fn list_active_ids(&self) -> RepositoryResult<Vec<UserId>> {
        let ids: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE is_active = TRUE")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(ids.into_iter().map(UserId::from).collect())
    }
}

#[derive(Clone)]
pub struct PgContentDirectory {
    pool: PgPool,
}

impl PgContentDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContentDirectory for PgContentDirectory {
    async fn post_author(&self, post_id: PostId) -> RepositoryResult<Option<UserId>> {
        let author: Option<Uuid> = sqlx::query_scalar(
            "SELECT author_id FROM posts WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(Uuid::from(post_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(author.map(UserId::from))
    }

    async fn comment_author(&self, comment_id: CommentId) -> RepositoryResult<Option<UserId>> {
        let author: Option<Uuid> = sqlx::query_scalar(
            "SELECT author_id FROM comments WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(Uuid::from(comment_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(author.map(UserId::from))
    }

    async fn comment_count(&self, post_id: PostId) -> RepositoryResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM comments WHERE post_id = $1 AND deleted_at IS NULL",
        )
        .bind(Uuid::from(post_id))
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(to_count(count))
    }
}

/// 所有 Postgres 仓储的集合
#[derive(Clone)]
pub struct PgStorage {
    pub pool: PgPool,
    pub notifications: Arc<PgNotificationRepository>,
    pub mentions: Arc<PgMentionRepository>,
    pub users: Arc<PgUserDirectory>,
    pub content: Arc<PgContentDirectory>,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self {
            notifications: Arc::new(PgNotificationRepository::new(pool.clone())),
            mentions: Arc::new(PgMentionRepository::new(pool.clone())),
            users: Arc::new(PgUserDirectory::new(pool.clone())),
            content: Arc::new(PgContentDirectory::new(pool.clone())),
            pool,
        }
    }
}

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}
