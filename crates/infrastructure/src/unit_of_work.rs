//! 数据库事务与提交闸门的绑定
//!
//! 事务提交成功后才放行该工作单元内发布的事件；提交失败、显式回滚或提前丢弃都会丢弃它们。

use std::sync::Arc;

use application::{CommitGate, UnitOfWorkGuard};
use domain::{OriginContext, RepositoryError, UnitOfWorkId, UserId};
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use tracing::debug;

use crate::repository::map_sqlx_err;

pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
    guard: UnitOfWorkGuard,
}

impl PgUnitOfWork {
    pub async fn begin(pool: &PgPool, gate: &Arc<CommitGate>) -> Result<Self, RepositoryError> {
        let tx = pool.begin().await.map_err(map_sqlx_err)?;
        Ok(Self {
            tx,
            guard: gate.guard(),
        })
    }

    pub fn id(&self) -> UnitOfWorkId {
        self.guard.id()
    }

    /// 生产者发布事件时使用的来源上下文
    pub fn origin(&self, actor_id: UserId) -> OriginContext {
        OriginContext::actor(actor_id).with_unit_of_work(self.id())
    }

    pub fn connection(&mut self) -> &mut PgConnection {
        &mut *self.tx
    }

    /// 返回放行的事件数量
    pub async fn commit(self) -> Result<usize, RepositoryError> {
        let Self { tx, guard } = self;
        // 提交失败时 guard 被丢弃，等同回滚
        tx.commit().await.map_err(map_sqlx_err)?;
        let released = guard.commit();
        debug!(released, "事务已提交");
        Ok(released)
    }

    pub async fn rollback(self) -> Result<usize, RepositoryError> {
        let Self { tx, guard } = self;
        let discarded = guard.rollback();
        tx.rollback().await.map_err(map_sqlx_err)?;
        Ok(discarded)
    }
}
