//! 提交闸门
//!
//! 事件先挂在产生它的工作单元上，只有工作单元提交后才会交给分发器；
//! 回滚的工作单元上的事件永远不可见。

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use domain::{DomainEvent, UnitOfWorkId};
use tracing::{debug, warn};

use crate::dispatcher::EventSink;
use crate::error::GateError;

/// 闸门内部的排队项：事件与产生它的工作单元
#[derive(Debug)]
struct PendingDispatch {
    unit_of_work: UnitOfWorkId,
    event: Arc<DomainEvent>,
}

pub struct CommitGate {
    pending: Mutex<HashMap<UnitOfWorkId, Vec<PendingDispatch>>>,
    sink: Arc<dyn EventSink>,
}

impl CommitGate {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            sink,
        }
    }

    pub fn sink(&self) -> &Arc<dyn EventSink> {
        &self.sink
    }

    /// 开启一个工作单元；调用方必须以 `on_commit` 或 `on_rollback` 结算。
    /// 外部调用方一律通过 `guard` 开启
    pub(crate) fn begin(&self) -> UnitOfWorkId {
        let id = UnitOfWorkId::generate();
        self.lock().insert(id, Vec::new());
        debug!(unit_of_work = %id, "工作单元开始");
        id
    }

    /// 开启工作单元并返回守卫，守卫未结算就被丢弃时自动回滚
    pub fn guard(self: &Arc<Self>) -> UnitOfWorkGuard {
        UnitOfWorkGuard {
            gate: Arc::clone(self),
            id: self.begin(),
            settled: false,
        }
    }

    /// 把事件挂到活动的工作单元上
    pub fn enqueue(&self, unit_of_work: UnitOfWorkId, event: DomainEvent) -> Result<(), GateError> {
        let mut pending = self.lock();
        let queue = pending
            .get_mut(&unit_of_work)
            .ok_or(GateError::UnknownUnitOfWork(unit_of_work))?;
        debug!(
            unit_of_work = %unit_of_work,
            event_id = %event.id(),
            event_kind = %event.kind(),
            "事件挂起，等待提交"
        );
        queue.push(PendingDispatch {
            unit_of_work,
            event: Arc::new(event),
        });
        Ok(())
    }

    /// 按入队顺序释放事件，返回释放的数量。未知的工作单元（例如重复提交）是空操作
    pub fn on_commit(&self, unit_of_work: UnitOfWorkId) -> usize {
        // 先移出再分发，分发期间不持有锁
        let Some(released) = self.lock().remove(&unit_of_work) else {
            debug!(unit_of_work = %unit_of_work, "提交未知的工作单元，忽略");
            return 0;
        };

        let count = released.len();
        for entry in released {
            if let Err(err) = self.sink.dispatch(entry.event) {
                warn!(
                    unit_of_work = %entry.unit_of_work,
                    error = %err,
                    "已提交事件未能进入分发队列"
                );
            }
        }
        debug!(unit_of_work = %unit_of_work, released = count, "工作单元已提交");
        count
    }

    /// 丢弃该工作单元上挂起的所有事件，返回丢弃数量
    pub fn on_rollback(&self, unit_of_work: UnitOfWorkId) -> usize {
        let discarded = self
            .lock()
            .remove(&unit_of_work)
            .map(|events| events.len())
            .unwrap_or(0);
        debug!(unit_of_work = %unit_of_work, discarded, "工作单元已回滚");
        discarded
    }

    pub fn is_active(&self, unit_of_work: UnitOfWorkId) -> bool {
        self.lock().contains_key(&unit_of_work)
    }

    /// 所有活动工作单元上挂起的事件总数
    pub fn pending_count(&self) -> usize {
        self.lock().values().map(Vec::len).sum()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<UnitOfWorkId, Vec<PendingDispatch>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// 工作单元守卫
pub struct UnitOfWorkGuard {
    gate: Arc<CommitGate>,
    id: UnitOfWorkId,
    settled: bool,
}

impl UnitOfWorkGuard {
    pub fn id(&self) -> UnitOfWorkId {
        self.id
    }

    pub fn commit(mut self) -> usize {
        self.settled = true;
        self.gate.on_commit(self.id)
    }

    pub fn rollback(mut self) -> usize {
        self.settled = true;
        self.gate.on_rollback(self.id)
    }
}

impl Drop for UnitOfWorkGuard {
    fn drop(&mut self) {
        if !self.settled {
            self.gate.on_rollback(self.id);
        }
    }
}

/// 在工作单元中执行 `work`：成功则提交，失败则回滚。
///
/// 持久化协作方在自己的事务提交 / 回滚之后调用同样的钩子。
pub async fn with_unit_of_work<F, Fut, T, E>(gate: &Arc<CommitGate>, work: F) -> Result<T, E>
where
    F: FnOnce(UnitOfWorkId) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let guard = gate.guard();
    match work(guard.id()).await {
        Ok(value) => {
            guard.commit();
            Ok(value)
        }
        Err(err) => {
            guard.rollback();
            Err(err)
        }
    }
}
