//! 事件发布入口
//!
//! 生产者唯一的入口。负载在这里同步校验，校验失败直接返回给生产者；
//! 带工作单元的事件经过提交闸门，不带的（处理器产生的次级事件）直接进入分发队列。

use std::sync::Arc;

use domain::{DomainEvent, EventId, EventKind, EventPayload, OriginContext, UnitOfWorkId};
use tracing::debug;

use crate::commit_gate::CommitGate;
use crate::error::ApplicationResult;

#[derive(Clone)]
pub struct EventPublisher {
    gate: Arc<CommitGate>,
}

impl EventPublisher {
    pub fn new(gate: Arc<CommitGate>) -> Self {
        Self { gate }
    }

    pub fn gate(&self) -> &Arc<CommitGate> {
        &self.gate
    }

    /// 在工作单元 `unit_of_work` 中发布事件，提交后才会被处理
    pub fn publish(
        &self,
        unit_of_work: UnitOfWorkId,
        origin: OriginContext,
        kind: EventKind,
        payload: EventPayload,
    ) -> ApplicationResult<EventId> {
        let event = DomainEvent::new(kind, payload, origin.with_unit_of_work(unit_of_work))?;
        self.publish_event(event)
    }

    /// 发布已构造好的事件；按 `origin.unit_of_work` 决定是否经过闸门
    pub fn publish_event(&self, event: DomainEvent) -> ApplicationResult<EventId> {
        let id = event.id();
        match event.origin().unit_of_work {
            Some(unit_of_work) => self.gate.enqueue(unit_of_work, event)?,
            None => {
                debug!(event_id = %id, event_kind = %event.kind(), "发布次级事件");
                // 队列满时分发器已记录并丢弃，这对生产者不是错误
                let _ = self.gate.sink().dispatch(Arc::new(event));
            }
        }
        Ok(id)
    }

    /// 不依附任何工作单元，立即进入分发队列
    pub fn publish_detached(
        &self,
        origin: OriginContext,
        kind: EventKind,
        payload: EventPayload,
    ) -> ApplicationResult<EventId> {
        let mut origin = origin;
        origin.unit_of_work = None;
        self.publish_event(DomainEvent::new(kind, payload, origin)?)
    }
}
