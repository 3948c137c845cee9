//! 异步事件分发器
//!
//! 固定数量的工作协程从有界队列中取事件，并为每个匹配的处理器启动独立任务。
//! 处理器之间互不影响：失败或 panic 只会被记录，既不影响兄弟处理器，
//! 也不会传回触发写入的调用方。

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use domain::{DomainEvent, EventKind};
use futures::FutureExt;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::error::{DispatchError, HandlerError};

/// 已提交事件的接收端。提交闸门只依赖这个接口，不依赖具体的分发实现
pub trait EventSink: Send + Sync {
    /// 立即返回，不等待处理器执行
    fn dispatch(&self, event: Arc<DomainEvent>) -> Result<(), DispatchError>;
}

/// 事件处理器
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// 用于日志
    fn name(&self) -> &'static str;

    fn handles(&self, kind: EventKind) -> bool;

    async fn handle(&self, event: Arc<DomainEvent>) -> Result<(), HandlerError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    pub workers: usize,
    pub queue_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 1024,
        }
    }
}

impl From<&config::DispatcherConfig> for DispatcherConfig {
    fn from(value: &config::DispatcherConfig) -> Self {
        Self {
            workers: value.workers.max(1),
            queue_capacity: value.queue_capacity.max(1),
        }
    }
}

/// 计数快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatcherStats {
    /// 成功入队的事件
    pub dispatched: u64,
    /// 因队列已满或已关闭被丢弃的事件
    pub dropped: u64,
    /// 成功完成的处理器运行次数
    pub completed: u64,
    /// 返回错误或 panic 的处理器运行次数
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    dispatched: AtomicU64,
    dropped: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

struct Shared {
    sender: mpsc::Sender<Arc<DomainEvent>>,
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
    counters: Counters,
    // 已入队但尚未处理完的事件数
    in_flight: AtomicUsize,
    idle: Notify,
    closed: AtomicBool,
}

impl Shared {
    fn finish_one(&self) {
        if self.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }

    fn handlers_for(&self, kind: EventKind) -> Vec<Arc<dyn EventHandler>> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|handler| handler.handles(kind))
            .cloned()
            .collect()
    }
}

/// 有界工作池分发器。克隆代价很低，所有克隆共享同一个队列
#[derive(Clone)]
pub struct Dispatcher {
    shared: Arc<Shared>,
    workers: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Dispatcher {
    /// 启动工作协程，必须在 tokio 运行时内调用
    pub fn start(config: DispatcherConfig) -> Self {
        let workers = config.workers.max(1);
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let shared = Arc::new(Shared {
            sender,
            handlers: RwLock::new(Vec::new()),
            counters: Counters::default(),
            in_flight: AtomicUsize::new(0),
            idle: Notify::new(),
            closed: AtomicBool::new(false),
        });

        let receiver = Arc::new(Mutex::new(receiver));
        let handles = (0..workers)
            .map(|worker_id| {
                let shared = Arc::clone(&shared);
                let receiver = Arc::clone(&receiver);
                tokio::spawn(worker_loop(worker_id, shared, receiver))
            })
            .collect();

        info!(
            workers,
            queue_capacity = config.queue_capacity,
            "事件分发器已启动"
        );

        Self {
            shared,
            workers: Arc::new(Mutex::new(handles)),
        }
    }

    /// 注册处理器；之后分发的事件才会路由到它
    pub fn register(&self, handler: Arc<dyn EventHandler>) {
        debug!(handler = handler.name(), "注册事件处理器");
        self.shared
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handler);
    }

    pub fn handler_names(&self) -> Vec<&'static str> {
        self.shared
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|handler| handler.name())
            .collect()
    }

    pub fn stats(&self) -> DispatcherStats {
        let counters = &self.shared.counters;
        DispatcherStats {
            dispatched: counters.dispatched.load(Ordering::Relaxed),
            dropped: counters.dropped.load(Ordering::Relaxed),
            completed: counters.completed.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// 等待队列清空且所有处理器执行完毕，包括处理过程中产生的次级事件
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            if self.shared.in_flight.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// 停止接收新事件，处理完队列后停止工作协程
    pub async fn shutdown(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.wait_idle().await;

        let mut workers = self.workers.lock().await;
        for handle in workers.drain(..) {
            handle.abort();
        }
        // 处理器可能持有分发器句柄，清空以解开引用环
        self.shared
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();

        let stats = self.stats();
        info!(
            dispatched = stats.dispatched,
            dropped = stats.dropped,
            completed = stats.completed,
            failed = stats.failed,
            "事件分发器已关闭"
        );
    }
}

impl EventSink for Dispatcher {
    fn dispatch(&self, event: Arc<DomainEvent>) -> Result<(), DispatchError> {
        let shared = &self.shared;
        if shared.closed.load(Ordering::Acquire) {
            shared.counters.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(
                event_id = %event.id(),
                event_kind = %event.kind(),
                "分发器已关闭，丢弃事件"
            );
            return Err(DispatchError::Closed);
        }

        shared.in_flight.fetch_add(1, Ordering::AcqRel);
        match shared.sender.try_send(event) {
            Ok(()) => {
                shared.counters.dispatched.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(event)) => {
                shared.finish_one();
                shared.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    event_id = %event.id(),
                    event_kind = %event.kind(),
                    "事件队列已满，丢弃事件"
                );
                Err(DispatchError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                shared.finish_one();
                shared.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    event_id = %event.id(),
                    event_kind = %event.kind(),
                    "事件队列已关闭，丢弃事件"
                );
                Err(DispatchError::Closed)
            }
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    shared: Arc<Shared>,
    receiver: Arc<Mutex<mpsc::Receiver<Arc<DomainEvent>>>>,
) {
    loop {
        let next = { receiver.lock().await.recv().await };
        let Some(event) = next else {
            debug!(worker_id, "事件队列已关闭，工作协程退出");
            break;
        };
        run_handlers(&shared, event).await;
        shared.finish_one();
    }
}

/// 每个处理器一个任务，失败与 panic 都只在这里记录
async fn run_handlers(shared: &Shared, event: Arc<DomainEvent>) {
    let handlers = shared.handlers_for(event.kind());
    if handlers.is_empty() {
        debug!(event_id = %event.id(), event_kind = %event.kind(), "没有匹配的处理器");
        return;
    }

    let mut tasks = JoinSet::new();
    for handler in handlers {
        let event = Arc::clone(&event);
        tasks.spawn(async move {
            let name = handler.name();
            let outcome = AssertUnwindSafe(handler.handle(event)).catch_unwind().await;
            (name, outcome)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, Ok(Ok(())))) => {
                shared.counters.completed.fetch_add(1, Ordering::Relaxed);
            }
            Ok((handler, Ok(Err(err)))) => {
                shared.counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    event_id = %event.id(),
                    event_kind = %event.kind(),
                    handler,
                    error = %err,
                    "事件处理器执行失败"
                );
            }
            Ok((handler, Err(_panic))) => {
                shared.counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    event_id = %event.id(),
                    event_kind = %event.kind(),
                    handler,
                    "事件处理器 panic"
                );
            }
            Err(join_err) => {
                shared.counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    event_id = %event.id(),
                    event_kind = %event.kind(),
                    error = %join_err,
                    "事件处理器任务异常终止"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{EventPayload, LikePayload, OriginContext, PostId, UserId};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct Counting {
        name: &'static str,
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl EventHandler for Counting {
        fn name(&self) -> &'static str {
            self.name
        }

        fn handles(&self, kind: EventKind) -> bool {
            kind == EventKind::LikeToggled
        }

        async fn handle(&self, _event: Arc<DomainEvent>) -> Result<(), HandlerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(HandlerError::failed("boom"));
            }
            Ok(())
        }
    }

    struct Panicking;

    #[async_trait]
    impl EventHandler for Panicking {
        fn name(&self) -> &'static str {
            "panicking"
        }

        fn handles(&self, _kind: EventKind) -> bool {
            true
        }

        async fn handle(&self, _event: Arc<DomainEvent>) -> Result<(), HandlerError> {
            panic!("handler bug");
        }
    }

    struct Slow(Arc<tokio::sync::Semaphore>);

    #[async_trait]
    impl EventHandler for Slow {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn handles(&self, _kind: EventKind) -> bool {
            true
        }

        async fn handle(&self, _event: Arc<DomainEvent>) -> Result<(), HandlerError> {
            let permit = self
                .0
                .acquire()
                .await
                .map_err(|e| HandlerError::failed(e.to_string()))?;
            permit.forget();
            Ok(())
        }
    }

    fn like_event() -> Arc<DomainEvent> {
        Arc::new(
            DomainEvent::new(
                EventKind::LikeToggled,
                EventPayload::Like(LikePayload {
                    post_id: PostId::generate(),
                    actor_id: UserId::generate(),
                    liked: true,
                    like_count: 1,
                }),
                OriginContext::system(),
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn failing_and_panicking_handlers_do_not_stop_siblings() {
        let dispatcher = Dispatcher::start(DispatcherConfig::default());
        let ok_calls = Arc::new(AtomicUsize::new(0));
        let bad_calls = Arc::new(AtomicUsize::new(0));
        dispatcher.register(Arc::new(Counting {
            name: "ok",
            calls: ok_calls.clone(),
            fail: false,
        }));
        dispatcher.register(Arc::new(Counting {
            name: "bad",
            calls: bad_calls.clone(),
            fail: true,
        }));
        dispatcher.register(Arc::new(Panicking));

        dispatcher.dispatch(like_event()).unwrap();
        dispatcher.dispatch(like_event()).unwrap();
        dispatcher.wait_idle().await;

        assert_eq!(ok_calls.load(Ordering::SeqCst), 2);
        assert_eq!(bad_calls.load(Ordering::SeqCst), 2);
        let stats = dispatcher.stats();
        assert_eq!(stats.dispatched, 2);
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.failed, 4);
    }

    #[tokio::test]
    async fn handlers_only_receive_matching_kinds() {
        let dispatcher = Dispatcher::start(DispatcherConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        dispatcher.register(Arc::new(Counting {
            name: "likes",
            calls: calls.clone(),
            fail: false,
        }));

        let post = DomainEvent::new(
            EventKind::PostCreated,
            EventPayload::Post(domain::PostPayload {
                post_id: PostId::generate(),
                author_id: UserId::generate(),
                content: "hi".into(),
            }),
            OriginContext::system(),
        )
        .unwrap();
        dispatcher.dispatch(Arc::new(post)).unwrap();
        dispatcher.wait_idle().await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let release = Arc::new(tokio::sync::Semaphore::new(0));
        let dispatcher = Dispatcher::start(DispatcherConfig {
            workers: 1,
            queue_capacity: 1,
        });
        dispatcher.register(Arc::new(Slow(release.clone())));

        // 第一个事件被工作协程取走并阻塞，第二个占满队列
        dispatcher.dispatch(like_event()).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        dispatcher.dispatch(like_event()).unwrap();

        assert_eq!(
            dispatcher.dispatch(like_event()),
            Err(DispatchError::QueueFull)
        );
        assert_eq!(dispatcher.stats().dropped, 1);

        release.add_permits(2);
        dispatcher.wait_idle().await;
        assert_eq!(dispatcher.stats().completed, 2);
    }

    #[tokio::test]
    async fn shutdown_rejects_new_events() {
        let dispatcher = Dispatcher::start(DispatcherConfig::default());
        dispatcher.shutdown().await;
        assert!(dispatcher.is_closed());
        assert_eq!(
            dispatcher.dispatch(like_event()),
            Err(DispatchError::Closed)
        );
        assert!(dispatcher.handler_names().is_empty());
    }
}
