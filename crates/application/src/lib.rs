//! 应用层实现。
//!
//! 事件管道的核心：提交闸门、异步分发器、提及解析、通知扇出、
//! 在线状态登记表和主题广播路由，以及内置的事件处理器。

pub mod clock;
pub mod commit_gate;
pub mod dispatcher;
pub mod error;
pub mod fanout;
pub mod handlers;
pub mod mailer;
pub mod memory;
pub mod mention;
pub mod notification_service;
pub mod presence;
pub mod publisher;
pub mod realtime;
pub mod topic_router;

pub use clock::{Clock, ManualClock, SystemClock};
pub use commit_gate::{with_unit_of_work, CommitGate, UnitOfWorkGuard};
pub use dispatcher::{Dispatcher, DispatcherConfig, DispatcherStats, EventHandler, EventSink};
pub use error::{ApplicationError, ApplicationResult, DispatchError, GateError, HandlerError};
pub use fanout::NotificationFanout;
pub use handlers::{
    register_default_handlers, AccountMailHandler, ContentBroadcastHandler, HandlerDependencies,
    MentionHandler, NotificationFanoutHandler, RealtimeDeliveryHandler,
};
pub use mailer::{MailError, Mailer, OutboundMail};
pub use memory::InMemoryStore;
pub use mention::{extract_handles, MentionResolver};
pub use notification_service::{NotificationPage, NotificationService};
pub use presence::{InMemoryPresenceRegistry, PresenceRegistry, PresenceSettings};
pub use publisher::EventPublisher;
pub use realtime::{RealtimePayload, TopicMessage};
pub use topic_router::{DeliveryError, PublishReport, SessionTransport, TopicRouter};
