#![allow(dead_code)]

use std::sync::Arc;

use application::{
    register_default_handlers, CommitGate, Dispatcher, DispatcherConfig, EventPublisher,
    HandlerDependencies, InMemoryPresenceRegistry, InMemoryStore, MailError, Mailer,
    MentionResolver, NotificationFanout, NotificationService, OutboundMail, PresenceSettings,
    SystemClock, TopicRouter,
};
use async_trait::async_trait;
use axum::Router;
use domain::{EventKind, EventPayload, Handle, OriginContext, UserId};
use web_api::{router, AppState, JwtConfig, JwtService, SessionHub};

struct NullMailer;

#[async_trait]
impl Mailer for NullMailer {
    async fn send(&self, _mail: OutboundMail) -> Result<(), MailError> {
        Ok(())
    }
}

pub struct TestApp {
    pub store: Arc<InMemoryStore>,
    pub dispatcher: Dispatcher,
    pub gate: Arc<CommitGate>,
    pub publisher: EventPublisher,
    pub state: AppState,
}

impl TestApp {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(SystemClock);
        let dispatcher = Dispatcher::start(DispatcherConfig {
            workers: 2,
            queue_capacity: 128,
        });
        let gate = Arc::new(CommitGate::new(Arc::new(dispatcher.clone())));
        let publisher = EventPublisher::new(gate.clone());
        let hub = Arc::new(SessionHub::new());
        let topic_router = Arc::new(TopicRouter::new(hub.clone(), clock.clone()));
        let presence = Arc::new(InMemoryPresenceRegistry::new(
            PresenceSettings::default(),
            clock.clone(),
        ));

        let fanout = Arc::new(NotificationFanout::new(
            store.clone(),
            store.clone(),
            store.clone(),
            publisher.clone(),
            clock.clone(),
        ));
        let resolver = Arc::new(MentionResolver::new(store.clone(), store.clone(), clock));
        register_default_handlers(
            &dispatcher,
            HandlerDependencies {
                fanout,
                resolver,
                router: topic_router.clone(),
                content: store.clone(),
                mailer: Arc::new(NullMailer),
            },
        );

        let jwt_service = Arc::new(JwtService::new(JwtConfig {
            secret: "integration-test-secret-with-32-plus-bytes".to_string(),
            expiration_hours: 1,
        }));
        let state = AppState::new(
            Arc::new(NotificationService::new(store.clone())),
            presence,
            topic_router,
            hub,
            jwt_service,
        );

        Self {
            store,
            dispatcher,
            gate,
            publisher,
            state,
        }
    }

    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    pub async fn user(&self, handle: &str) -> UserId {
        self.store
            .add_user(Handle::parse(handle).expect("handle"), true)
            .await
    }

    pub fn token(&self, user_id: UserId) -> String {
        self.state.jwt_service.generate_token(user_id).expect("token")
    }

    /// 在一个提交的工作单元里发布事件，并等待处理器跑完
    pub async fn commit(&self, actor: UserId, kind: EventKind, payload: EventPayload) {
        let uow = self.gate.guard();
        self.publisher
            .publish(uow.id(), OriginContext::actor(actor), kind, payload)
            .expect("publish");
        uow.commit();
        self.dispatcher.wait_idle().await;
    }
}
