//! 主应用程序入口
//!
//! 装配事件管道并启动 Axum Web API 服务。

use std::sync::Arc;

use application::{
    register_default_handlers, Clock, CommitGate, Dispatcher, DispatcherConfig, EventPublisher,
    HandlerDependencies, InMemoryPresenceRegistry, MentionResolver, NotificationFanout,
    NotificationService, PresenceRegistry, PresenceSettings, SystemClock, TopicRouter,
};
use config::AppConfig;
use infrastructure::Infrastructure;
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, JwtService, SessionHub};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load()?;
    tracing::info!(
        database = %config.database.url.rsplit('@').next().unwrap_or("unknown"),
        workers = config.dispatcher.workers,
        "配置加载完成"
    );

    let infra = Infrastructure::connect(&config).await?;
    let storage = infra.storage.clone();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let dispatcher = Dispatcher::start(DispatcherConfig::from(&config.dispatcher));
    let gate = Arc::new(CommitGate::new(Arc::new(dispatcher.clone())));
    let publisher = EventPublisher::new(gate);

    let hub = Arc::new(SessionHub::new());
    let topic_router = Arc::new(TopicRouter::new(hub.clone(), clock.clone()));
    let presence: Arc<dyn PresenceRegistry> = Arc::new(InMemoryPresenceRegistry::new(
        PresenceSettings::from(&config.presence),
        clock.clone(),
    ));

    let fanout = Arc::new(NotificationFanout::new(
        storage.notifications.clone(),
        storage.users.clone(),
        storage.content.clone(),
        publisher,
        clock.clone(),
    ));
    let resolver = Arc::new(MentionResolver::new(
        storage.users.clone(),
        storage.mentions.clone(),
        clock,
    ));
    register_default_handlers(
        &dispatcher,
        HandlerDependencies {
            fanout,
            resolver,
            router: topic_router.clone(),
            content: storage.content.clone(),
            mailer: infra.mailer.clone(),
        },
    );
    tracing::info!(handlers = ?dispatcher.handler_names(), "事件处理器已注册");

    let state = AppState::new(
        Arc::new(NotificationService::new(storage.notifications.clone())),
        presence,
        topic_router,
        hub,
        Arc::new(JwtService::new(config.jwt.clone())),
    );

    let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
    tracing::info!("服务器启动在 http://{}", config.bind_address());
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    dispatcher.shutdown().await;
    let stats = dispatcher.stats();
    tracing::info!(
        dispatched = stats.dispatched,
        dropped = stats.dropped,
        completed = stats.completed,
        failed = stats.failed,
        "事件分发器已停止"
    );

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "监听退出信号失败");
    }
}
