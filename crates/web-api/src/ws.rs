//! WebSocket 传输
//!
//! `SessionHub` 为每个连接持有一个有界发送队列，并作为主题路由的 `SessionTransport`。
//! 连接建立后自动订阅本人的通知和私信主题，断开时移除该会话的全部订阅。

use std::collections::HashMap;
use std::ops::ControlFlow;

use application::{
    ApplicationError, ApplicationResult, DeliveryError, PresenceRegistry, RealtimePayload,
    SessionTransport, TopicMessage,
};
use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use domain::{DomainError, SessionId, Topic, UserId};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::{error::ApiError, state::AppState};

/// 每个会话的待发送帧上限，写满后新帧按推送失败处理
const SESSION_BUFFER: usize = 64;

#[derive(Default)]
pub struct SessionHub {
    sessions: RwLock<HashMap<SessionId, mpsc::Sender<String>>>,
}

impl SessionHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, session_id: SessionId) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(SESSION_BUFFER);
        self.sessions.write().await.insert(session_id, tx);
        rx
    }

    pub async fn remove(&self, session_id: SessionId) {
        self.sessions.write().await.remove(&session_id);
    }

    pub async fn connected(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl SessionTransport for SessionHub {
    async fn send_to_session(
        &self,
        session_id: SessionId,
        message: &TopicMessage,
    ) -> Result<(), DeliveryError> {
        let sender = self
            .sessions
            .read()
            .await
            .get(&session_id)
            .cloned()
            .ok_or(DeliveryError::Disconnected(session_id))?;
        let frame =
            serde_json::to_string(message).map_err(|err| DeliveryError::Failed(err.to_string()))?;

        sender.try_send(frame).map_err(|err| match err {
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Disconnected(session_id),
            mpsc::error::TrySendError::Full(_) => {
                DeliveryError::Failed(format!("session {session_id} buffer full"))
            }
        })
    }
}

/// 客户端发来的帧
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Subscribe { topic: String },
    Unsubscribe { topic: String },
    Heartbeat,
    Typing { counterpart_id: UserId, is_typing: bool },
}

/// 对客户端帧的应答；主题推送直接以 `TopicMessage` 发送
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Subscribed { topic: Topic },
    Unsubscribed { topic: Topic },
    Ack,
    Error { message: String },
}

/// 个人主题只能由本人订阅，帖子主题和 `feed` 公开
pub fn authorize_subscription(user_id: UserId, topic: &Topic) -> ApplicationResult<()> {
    let allowed = if topic.is_personal() {
        topic.owner() == Some(user_id)
    } else {
        *topic == Topic::feed() || topic.as_str().starts_with("post:")
    };
    if allowed {
        Ok(())
    } else {
        Err(ApplicationError::forbidden(format!(
            "not allowed to subscribe to {topic}"
        )))
    }
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: String,
}

pub async fn websocket_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let user_id = state.jwt_service.verify_token(&query.token)?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user_id)))
}

#[derive(Debug)]
enum WsCommand {
    SendText(String),
    SendPong(Vec<u8>),
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: UserId) {
    let session_id = SessionId::generate();
    let mut outbound = state.hub.register(session_id).await;
    state.presence.touch(user_id).await;
    for topic in [Topic::user_notifications(user_id), Topic::user_messages(user_id)] {
        state.router.subscribe(session_id, topic).await;
    }
    info!(user_id = %user_id, session_id = %session_id, "WebSocket 连接已建立");

    let (mut sender, mut incoming) = socket.split();
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsCommand>(32);

    // 所有写操作都经过发送任务
    let mut send_task = tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                Some(cmd) = cmd_rx.recv() => match cmd {
                    WsCommand::SendText(text) => WsMessage::Text(text.into()),
                    WsCommand::SendPong(data) => WsMessage::Pong(data.into()),
                },
                Some(frame) = outbound.recv() => WsMessage::Text(frame.into()),
                else => break,
            };
            if sender.send(message).await.is_err() {
                debug!("WebSocket 写入失败");
                break;
            }
        }
    });

    let recv_state = state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = incoming.next().await {
            if handle_incoming(&recv_state, session_id, user_id, message, &cmd_tx)
                .await
                .is_break()
            {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    let removed = state.router.unsubscribe_all(session_id).await;
    for subscription in &removed {
        debug!(session_id = %subscription.session_id, topic = %subscription.topic, "订阅已移除");
    }
    state.hub.remove(session_id).await;
    info!(
        user_id = %user_id,
        session_id = %session_id,
        removed = removed.len(),
        "WebSocket 连接已断开"
    );
}

async fn handle_incoming(
    state: &AppState,
    session_id: SessionId,
    user_id: UserId,
    message: WsMessage,
    cmd_tx: &mpsc::Sender<WsCommand>,
) -> ControlFlow<()> {
    let reply = match message {
        WsMessage::Close(_) => return ControlFlow::Break(()),
        WsMessage::Ping(data) => {
            return match cmd_tx.send(WsCommand::SendPong(data.to_vec())).await {
                Ok(()) => ControlFlow::Continue(()),
                Err(_) => ControlFlow::Break(()),
            };
        }
        WsMessage::Pong(_) | WsMessage::Binary(_) => return ControlFlow::Continue(()),
        WsMessage::Text(text) => match serde_json::from_str::<ClientFrame>(text.as_str()) {
            Ok(frame) => handle_frame(state, session_id, user_id, frame).await,
            Err(err) => ServerFrame::Error {
                message: format!("malformed frame: {err}"),
            },
        },
    };

    let text = match serde_json::to_string(&reply) {
        Ok(text) => text,
        Err(err) => {
            warn!(error = %err, "应答序列化失败");
            return ControlFlow::Continue(());
        }
    };
    match cmd_tx.send(WsCommand::SendText(text)).await {
        Ok(()) => ControlFlow::Continue(()),
        Err(_) => ControlFlow::Break(()),
    }
}

async fn handle_frame(
    state: &AppState,
    session_id: SessionId,
    user_id: UserId,
    frame: ClientFrame,
) -> ServerFrame {
    match frame {
        ClientFrame::Subscribe { topic } => {
            let authorized = Topic::parse(topic)
                .map_err(ApplicationError::from)
                .and_then(|topic| authorize_subscription(user_id, &topic).map(|()| topic));
            match authorized {
                Ok(topic) => {
                    state.router.subscribe(session_id, topic.clone()).await;
                    ServerFrame::Subscribed { topic }
                }
                Err(err) => {
                    warn!(user_id = %user_id, error = %err, "拒绝订阅");
                    ServerFrame::Error {
                        message: err.to_string(),
                    }
                }
            }
        }
        ClientFrame::Unsubscribe { topic } => match Topic::parse(topic) {
            Ok(topic) => {
                state.router.unsubscribe(session_id, &topic).await;
                ServerFrame::Unsubscribed { topic }
            }
            Err(err) => ServerFrame::Error {
                message: err.to_string(),
            },
        },
        ClientFrame::Heartbeat => {
            state.presence.touch(user_id).await;
            ServerFrame::Ack
        }
        ClientFrame::Typing {
            counterpart_id,
            is_typing,
        } => match publish_typing(state, user_id, counterpart_id, is_typing).await {
            Ok(()) => ServerFrame::Ack,
            Err(err) => ServerFrame::Error {
                message: err.to_string(),
            },
        },
    }
}

/// 记录输入状态并推送到对方的私信主题
pub(crate) async fn publish_typing(
    state: &AppState,
    user_id: UserId,
    counterpart_id: UserId,
    is_typing: bool,
) -> ApplicationResult<()> {
    if counterpart_id == user_id {
        return Err(
            DomainError::invalid_argument("counterpart_id", "must be another user").into(),
        );
    }
    state.presence.touch(user_id).await;
    state
        .presence
        .set_typing(user_id, counterpart_id, is_typing)
        .await;
    state
        .router
        .publish(
            Topic::user_messages(counterpart_id),
            RealtimePayload::Typing { user_id, is_typing },
        )
        .await;
    Ok(())
}
