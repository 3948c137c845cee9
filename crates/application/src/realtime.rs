//! 推送给客户端的实时负载

use domain::{CommentId, MessageId, Notification, PostId, Timestamp, Topic, UserId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RealtimePayload {
    NotificationCreated {
        notification: Notification,
        unread_count: u64,
    },
    CommentCreated {
        post_id: PostId,
        comment_id: CommentId,
        parent_comment_id: Option<CommentId>,
        author_id: UserId,
        content: String,
    },
    CommentUpdated {
        post_id: PostId,
        comment_id: CommentId,
        content: String,
    },
    CommentDeleted {
        post_id: PostId,
        comment_id: CommentId,
    },
    PostUpdated {
        post_id: PostId,
        content: String,
    },
    PostDeleted {
        post_id: PostId,
    },
    LikeUpdated {
        post_id: PostId,
        like_count: u64,
    },
    CommentCountChanged {
        post_id: PostId,
        comment_count: u64,
    },
    DirectMessage {
        message_id: MessageId,
        sender_id: UserId,
        preview: String,
    },
    Typing {
        user_id: UserId,
        is_typing: bool,
    },
}

impl RealtimePayload {
    pub fn type_name(&self) -> &'static str {
        match self {
            RealtimePayload::NotificationCreated { .. } => "notification_created",
            RealtimePayload::CommentCreated { .. } => "comment_created",
            RealtimePayload::CommentUpdated { .. } => "comment_updated",
            RealtimePayload::CommentDeleted { .. } => "comment_deleted",
            RealtimePayload::PostUpdated { .. } => "post_updated",
            RealtimePayload::PostDeleted { .. } => "post_deleted",
            RealtimePayload::LikeUpdated { .. } => "like_updated",
            RealtimePayload::CommentCountChanged { .. } => "comment_count_changed",
            RealtimePayload::DirectMessage { .. } => "direct_message",
            RealtimePayload::Typing { .. } => "typing",
        }
    }
}

/// 发往某个会话的一帧：主题加负载
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicMessage {
    pub topic: Topic,
    pub payload: RealtimePayload,
    pub sent_at: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_is_tagged_by_type() {
        let post_id = PostId::generate();
        let message = TopicMessage {
            topic: Topic::post(post_id),
            payload: RealtimePayload::LikeUpdated {
                post_id,
                like_count: 3,
            },
            sent_at: chrono::Utc::now(),
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["topic"], format!("post:{post_id}"));
        assert_eq!(json["payload"]["type"], "like_updated");
        assert_eq!(json["payload"]["like_count"], 3);
        assert_eq!(message.payload.type_name(), "like_updated");
    }
}
