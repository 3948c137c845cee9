use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

/// 统一的时间戳类型。
pub type Timestamp = DateTime<Utc>;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new(id: Uuid) -> Self {
                Self(id)
            }

            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$name> for Uuid {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

uuid_id!(
    /// 用户唯一标识。
    UserId
);
uuid_id!(
    /// 帖子唯一标识。
    PostId
);
uuid_id!(
    /// 评论唯一标识。
    CommentId
);
uuid_id!(
    /// 私信唯一标识。
    MessageId
);
uuid_id!(
    /// 通知唯一标识。
    NotificationId
);
uuid_id!(
    /// 领域事件唯一标识，仅用于日志关联。
    EventId
);
uuid_id!(
    /// 工作单元（事务）标识。
    UnitOfWorkId
);
uuid_id!(
    /// 实时连接会话标识。
    SessionId
);

/// 用户句柄（`@alice` 中的 `alice`）。
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Handle(String);

impl Handle {
    pub const MAX_LEN: usize = 32;

    pub fn parse(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        let value = value.trim().trim_start_matches('@');
        if value.is_empty() {
            return Err(DomainError::invalid_argument("handle", "cannot be empty"));
        }
        if value.len() > Self::MAX_LEN {
            return Err(DomainError::invalid_argument("handle", "too long"));
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(DomainError::invalid_argument(
                "handle",
                "only [A-Za-z0-9_] allowed",
            ));
        }
        Ok(Self(value.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Handle {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Handle::parse(value)
    }
}

impl From<Handle> for String {
    fn from(value: Handle) -> Self {
        value.0
    }
}
