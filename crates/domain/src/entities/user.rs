use serde::{Deserialize, Serialize};

use crate::value_objects::{Handle, UserId};

/// 身份目录返回的用户摘要，事件管道只需要这些字段
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: UserId,
    pub handle: Handle,
    pub is_active: bool,
}
