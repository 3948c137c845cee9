//! 领域模型错误定义
//!
//! 定义了领域层可能出现的错误类型，提供清晰的错误上下文。

use thiserror::Error;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// 参数校验失败
    #[error("invalid argument {field}: {reason}")]
    InvalidArgument { field: String, reason: String },

    /// 事件类型与负载不匹配
    #[error("event kind {kind} does not accept payload {payload}")]
    PayloadMismatch { kind: String, payload: String },
}

impl DomainError {
    /// 创建参数校验错误
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn payload_mismatch(kind: impl Into<String>, payload: impl Into<String>) -> Self {
        Self::PayloadMismatch {
            kind: kind.into(),
            payload: payload.into(),
        }
    }
}

/// 领域模型结果类型
pub type DomainResult<T> = Result<T, DomainError>;

/// 仓储层错误
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl RepositoryError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    pub fn storage_with_source<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;
