use domain::{DomainError, RepositoryError, UnitOfWorkId};
use thiserror::Error;

use crate::mailer::MailError;

/// 提交闸门错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    /// 工作单元不存在或已经提交 / 回滚
    #[error("unit of work {0} is not active")]
    UnknownUnitOfWork(UnitOfWorkId),
}

/// 分发错误。对生产者而言只是降级信号，事件已被记录并丢弃
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("dispatch queue is full")]
    QueueFull,
    #[error("dispatcher is shut down")]
    Closed,
}

/// 事件处理器错误，只在分发器边界记录，不会回传给生产者
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("mail error: {0}")]
    Mail(#[from] MailError),
    #[error("application error: {0}")]
    Application(Box<ApplicationError>),
    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

impl From<ApplicationError> for HandlerError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Domain(err) => HandlerError::Domain(err),
            ApplicationError::Repository(err) => HandlerError::Repository(err),
            other => HandlerError::Application(Box::new(other)),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("commit gate error: {0}")]
    Gate(#[from] GateError),
    #[error("{resource} {id} not found")]
    NotFound { resource: &'static str, id: String },
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("infrastructure error: {message}")]
    Infrastructure { message: String },
}

impl ApplicationError {
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    /// 创建基础设施错误
    pub fn infrastructure(message: impl Into<String>) -> Self {
        Self::Infrastructure {
            message: message.into(),
        }
    }
}

pub type ApplicationResult<T> = Result<T, ApplicationError>;
