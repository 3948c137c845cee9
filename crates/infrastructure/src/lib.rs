//! 基础设施层实现。
//!
//! 提供 Postgres 仓储、与提交闸门绑定的事务、邮件中继等适配器，实现应用/领域层定义的接口。

pub mod builder;
pub mod mail;
pub mod migrations;
pub mod repository;
pub mod unit_of_work;

pub use builder::{Infrastructure, InfrastructureError};
pub use mail::{HttpRelayMailer, LogMailer};
pub use migrations::MIGRATOR;
pub use repository::{
    create_pg_pool, PgContentDirectory, PgMentionRepository, PgNotificationRepository, PgStorage,
    PgUserDirectory,
};
pub use unit_of_work::PgUnitOfWork;
