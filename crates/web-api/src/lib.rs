//! Web API 层。
//!
//! 提供通知、在线状态的 Axum 路由，以及承载主题推送的 WebSocket 传输。

mod auth;
mod error;
mod routes;
mod state;
pub mod ws;

pub use auth::{Claims, JwtService};
pub use config::JwtConfig;
pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
pub use ws::SessionHub;
