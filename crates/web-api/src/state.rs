use std::sync::Arc;

use application::{NotificationService, PresenceRegistry, TopicRouter};

use crate::{ws::SessionHub, JwtService};

#[derive(Clone)]
pub struct AppState {
    pub notifications: Arc<NotificationService>,
    pub presence: Arc<dyn PresenceRegistry>,
    pub router: Arc<TopicRouter>,
    pub hub: Arc<SessionHub>,
    pub jwt_service: Arc<JwtService>,
}

impl AppState {
    pub fn new(
        notifications: Arc<NotificationService>,
        presence: Arc<dyn PresenceRegistry>,
        router: Arc<TopicRouter>,
        hub: Arc<SessionHub>,
        jwt_service: Arc<JwtService>,
    ) -> Self {
        Self {
            notifications,
            presence,
            router,
            hub,
            jwt_service,
        }
    }
}
