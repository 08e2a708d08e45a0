use async_trait::async_trait;

use crate::{domain::BotId, messaging::port::BotBackend, notification::Notification, Result};

/// Sink that records one structured event per change.
///
/// It does not filter by subscription: the notifier addresses it to the
/// change author only, so each change is recorded exactly once.
pub struct AuditBot {
    id: BotId,
}

impl AuditBot {
    pub fn new(id: BotId) -> Self {
        Self { id }
    }
}

#[async_trait]
impl BotBackend for AuditBot {
    fn id(&self) -> BotId {
        self.id
    }

    fn requires_subscriber_filter(&self) -> bool {
        false
    }

    fn mention_link(&self, user: &str) -> String {
        user.to_string()
    }

    fn param_link(&self, param: &str, _link: Option<&str>) -> String {
        param.to_string()
    }

    async fn notify(
        &self,
        recipient: &str,
        link: Option<&str>,
        _text: &str,
        notification: &Notification,
    ) -> Result<()> {
        tracing::info!(
            target: "ocb::audit",
            bot_id = %self.id,
            notification_id = notification.id,
            path = %notification.path,
            version = notification.version,
            action = %notification.action,
            content_type = %notification.content_type,
            author = %recipient,
            link = link.unwrap_or(""),
            "config changed"
        );
        Ok(())
    }
}
