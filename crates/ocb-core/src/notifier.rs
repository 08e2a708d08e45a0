//! Delivery of one notification to every eligible recipient.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    errors::Error,
    messaging::port::BotBackend,
    notification::Notification,
    ports::SubscriptionStore,
    render::render,
    settings::NotifySettings,
    users::UserMapper,
    Result,
};

pub struct Notifier {
    bot: Arc<dyn BotBackend>,
    subscriptions: Arc<dyn SubscriptionStore>,
}

impl Notifier {
    pub fn new(bot: Arc<dyn BotBackend>, subscriptions: Arc<dyn SubscriptionStore>) -> Self {
        Self { bot, subscriptions }
    }

    pub fn bot(&self) -> &Arc<dyn BotBackend> {
        &self.bot
    }

    /// Deliver `notification` to its recipients, best effort.
    ///
    /// Per-recipient failures are logged and skipped. Only a subscription
    /// store failure or cancellation fails the call; both leave the
    /// notification undelivered from the cursor's point of view.
    pub async fn notify(
        &self,
        notification: &Notification,
        settings: &NotifySettings,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mapper = UserMapper::new(&settings.user_map, &settings.user_domain);
        let users = mapper.map_access(&notification.users);
        if users.is_empty() {
            tracing::debug!(notification_id = notification.id, "no mapped users");
            return Ok(());
        }

        let author = mapper
            .map(&notification.author)
            .unwrap_or_else(|| notification.author.clone());

        let recipients = if self.bot.requires_subscriber_filter() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Canceled),
                res = self.subscriptions.filter_subscribed(&users) => res?,
            }
        } else {
            vec![author.clone()]
        };
        if recipients.is_empty() {
            tracing::debug!(notification_id = notification.id, "no subscribed recipients");
            return Ok(());
        }

        let link = deep_link(settings.link_url.as_deref(), &notification.path);
        let mention = self.bot.mention_link(&author);
        let label = self.bot.param_link(&notification.path, link.as_deref());
        let text = render(notification, &mention, &label);

        for recipient in &recipients {
            let delivery = tokio::time::timeout(
                settings.delivery_timeout,
                self.bot
                    .notify(recipient, link.as_deref(), &text, notification),
            );
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Canceled),
                outcome = delivery => outcome,
            };
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(
                    notification_id = notification.id,
                    recipient = %recipient,
                    error = %e,
                    "failed to send notification"
                ),
                Err(_) => tracing::error!(
                    notification_id = notification.id,
                    recipient = %recipient,
                    timeout = ?settings.delivery_timeout,
                    "notification delivery timed out"
                ),
            }
        }
        Ok(())
    }
}

/// Deep link to `path`, or `None` when no base URL is configured or it does not parse.
pub fn deep_link(base: Option<&str>, path: &str) -> Option<String> {
    let base = base?;
    match reqwest::Url::parse(base) {
        Ok(mut url) => {
            url.set_fragment(Some(path));
            Some(url.to_string())
        }
        Err(e) => {
            tracing::warn!(link_url = base, error = %e, "failed to parse link URL");
            None
        }
    }
}
