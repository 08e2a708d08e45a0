use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{domain::BotId, notification::Notification, Result};

/// Pluggable delivery backend.
///
/// One implementation per messenger or sink, chosen at startup.
#[async_trait]
pub trait BotBackend: Send + Sync {
    /// Cursor key for this backend.
    fn id(&self) -> BotId;

    /// `true` when recipients must have opted in via the subscription store.
    /// `false` backends receive one delivery addressed to the author.
    fn requires_subscriber_filter(&self) -> bool;

    /// How the author is shown in the text.
    fn mention_link(&self, user: &str) -> String;

    /// How the changed path is shown in the text, given the optional deep link.
    fn param_link(&self, param: &str, link: Option<&str>) -> String;

    async fn notify(
        &self,
        recipient: &str,
        link: Option<&str>,
        text: &str,
        notification: &Notification,
    ) -> Result<()>;

    /// Handle inbound commands until `cancel` fires. Backends without an
    /// inbound side just wait.
    async fn process_updates(&self, cancel: CancellationToken) -> Result<()> {
        cancel.cancelled().await;
        Ok(())
    }
}
