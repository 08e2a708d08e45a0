use std::collections::HashMap;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{
    domain::{Access, BotId, Subscription},
    notification::NotificationBatch,
    Result,
};

/// Upstream source of notifications (the onlineconf bot API).
#[async_trait]
pub trait NotificationSource: Send + Sync {
    /// Long-poll for notifications newer than `last_id`.
    ///
    /// `limit == 0` only reports the server frontier. Fails with
    /// [`Error::Canceled`](crate::Error::Canceled) when `cancel` fires first.
    async fn fetch(
        &self,
        last_id: i64,
        limit: u32,
        cancel: &CancellationToken,
    ) -> Result<NotificationBatch>;
}

/// Transactional cursor persistence.
#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn CursorTx>>;
}

/// One open cursor transaction.
///
/// [`CursorTx::cursor`] takes an exclusive lock on the bot's row that is held
/// until the transaction is committed or rolled back. Dropping an open
/// transaction rolls it back.
#[async_trait]
pub trait CursorTx: Send {
    async fn cursor(&mut self, bot: BotId) -> Result<i64>;
    async fn set_cursor(&mut self, bot: BotId, last_id: i64) -> Result<()>;
    async fn commit(self: Box<Self>) -> Result<()>;
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Per-user opt-in records.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Insert or update the user's subscription level.
    async fn subscribe(&self, user: &str, can_edit: bool) -> Result<()>;
    async fn unsubscribe(&self, user: &str) -> Result<()>;
    async fn subscribers(&self) -> Result<Vec<Subscription>>;

    /// Subset of `users` that should be notified.
    ///
    /// A user with `rw` access qualifies with any subscription; a user with
    /// `ro` access only with a view (`can_edit = false`) subscription.
    async fn filter_subscribed(&self, users: &HashMap<String, Access>) -> Result<Vec<String>>;
}

/// Split users into (`rw`, `ro`) lists, sorted for deterministic queries.
pub fn split_by_access(users: &HashMap<String, Access>) -> (Vec<&str>, Vec<&str>) {
    let mut write = Vec::new();
    let mut read = Vec::new();
    for (user, access) in users {
        match access {
            Access::ReadWrite => write.push(user.as_str()),
            Access::ReadOnly => read.push(user.as_str()),
        }
    }
    write.sort_unstable();
    read.sort_unstable();
    (write, read)
}
