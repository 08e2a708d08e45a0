//! In-process store for the cursor and subscription ports.
//!
//! A per-bot `tokio::sync::Mutex` stands in for the database row lock, giving
//! the same "one open batch per bot" guarantee within one process. Used by
//! the debug backend when no database is configured, and by tests.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::{
    domain::{Access, BotId, Subscription},
    errors::Error,
    ports::{CursorStore, CursorTx, SubscriptionStore},
    Result,
};

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    cursors: Mutex<HashMap<BotId, Arc<AsyncMutex<i64>>>>,
    subscriptions: Mutex<BTreeMap<String, bool>>,
}

impl Inner {
    fn row(&self, bot: BotId) -> Result<Arc<AsyncMutex<i64>>> {
        let mut cursors = self.cursors.lock().map_err(poisoned)?;
        Ok(cursors.entry(bot).or_default().clone())
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> Error {
    Error::Storage("memory store lock poisoned".to_string())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed cursor value. Waits while a batch holds the row.
    pub async fn committed_cursor(&self, bot: BotId) -> Result<i64> {
        let row = self.inner.row(bot)?;
        let value = *row.lock().await;
        Ok(value)
    }

    /// Set a committed cursor value outside of any batch.
    pub async fn seed_cursor(&self, bot: BotId, last_id: i64) -> Result<()> {
        let row = self.inner.row(bot)?;
        *row.lock().await = last_id;
        Ok(())
    }
}

struct MemoryTx {
    store: Arc<Inner>,
    held: HashMap<BotId, OwnedMutexGuard<i64>>,
    staged: HashMap<BotId, i64>,
}

impl MemoryTx {
    async fn lock(&mut self, bot: BotId) -> Result<i64> {
        if let Some(v) = self.staged.get(&bot) {
            return Ok(*v);
        }
        if let Some(guard) = self.held.get(&bot) {
            return Ok(**guard);
        }
        let row = self.store.row(bot)?;
        let guard = row.lock_owned().await;
        let value = *guard;
        self.held.insert(bot, guard);
        Ok(value)
    }
}

#[async_trait]
impl CursorStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn CursorTx>> {
        Ok(Box::new(MemoryTx {
            store: self.inner.clone(),
            held: HashMap::new(),
            staged: HashMap::new(),
        }))
    }
}

#[async_trait]
impl CursorTx for MemoryTx {
    async fn cursor(&mut self, bot: BotId) -> Result<i64> {
        self.lock(bot).await
    }

    async fn set_cursor(&mut self, bot: BotId, last_id: i64) -> Result<()> {
        self.lock(bot).await?;
        self.staged.insert(bot, last_id);
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        let staged = std::mem::take(&mut self.staged);
        for (bot, value) in staged {
            if let Some(guard) = self.held.get_mut(&bot) {
                **guard = value;
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn subscribe(&self, user: &str, can_edit: bool) -> Result<()> {
        let mut subs = self.inner.subscriptions.lock().map_err(poisoned)?;
        subs.insert(user.to_string(), can_edit);
        Ok(())
    }

    async fn unsubscribe(&self, user: &str) -> Result<()> {
        let mut subs = self.inner.subscriptions.lock().map_err(poisoned)?;
        subs.remove(user);
        Ok(())
    }

    async fn subscribers(&self) -> Result<Vec<Subscription>> {
        let subs = self.inner.subscriptions.lock().map_err(poisoned)?;
        Ok(subs
            .iter()
            .map(|(user, can_edit)| Subscription {
                user: user.clone(),
                can_edit: *can_edit,
            })
            .collect())
    }

    async fn filter_subscribed(&self, users: &HashMap<String, Access>) -> Result<Vec<String>> {
        let subs = self.inner.subscriptions.lock().map_err(poisoned)?;
        let mut out: Vec<String> = users
            .iter()
            .filter(|(user, access)| match (subs.get(user.as_str()), access) {
                (Some(_), Access::ReadWrite) => true,
                (Some(can_edit), Access::ReadOnly) => !can_edit,
                (None, _) => false,
            })
            .map(|(user, _)| user.clone())
            .collect();
        out.sort_unstable();
        Ok(out)
    }
}
