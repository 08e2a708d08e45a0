//! MySQL persistence for the relay cursor and user subscriptions.
//!
//! The cursor row of a bot is locked with `SELECT ... FOR UPDATE` for the
//! whole batch, so at most one relay process drives a bot at a time.

use std::collections::HashMap;

use async_trait::async_trait;
use ocb_core::{
    domain::{Access, BotId, Subscription},
    ports::{split_by_access, CursorStore, CursorTx, SubscriptionStore},
    Error, Result,
};
use sqlx::{mysql::MySqlPoolOptions, MySql, MySqlPool, QueryBuilder, Transaction};

pub type DbPool = MySqlPool;

fn storage(e: sqlx::Error) -> Error {
    Error::Storage(e.to_string())
}

/// Create a connection pool from a database URL.
pub async fn connect(database_url: &str) -> Result<DbPool> {
    MySqlPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(storage)
}

pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    tracing::info!("running database migrations");
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| Error::Storage(e.to_string()))?;
    tracing::info!("database migrations completed");
    Ok(())
}

#[derive(Clone)]
pub struct MySqlStore {
    pool: DbPool,
}

impl MySqlStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

struct MySqlTx {
    tx: Transaction<'static, MySql>,
}

#[async_trait]
impl CursorStore for MySqlStore {
    async fn begin(&self) -> Result<Box<dyn CursorTx>> {
        let tx = self.pool.begin().await.map_err(storage)?;
        Ok(Box::new(MySqlTx { tx }))
    }
}

#[async_trait]
impl CursorTx for MySqlTx {
    async fn cursor(&mut self, bot: BotId) -> Result<i64> {
        // Upsert, not INSERT IGNORE: an existing row must be locked exclusively
        // from the start, never shared and later upgraded.
        sqlx::query(
            "INSERT INTO relay_cursor (bot_id, last_id) VALUES (?, 0) \
             ON DUPLICATE KEY UPDATE bot_id = bot_id",
        )
        .bind(bot.0)
        .execute(&mut *self.tx)
        .await
        .map_err(storage)?;
        sqlx::query_scalar::<_, i64>("SELECT last_id FROM relay_cursor WHERE bot_id = ? FOR UPDATE")
            .bind(bot.0)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(storage)
    }

    async fn set_cursor(&mut self, bot: BotId, last_id: i64) -> Result<()> {
        sqlx::query("UPDATE relay_cursor SET last_id = ? WHERE bot_id = ?")
            .bind(last_id)
            .bind(bot.0)
            .execute(&mut *self.tx)
            .await
            .map_err(storage)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MySqlTx { tx } = *self;
        tx.commit().await.map_err(storage)
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let MySqlTx { tx } = *self;
        tx.rollback().await.map_err(storage)
    }
}

#[async_trait]
impl SubscriptionStore for MySqlStore {
    async fn subscribe(&self, user: &str, can_edit: bool) -> Result<()> {
        sqlx::query(
            "INSERT INTO subscription (user, can_edit) VALUES (?, ?) \
             ON DUPLICATE KEY UPDATE can_edit = VALUES(can_edit)",
        )
        .bind(user)
        .bind(can_edit)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn unsubscribe(&self, user: &str) -> Result<()> {
        sqlx::query("DELETE FROM subscription WHERE user = ?")
            .bind(user)
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(())
    }

    async fn subscribers(&self) -> Result<Vec<Subscription>> {
        let rows = sqlx::query_as::<_, (String, bool)>(
            "SELECT user, can_edit FROM subscription ORDER BY user",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        Ok(rows
            .into_iter()
            .map(|(user, can_edit)| Subscription { user, can_edit })
            .collect())
    }

    async fn filter_subscribed(&self, users: &HashMap<String, Access>) -> Result<Vec<String>> {
        let (write, read) = split_by_access(users);
        let Some(mut query) = filter_query(&write, &read) else {
            return Ok(Vec::new());
        };
        query
            .build_query_scalar::<String>()
            .fetch_all(&self.pool)
            .await
            .map_err(storage)
    }
}

/// `rw` users match any subscription, `ro` users only view subscriptions.
fn filter_query<'a>(write: &[&'a str], read: &[&'a str]) -> Option<QueryBuilder<'a, MySql>> {
    if write.is_empty() && read.is_empty() {
        return None;
    }
    let mut query = QueryBuilder::new("SELECT user FROM subscription WHERE ");
    if !write.is_empty() {
        query.push("user IN (");
        let mut list = query.separated(", ");
        for user in write {
            list.push_bind(*user);
        }
        list.push_unseparated(")");
    }
    if !read.is_empty() {
        if !write.is_empty() {
            query.push(" OR ");
        }
        query.push("(user IN (");
        let mut list = query.separated(", ");
        for user in read {
            list.push_bind(*user);
        }
        list.push_unseparated(") AND NOT can_edit)");
    }
    query.push(" ORDER BY user");
    Some(query)
}
