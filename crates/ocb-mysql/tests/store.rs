//! Store tests against a live MySQL.
//!
//! `#[sqlx::test]` creates a scratch database per test from `DATABASE_URL`
//! and applies `./migrations` to it.

use std::{collections::HashMap, time::Duration};

use ocb_core::{
    domain::{Access, BotId, Subscription},
    ports::{CursorStore, SubscriptionStore},
};
use ocb_mysql::MySqlStore;
use sqlx::MySqlPool;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn access(pairs: &[(&str, Access)]) -> HashMap<String, Access> {
    pairs.iter().map(|(u, a)| (u.to_string(), *a)).collect()
}

async fn stored_cursor(pool: &MySqlPool, bot: BotId) -> Option<i64> {
    sqlx::query_scalar::<_, i64>("SELECT last_id FROM relay_cursor WHERE bot_id = ?")
        .bind(bot.0)
        .fetch_optional(pool)
        .await
        .unwrap()
}

// ---------------------------------------------------------------------------
// Cursor
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn new_bot_starts_at_zero(pool: MySqlPool) {
    let store = MySqlStore::new(pool.clone());
    let bot = BotId(7);

    let mut tx = store.begin().await.unwrap();
    assert_eq!(tx.cursor(bot).await.unwrap(), 0);
    tx.commit().await.unwrap();

    assert_eq!(stored_cursor(&pool, bot).await, Some(0));
}

#[sqlx::test(migrations = "./migrations")]
async fn commit_persists_and_rollback_discards(pool: MySqlPool) {
    let store = MySqlStore::new(pool.clone());
    let bot = BotId(7);

    let mut tx = store.begin().await.unwrap();
    tx.cursor(bot).await.unwrap();
    tx.set_cursor(bot, 10).await.unwrap();
    assert_eq!(tx.cursor(bot).await.unwrap(), 10);
    tx.commit().await.unwrap();
    assert_eq!(stored_cursor(&pool, bot).await, Some(10));

    let mut tx = store.begin().await.unwrap();
    tx.cursor(bot).await.unwrap();
    tx.set_cursor(bot, 20).await.unwrap();
    tx.rollback().await.unwrap();
    assert_eq!(stored_cursor(&pool, bot).await, Some(10));
}

#[sqlx::test(migrations = "./migrations")]
async fn batches_for_same_bot_take_turns(pool: MySqlPool) {
    let store = MySqlStore::new(pool);
    let bot = BotId(1);

    let mut tx = store.begin().await.unwrap();
    tx.cursor(bot).await.unwrap();
    tx.commit().await.unwrap();

    let mut first = store.begin().await.unwrap();
    assert_eq!(first.cursor(bot).await.unwrap(), 0);

    let contender = store.clone();
    let second = tokio::spawn(async move {
        let mut tx = contender.begin().await.unwrap();
        let seen = tx.cursor(bot).await.unwrap();
        (tx, seen)
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!second.is_finished());

    // Another bot is not blocked.
    let mut other = store.begin().await.unwrap();
    assert_eq!(other.cursor(BotId(2)).await.unwrap(), 0);
    other.rollback().await.unwrap();

    first.set_cursor(bot, 5).await.unwrap();
    first.commit().await.unwrap();
    let (mut second, seen) = second.await.unwrap();
    assert_eq!(seen, 5);

    // The previous holder queues up again right away, as the drain loop does.
    let contender = store.clone();
    let third = tokio::spawn(async move {
        let mut tx = contender.begin().await.unwrap();
        let seen = tx.cursor(bot).await.unwrap();
        tx.rollback().await.unwrap();
        seen
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!third.is_finished());

    second.set_cursor(bot, 9).await.unwrap();
    second.commit().await.unwrap();
    assert_eq!(third.await.unwrap(), 9);
}

#[sqlx::test(migrations = "./migrations")]
async fn concurrent_bootstrap_of_new_bot_serialises(pool: MySqlPool) {
    let store = MySqlStore::new(pool.clone());
    let bot = BotId(42);

    let mut first = store.begin().await.unwrap();
    assert_eq!(first.cursor(bot).await.unwrap(), 0);

    let contender = store.clone();
    let second = tokio::spawn(async move {
        let mut tx = contender.begin().await.unwrap();
        let seen = tx.cursor(bot).await.unwrap();
        tx.commit().await.unwrap();
        seen
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!second.is_finished());

    first.set_cursor(bot, 3).await.unwrap();
    first.commit().await.unwrap();
    assert_eq!(second.await.unwrap(), 3);
    assert_eq!(stored_cursor(&pool, bot).await, Some(3));
}

// ---------------------------------------------------------------------------
// Subscriptions
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn subscribe_upserts_and_unsubscribe_removes(pool: MySqlPool) {
    let store = MySqlStore::new(pool);

    store.subscribe("u", true).await.unwrap();
    store.subscribe("u", false).await.unwrap();
    assert_eq!(
        store.subscribers().await.unwrap(),
        vec![Subscription {
            user: "u".to_string(),
            can_edit: false
        }]
    );

    store.unsubscribe("u").await.unwrap();
    assert!(store.subscribers().await.unwrap().is_empty());
}

#[sqlx::test(migrations = "./migrations")]
async fn edit_subscription_only_gets_editable_params(pool: MySqlPool) {
    let store = MySqlStore::new(pool);
    store.subscribe("editor", true).await.unwrap();
    store.subscribe("viewer", false).await.unwrap();

    let rw = access(&[("editor", Access::ReadWrite), ("viewer", Access::ReadWrite)]);
    assert_eq!(
        store.filter_subscribed(&rw).await.unwrap(),
        vec!["editor", "viewer"]
    );

    let ro = access(&[
        ("editor", Access::ReadOnly),
        ("viewer", Access::ReadOnly),
        ("stranger", Access::ReadOnly),
    ]);
    assert_eq!(store.filter_subscribed(&ro).await.unwrap(), vec!["viewer"]);

    let mixed = access(&[("editor", Access::ReadWrite), ("viewer", Access::ReadOnly)]);
    assert_eq!(
        store.filter_subscribed(&mixed).await.unwrap(),
        vec!["editor", "viewer"]
    );

    assert!(store.filter_subscribed(&HashMap::new()).await.unwrap().is_empty());
}
