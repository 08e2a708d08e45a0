//! Relay pump: timer-driven polling, one cursor transaction per batch, and a
//! bounded drain on shutdown.
//!
//! Cancellation model:
//! - `shutdown` (the governing token) aborts waiting: the idle timer, the
//!   cursor lock, the long-poll. Between notifications it stops the batch
//!   after the current one completes.
//! - `work` (per batch) is what deliveries observe. It only fires when the
//!   grace period after `shutdown` expires with the batch still running.

use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::{
    domain::BotId,
    errors::Error,
    notifier::Notifier,
    ports::{CursorStore, CursorTx, NotificationSource},
    settings::{NotifySettings, SettingsRx},
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct PumpConfig {
    /// Idle wait between polls when there is no backlog.
    pub interval: Duration,
    /// `limit` passed to the upstream.
    pub batch_size: u32,
    /// How long an in-flight batch may keep delivering after shutdown.
    pub stop_timeout: Duration,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            batch_size: 100,
            stop_timeout: Duration::from_secs(15),
        }
    }
}

pub struct RelayPump {
    cfg: PumpConfig,
    source: Arc<dyn NotificationSource>,
    cursors: Arc<dyn CursorStore>,
    notifier: Notifier,
    settings: SettingsRx,
}

/// What a batch observed, for the commit decision.
#[derive(Debug, Default)]
struct BatchProgress {
    cursor: Option<i64>,
    advanced: Option<i64>,
}

impl RelayPump {
    pub fn new(
        cfg: PumpConfig,
        source: Arc<dyn NotificationSource>,
        cursors: Arc<dyn CursorStore>,
        notifier: Notifier,
        settings: SettingsRx,
    ) -> Self {
        Self {
            cfg,
            source,
            cursors,
            notifier,
            settings,
        }
    }

    fn bot_id(&self) -> BotId {
        self.notifier.bot().id()
    }

    /// Run until `shutdown` fires. Batch errors are logged and retried on the
    /// next tick; they never end the loop.
    pub async fn run(&self, shutdown: CancellationToken) {
        let bot_id = self.bot_id();
        tracing::info!(bot_id = %bot_id, "relay pump started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sleep(self.cfg.interval) => {}
            }

            // Drain the backlog without waiting for the timer.
            while !shutdown.is_cancelled() {
                match self.process_batch(&shutdown).await {
                    Ok(true) => continue,
                    Ok(false) => break,
                    Err(e) if e.is_canceled() => break,
                    Err(e) => {
                        tracing::error!(bot_id = %bot_id, error = %e, "failed to process notifications");
                        break;
                    }
                }
            }
        }

        tracing::info!(bot_id = %bot_id, "relay pump stopped");
    }

    /// Fetch and deliver one batch inside one cursor transaction.
    ///
    /// Returns `true` when notifications were delivered and the caller should
    /// poll again immediately.
    pub async fn process_batch(&self, shutdown: &CancellationToken) -> Result<bool> {
        let work = CancellationToken::new();
        let finished = CancellationToken::new();
        let _finished_guard = finished.clone().drop_guard();
        tokio::spawn(force_cancel_after_grace(
            shutdown.clone(),
            finished,
            work.clone(),
            self.cfg.stop_timeout,
        ));

        let settings = self.settings.borrow().clone();
        let mut tx = cancelable(shutdown, self.cursors.begin()).await?;

        let mut progress = BatchProgress::default();
        let outcome = self
            .deliver(tx.as_mut(), &settings, shutdown, &work, &mut progress)
            .await;
        self.finish(tx, progress, outcome).await
    }

    async fn deliver(
        &self,
        tx: &mut dyn CursorTx,
        settings: &NotifySettings,
        shutdown: &CancellationToken,
        work: &CancellationToken,
        progress: &mut BatchProgress,
    ) -> Result<bool> {
        let bot_id = self.bot_id();
        let last_id = cancelable(shutdown, tx.cursor(bot_id)).await?;
        progress.cursor = Some(last_id);
        tracing::debug!(bot_id = %bot_id, last_id, "got cursor");

        // A fresh cursor only syncs to the server frontier, never replays history.
        let limit = if last_id == 0 { 0 } else { self.cfg.batch_size };
        let batch = self.source.fetch(last_id, limit, shutdown).await?;
        if batch.last_id == last_id && batch.notifications.is_empty() {
            return Ok(false);
        }

        for notification in &batch.notifications {
            self.notifier.notify(notification, settings, work).await?;
            progress.advanced = Some(notification.id);
            if shutdown.is_cancelled() {
                return Err(Error::Canceled);
            }
        }

        progress.advanced = Some(batch.last_id);
        Ok(!batch.notifications.is_empty())
    }

    /// Persist whatever was fully processed, then end the transaction.
    async fn finish(
        &self,
        mut tx: Box<dyn CursorTx>,
        progress: BatchProgress,
        outcome: Result<bool>,
    ) -> Result<bool> {
        let bot_id = self.bot_id();
        let target = match (progress.cursor, progress.advanced) {
            (Some(current), Some(next)) if next > current => Some(next),
            (Some(current), Some(next)) if next < current => {
                tracing::warn!(
                    bot_id = %bot_id,
                    cursor = current,
                    frontier = next,
                    "upstream frontier is behind the cursor, keeping cursor"
                );
                None
            }
            _ => None,
        };

        let Some(target) = target else {
            return match outcome {
                Ok(more) => {
                    tx.commit().await?;
                    Ok(more)
                }
                Err(e) => {
                    if let Err(rb) = tx.rollback().await {
                        tracing::warn!(bot_id = %bot_id, error = %rb, "rollback failed");
                    }
                    Err(e)
                }
            };
        };

        if let Err(set_err) = tx.set_cursor(bot_id, target).await {
            if let Err(rb) = tx.rollback().await {
                tracing::warn!(bot_id = %bot_id, error = %rb, "rollback failed");
            }
            return Err(prefer_storage_error(outcome, set_err));
        }
        if let Err(commit_err) = tx.commit().await {
            return Err(prefer_storage_error(outcome, commit_err));
        }
        tracing::debug!(bot_id = %bot_id, last_id = target, "cursor advanced");
        outcome
    }
}

/// A persistence failure outranks a clean outcome or a cancellation, but not
/// an earlier hard error.
fn prefer_storage_error(outcome: Result<bool>, storage: Error) -> Error {
    match outcome {
        Ok(_) | Err(Error::Canceled) => storage,
        Err(e) => {
            tracing::error!(error = %storage, "failed to persist cursor");
            e
        }
    }
}

async fn cancelable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        _ = cancel.cancelled() => Err(Error::Canceled),
        res = fut => res,
    }
}

/// Once `shutdown` fires, give the batch `grace` to finish, then cancel `work`.
async fn force_cancel_after_grace(
    shutdown: CancellationToken,
    finished: CancellationToken,
    work: CancellationToken,
    grace: Duration,
) {
    tokio::select! {
        _ = finished.cancelled() => {}
        _ = shutdown.cancelled() => {
            tokio::select! {
                _ = finished.cancelled() => {}
                _ = sleep(grace) => {
                    tracing::warn!("shutdown timeout, not all notifications were sent");
                    work.cancel();
                }
            }
        }
    }
}
