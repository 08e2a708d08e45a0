use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use crate::{domain::BotId, messaging::port::BotBackend, notification::Notification, Result};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Minimum spacing between *any* two deliveries (global flood control).
    pub global_min_interval: Duration,
    /// Minimum spacing between deliveries to the same recipient.
    pub per_recipient_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        // Telegram allows ~30 msg/sec overall and ~1 msg/sec per chat.
        Self {
            global_min_interval: Duration::from_millis(40),
            per_recipient_min_interval: Duration::from_millis(1050),
        }
    }
}

#[derive(Debug)]
struct IntervalLimiter {
    interval: Duration,
    next: Instant,
}

impl IntervalLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// Reserve the next slot and return the wait duration required before executing.
    fn reserve(&mut self) -> Duration {
        let now = Instant::now();
        let start = if now >= self.next { now } else { self.next };
        self.next = start + self.interval;
        start.saturating_duration_since(now)
    }
}

/// BotBackend decorator that rate-limits outbound deliveries.
///
/// Only `notify` is throttled; the formatting helpers and the update
/// processor pass straight through.
pub struct ThrottledBot {
    inner: Arc<dyn BotBackend>,
    cfg: ThrottleConfig,
    global: Mutex<IntervalLimiter>,
    per_recipient: Mutex<HashMap<String, Arc<Mutex<IntervalLimiter>>>>,
}

impl ThrottledBot {
    pub fn new(inner: Arc<dyn BotBackend>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            global: Mutex::new(IntervalLimiter::new(cfg.global_min_interval)),
            per_recipient: Mutex::new(HashMap::new()),
        }
    }

    async fn limiter_for(&self, recipient: &str) -> Arc<Mutex<IntervalLimiter>> {
        let mut map = self.per_recipient.lock().await;
        map.entry(recipient.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(IntervalLimiter::new(
                    self.cfg.per_recipient_min_interval,
                )))
            })
            .clone()
    }

    async fn throttle(&self, recipient: &str) {
        let global_wait = { self.global.lock().await.reserve() };
        let recipient_wait = {
            let lim = self.limiter_for(recipient).await;
            let mut guard = lim.lock().await;
            guard.reserve()
        };

        let wait = global_wait.max(recipient_wait);
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }
}

#[async_trait]
impl BotBackend for ThrottledBot {
    fn id(&self) -> BotId {
        self.inner.id()
    }

    fn requires_subscriber_filter(&self) -> bool {
        self.inner.requires_subscriber_filter()
    }

    fn mention_link(&self, user: &str) -> String {
        self.inner.mention_link(user)
    }

    fn param_link(&self, param: &str, link: Option<&str>) -> String {
        self.inner.param_link(param, link)
    }

    async fn notify(
        &self,
        recipient: &str,
        link: Option<&str>,
        text: &str,
        notification: &Notification,
    ) -> Result<()> {
        self.throttle(recipient).await;
        self.inner.notify(recipient, link, text, notification).await
    }

    async fn process_updates(&self, cancel: CancellationToken) -> Result<()> {
        self.inner.process_updates(cancel).await
    }
}
