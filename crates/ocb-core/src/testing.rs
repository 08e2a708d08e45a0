//! Fakes shared by the notifier and pump tests.

use std::{
    collections::{HashSet, VecDeque},
    sync::Mutex,
    time::Duration,
};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{
    domain::BotId,
    errors::Error,
    messaging::port::BotBackend,
    notification::{Notification, NotificationBatch},
    ports::NotificationSource,
    Result,
};

#[derive(Clone, Debug, PartialEq)]
pub struct Sent {
    pub recipient: String,
    pub link: Option<String>,
    pub text: String,
    pub notification_id: i64,
}

pub struct FakeBot {
    pub filter: bool,
    pub failing: HashSet<String>,
    pub delay: Duration,
    pub sent: Mutex<Vec<Sent>>,
}

impl FakeBot {
    pub fn filtering() -> Self {
        Self {
            filter: true,
            failing: HashSet::new(),
            delay: Duration::ZERO,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn direct() -> Self {
        Self {
            filter: false,
            ..Self::filtering()
        }
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn recipients_of(&self, id: i64) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|s| s.notification_id == id)
            .map(|s| s.recipient)
            .collect()
    }
}

#[async_trait]
impl BotBackend for FakeBot {
    fn id(&self) -> BotId {
        BotId(1)
    }

    fn requires_subscriber_filter(&self) -> bool {
        self.filter
    }

    fn mention_link(&self, user: &str) -> String {
        format!("@[{user}]")
    }

    fn param_link(&self, param: &str, link: Option<&str>) -> String {
        match link {
            Some(link) => format!("[{param}]({link})"),
            None => param.to_string(),
        }
    }

    async fn notify(
        &self,
        recipient: &str,
        link: Option<&str>,
        text: &str,
        notification: &Notification,
    ) -> Result<()> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.contains(recipient) {
            return Err(Error::Delivery(format!("{recipient} blocked the bot")));
        }
        self.sent.lock().unwrap().push(Sent {
            recipient: recipient.to_string(),
            link: link.map(str::to_string),
            text: text.to_string(),
            notification_id: notification.id,
        });
        Ok(())
    }
}

/// Scripted upstream: pops one response per fetch and records every request.
#[derive(Default)]
pub struct FakeSource {
    pub responses: Mutex<VecDeque<Result<NotificationBatch>>>,
    pub requests: Mutex<Vec<(i64, u32)>>,
    /// When set, a fetch with nothing scripted blocks until canceled.
    pub hang_when_empty: bool,
}

impl FakeSource {
    pub fn push(&self, res: Result<NotificationBatch>) {
        self.responses.lock().unwrap().push_back(res);
    }

    pub fn requests(&self) -> Vec<(i64, u32)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSource for FakeSource {
    async fn fetch(
        &self,
        last_id: i64,
        limit: u32,
        cancel: &CancellationToken,
    ) -> Result<NotificationBatch> {
        self.requests.lock().unwrap().push((last_id, limit));
        let next = self.responses.lock().unwrap().pop_front();
        match next {
            Some(res) => res,
            None if self.hang_when_empty => {
                cancel.cancelled().await;
                Err(Error::Canceled)
            }
            None => Ok(NotificationBatch {
                notifications: Vec::new(),
                last_id,
            }),
        }
    }
}

pub fn notification(id: i64, users: &[(&str, &str)]) -> Notification {
    Notification {
        id,
        path: format!("/app/key{id}"),
        version: 1,
        content_type: "text/plain".to_string(),
        value: Some(format!("v{id}")),
        mtime: "2024-01-01 10:00:00".to_string(),
        author: "alice".to_string(),
        comment: String::new(),
        action: "modify".to_string(),
        notification_mode: "with-value".to_string(),
        users: users
            .iter()
            .map(|(u, a)| (u.to_string(), a.to_string()))
            .collect(),
    }
}
