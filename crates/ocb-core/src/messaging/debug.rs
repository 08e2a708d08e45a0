use std::{
    io::Write,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;

use crate::{
    domain::BotId, errors::Error, messaging::port::BotBackend, notification::Notification, Result,
};

/// Backend that prints every delivery instead of sending it.
///
/// Filters by subscription like a real messenger, so it is useful for
/// exercising the whole relay against a local store.
pub struct DebugBot {
    id: BotId,
    out: Arc<Mutex<dyn Write + Send>>,
}

impl DebugBot {
    pub fn stdout(id: BotId) -> Self {
        Self::with_writer(id, Arc::new(Mutex::new(std::io::stdout())))
    }

    pub fn with_writer(id: BotId, out: Arc<Mutex<dyn Write + Send>>) -> Self {
        Self { id, out }
    }
}

#[async_trait]
impl BotBackend for DebugBot {
    fn id(&self) -> BotId {
        self.id
    }

    fn requires_subscriber_filter(&self) -> bool {
        true
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
        text: &str,
        _notification: &Notification,
    ) -> Result<()> {
        let mut out = self
            .out
            .lock()
            .map_err(|_| Error::Delivery("debug writer poisoned".to_string()))?;
        writeln!(out, "to: {recipient}\n{}\n{text}", link.unwrap_or(""))
            .map_err(|e| Error::Delivery(format!("debug write failed: {e}")))
    }
}
