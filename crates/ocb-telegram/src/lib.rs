//! Telegram adapter (teloxide).
//!
//! This crate implements the `ocb-core` BotBackend over Telegram Bot API.
//! Messenger identities are Telegram user ids; a private chat with a user
//! has the same id, so recipients are sent to directly.

use std::sync::Arc;

use async_trait::async_trait;
use teloxide::{
    prelude::*,
    types::{ChatId, InlineKeyboardButton, InlineKeyboardMarkup, MessageEntity},
};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

pub mod handlers;
pub mod router;

use ocb_core::{
    domain::BotId, errors::Error, messaging::port::BotBackend, notification::Notification,
    ports::SubscriptionStore, Result,
};

use crate::router::AppState;

#[derive(Clone)]
pub struct TelegramBot {
    bot: Bot,
    id: BotId,
    state: Arc<AppState>,
}

impl TelegramBot {
    /// The cursor key defaults to the numeric prefix of the token.
    pub fn new(
        token: &str,
        subscriptions: Arc<dyn SubscriptionStore>,
        admins: Vec<String>,
    ) -> Result<Self> {
        let id = bot_id_from_token(token)?;
        Ok(Self {
            bot: Bot::new(token),
            id,
            state: Arc::new(AppState {
                subscriptions,
                admins,
            }),
        })
    }

    pub fn with_id(mut self, id: BotId) -> Self {
        self.id = id;
        self
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::Delivery(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }
}

fn bot_id_from_token(token: &str) -> Result<BotId> {
    token
        .split(':')
        .next()
        .and_then(|prefix| prefix.parse::<i64>().ok())
        .map(BotId)
        .ok_or_else(|| Error::Config("malformed TELEGRAM_BOT_TOKEN".to_string()))
}

fn chat_id(recipient: &str) -> Result<ChatId> {
    recipient
        .parse::<i64>()
        .map(ChatId)
        .map_err(|_| Error::Delivery(format!("not a telegram user id: {recipient}")))
}

fn open_button(link: Option<&str>) -> Option<InlineKeyboardMarkup> {
    let url = reqwest::Url::parse(link?).ok()?;
    Some(InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::url("Open", url),
    ]]))
}

/// Messages go out as plain text, so the author's numeric id on the second
/// line is turned into a clickable mention through a text-link entity.
/// Offsets are counted in UTF-16 code units.
fn author_entity(text: &str) -> Option<MessageEntity> {
    let line_start = text.find('\n')? + 1;
    let line = text[line_start..].split('\n').next()?;
    let (_, mention) = line.split_once(' ')?;
    let id = mention.parse::<i64>().ok()?;
    let url = reqwest::Url::parse(&format!("tg://user?id={id}")).ok()?;
    let mention_start = line_start + line.len() - mention.len();
    let offset = text[..mention_start].encode_utf16().count();
    Some(MessageEntity::text_link(url, offset, mention.encode_utf16().count()))
}

#[async_trait]
impl BotBackend for TelegramBot {
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
        let chat = chat_id(recipient)?;
        let markup = open_button(link);
        let mention = author_entity(text);
        self.with_retry(|| {
            let mut req = self.bot.send_message(chat, text.to_string());
            if let Some(entity) = &mention {
                req = req.entities(vec![entity.clone()]);
            }
            match &markup {
                Some(m) => req.reply_markup(m.clone()),
                None => req,
            }
        })
        .await?;
        Ok(())
    }

    async fn process_updates(&self, cancel: CancellationToken) -> Result<()> {
        router::run_polling(self.bot.clone(), self.state.clone(), cancel)
            .await
            .map_err(|e| Error::External(format!("telegram dispatcher: {e}")))
    }
}
