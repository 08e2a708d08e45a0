use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup},
};

use ocb_core::domain::Subscription;

use crate::router::AppState;

pub(crate) const SUBSCRIBE_WRITE: &str = "subscribe write";
pub(crate) const SUBSCRIBE_READ: &str = "subscribe read";

fn parse_command(text: &str) -> String {
    // Telegram may send `/cmd@botname arg1 ...`
    let first = text.split_whitespace().next().unwrap_or("");
    first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase()
}

fn subscribe_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("I can edit", SUBSCRIBE_WRITE),
        InlineKeyboardButton::callback("I can view", SUBSCRIBE_READ),
    ]])
}

fn format_subscribers(subscribers: &[Subscription]) -> String {
    if subscribers.is_empty() {
        return "No subscribers".to_string();
    }
    subscribers
        .iter()
        .map(|s| {
            let level = if s.can_edit { "edit" } else { "view" };
            format!("{} {level}\n", s.user)
        })
        .collect()
}

pub async fn handle_command(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(from) = msg.from() else {
        return Ok(());
    };
    let user = from.id.0.to_string();
    let cmd = parse_command(msg.text().unwrap_or(""));

    match cmd.as_str() {
        "start" => {
            bot.send_message(msg.chat.id, "Choose parameters you want to subscribe to")
                .reply_markup(subscribe_keyboard())
                .await?;
        }
        "stop" => match state.subscriptions.unsubscribe(&user).await {
            Ok(()) => {
                bot.send_message(msg.chat.id, "You unsubscribed").await?;
            }
            Err(e) => {
                tracing::error!(user = %user, error = %e, "failed to unsubscribe");
                bot.send_message(msg.chat.id, "Internal error").await?;
            }
        },
        "subscribers" if state.is_admin(&user) => match state.subscriptions.subscribers().await {
            Ok(subs) => {
                bot.send_message(msg.chat.id, format_subscribers(&subs))
                    .await?;
            }
            Err(e) => {
                tracing::error!(user = %user, error = %e, "failed to list subscribers");
                bot.send_message(msg.chat.id, "Internal error").await?;
            }
        },
        _ => {}
    }
    Ok(())
}
