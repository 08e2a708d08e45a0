//! Telegram update handlers.
//!
//! Store failures are logged and answered with "Internal error" so the user
//! always gets a reply. Telegram API errors from sending that reply are
//! returned to the dispatcher, whose error handler logs them.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message},
};

use crate::router::AppState;

mod callback;
mod commands;

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    callback::handle_callback(bot, q, state).await
}

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    if text.starts_with('/') {
        return commands::handle_command(bot, msg, state).await;
    }
    Ok(())
}
