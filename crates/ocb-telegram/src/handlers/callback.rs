use std::sync::Arc;

use teloxide::{prelude::*, types::ChatId};

use crate::router::AppState;

use super::commands::{SUBSCRIBE_READ, SUBSCRIBE_WRITE};

/// `Some(can_edit)` for a subscribe button, `None` for anything else.
fn subscription_choice(data: &str) -> Option<bool> {
    match data {
        SUBSCRIBE_WRITE => Some(true),
        SUBSCRIBE_READ => Some(false),
        _ => None,
    }
}

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let cb_id = q.id.clone();
    let user = q.from.id.0.to_string();

    // Always answer callback query eventually.
    let Some(can_edit) = q.data.as_deref().and_then(subscription_choice) else {
        let _ = bot.answer_callback_query(cb_id).await;
        return Ok(());
    };

    if let Err(e) = state.subscriptions.subscribe(&user, can_edit).await {
        tracing::error!(user = %user, error = %e, "failed to subscribe");
        let _ = bot
            .answer_callback_query(cb_id)
            .text("Internal error".to_string())
            .await;
        return Ok(());
    }

    let _ = bot.answer_callback_query(cb_id).await;
    let which = if can_edit { "edit" } else { "view" };
    bot.send_message(
        ChatId(q.from.id.0 as i64),
        format!("You subscribed to parameters you can {which}"),
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_subscribe_buttons() {
        assert_eq!(subscription_choice("subscribe write"), Some(true));
        assert_eq!(subscription_choice("subscribe read"), Some(false));
        assert_eq!(subscription_choice("askuser:1:2"), None);
    }
}
