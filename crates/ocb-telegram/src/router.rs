use std::{sync::Arc, time::Duration};

use anyhow::Context;
use teloxide::{
    dispatching::Dispatcher, dptree, error_handlers::LoggingErrorHandler, prelude::*,
};
use tokio_util::sync::CancellationToken;

use ocb_core::ports::SubscriptionStore;

use crate::handlers;

/// Shared by every update handler.
pub struct AppState {
    pub subscriptions: Arc<dyn SubscriptionStore>,
    /// Telegram user ids allowed to list subscribers.
    pub admins: Vec<String>,
}

impl AppState {
    pub fn is_admin(&self, user: &str) -> bool {
        self.admins.iter().any(|a| a == user)
    }
}

/// Long-poll Telegram updates until `cancel` fires.
pub async fn run_polling(
    bot: Bot,
    state: Arc<AppState>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let me = bot.get_me().await.context("telegram getMe failed")?;
    tracing::info!(username = %me.username(), "telegram update processor started");

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .error_handler(LoggingErrorHandler::with_custom_text(
            "telegram update handler failed",
        ))
        .build();

    let token = dispatcher.shutdown_token();
    let stopper = tokio::spawn(async move {
        cancel.cancelled().await;
        // Shutdown is refused until the dispatcher is actually running.
        loop {
            match token.shutdown() {
                Ok(stopped) => {
                    stopped.await;
                    break;
                }
                Err(_) => tokio::time::sleep(Duration::from_millis(100)).await,
            }
        }
    });

    dispatcher.dispatch().await;
    stopper.abort();
    tracing::info!("telegram update processor stopped");
    Ok(())
}
