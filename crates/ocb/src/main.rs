use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use ocb_core::{
    config::{BackendKind, Config},
    domain::BotId,
    fetcher::BotApiClient,
    memory::MemoryStore,
    messaging::{
        audit::AuditBot,
        debug::DebugBot,
        port::BotBackend,
        throttled::{ThrottleConfig, ThrottledBot},
    },
    notifier::Notifier,
    ports::{CursorStore, SubscriptionStore},
    pump::RelayPump,
    settings::{self, NotifySettings},
    Error,
};
use ocb_mysql::MySqlStore;
use ocb_telegram::TelegramBot;

const DEBUG_BOT_ID: BotId = BotId(0);
const AUDIT_BOT_ID: BotId = BotId(1);

type Stores = (Arc<dyn CursorStore>, Arc<dyn SubscriptionStore>);

#[tokio::main]
async fn main() -> Result<(), Error> {
    ocb_core::logging::init("ocb")?;

    let cfg = Config::load()?;
    let (cursors, subscriptions) = open_stores(&cfg).await?;
    let bot = build_backend(&cfg, subscriptions.clone())?;
    tracing::info!(backend = ?cfg.backend, bot_id = %bot.id(), "starting relay");

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    let (settings_tx, settings_rx) = settings::channel(NotifySettings::from_config(&cfg)?);
    let watcher = cfg
        .user_map_file
        .clone()
        .map(|path| settings::spawn_user_map_watcher(path, settings_tx, shutdown.clone()));

    let updates = {
        let bot = bot.clone();
        let cancel = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = bot.process_updates(cancel).await {
                tracing::error!(error = %e, "update processor failed");
            }
        })
    };

    let source = Arc::new(BotApiClient::new(cfg.botapi())?);
    let pump = RelayPump::new(
        cfg.pump(),
        source,
        cursors,
        Notifier::new(bot, subscriptions),
        settings_rx,
    );
    pump.run(shutdown.clone()).await;

    let _ = updates.await;
    if let Some(watcher) = watcher {
        let _ = watcher.await;
    }
    tracing::info!("relay stopped");
    Ok(())
}

async fn open_stores(cfg: &Config) -> Result<Stores, Error> {
    match &cfg.database_url {
        Some(url) => {
            let pool = ocb_mysql::connect(url).await?;
            if cfg.database_migrate {
                ocb_mysql::run_migrations(&pool).await?;
            }
            let store = MySqlStore::new(pool);
            Ok((Arc::new(store.clone()), Arc::new(store)))
        }
        None if cfg.backend == BackendKind::Telegram => Err(Error::Config(
            "DATABASE_URL is required for the telegram backend".to_string(),
        )),
        None => {
            tracing::warn!("DATABASE_URL not set, cursor and subscriptions live in memory only");
            let store = MemoryStore::new();
            Ok((Arc::new(store.clone()), Arc::new(store)))
        }
    }
}

fn build_backend(
    cfg: &Config,
    subscriptions: Arc<dyn SubscriptionStore>,
) -> Result<Arc<dyn BotBackend>, Error> {
    let id_override = cfg.bot_id.map(BotId);
    let bot: Arc<dyn BotBackend> = match cfg.backend {
        BackendKind::Telegram => {
            let token = cfg.telegram_bot_token.as_deref().ok_or_else(|| {
                Error::Config("TELEGRAM_BOT_TOKEN environment variable is required".to_string())
            })?;
            let mut telegram = TelegramBot::new(token, subscriptions, cfg.admins.clone())?;
            if let Some(id) = id_override {
                telegram = telegram.with_id(id);
            }
            // Keep well under Telegram's flood limits; 429s are still retried by the adapter.
            Arc::new(ThrottledBot::new(
                Arc::new(telegram),
                ThrottleConfig::default(),
            ))
        }
        BackendKind::Debug => Arc::new(DebugBot::stdout(id_override.unwrap_or(DEBUG_BOT_ID))),
        BackendKind::Audit => Arc::new(AuditBot::new(id_override.unwrap_or(AUDIT_BOT_ID))),
    };
    Ok(bot)
}

async fn cancel_on_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    tracing::info!("shutdown requested");
    shutdown.cancel();
}
