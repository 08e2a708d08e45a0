//! Per-batch configuration snapshot.
//!
//! The notifier never reads ambient configuration: the pump takes one
//! [`NotifySettings`] snapshot per batch from a `watch` channel.

use std::{
    path::PathBuf,
    sync::Arc,
    time::{Duration, SystemTime},
};

use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{config::Config, users::UserMap, Result};

const USER_MAP_POLL_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct NotifySettings {
    pub user_map: UserMap,
    pub user_domain: String,
    /// Base URL for deep links; the changed path becomes its fragment.
    pub link_url: Option<String>,
    /// Upper bound for a single recipient delivery.
    pub delivery_timeout: Duration,
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self {
            user_map: UserMap::default(),
            user_domain: String::new(),
            link_url: None,
            delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
        }
    }
}

impl NotifySettings {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let user_map = match &cfg.user_map_file {
            Some(path) => UserMap::load(path)?,
            None => UserMap::default(),
        };
        Ok(Self {
            user_map,
            user_domain: cfg.user_domain.clone(),
            link_url: cfg.link_url.clone(),
            delivery_timeout: cfg.delivery_timeout,
        })
    }
}

pub type SettingsRx = watch::Receiver<Arc<NotifySettings>>;
pub type SettingsTx = watch::Sender<Arc<NotifySettings>>;

pub fn channel(initial: NotifySettings) -> (SettingsTx, SettingsRx) {
    watch::channel(Arc::new(initial))
}

/// Poll the user map file's mtime and publish a new snapshot when it changes.
///
/// A file that fails to parse keeps the previous snapshot.
pub fn spawn_user_map_watcher(
    path: PathBuf,
    tx: SettingsTx,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_modified = modified_at(&path);
        let mut tick = tokio::time::interval(USER_MAP_POLL_INTERVAL);
        loop {
            tokio::select! {
              _ = cancel.cancelled() => break,
              _ = tick.tick() => {
                let modified = modified_at(&path);
                if modified.is_none() || modified == last_modified {
                  continue;
                }
                last_modified = modified;

                match UserMap::load(&path) {
                  Ok(user_map) => {
                    tracing::info!(path = %path.display(), users = user_map.len(), "user map reloaded");
                    tx.send_modify(|current| {
                      let mut next = (**current).clone();
                      next.user_map = user_map;
                      *current = Arc::new(next);
                    });
                  }
                  Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to reload user map");
                  }
                }
              }
            }
        }
    })
}

fn modified_at(path: &std::path::Path) -> Option<SystemTime> {
    std::fs::metadata(path).ok()?.modified().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::UserMapper;

    #[tokio::test]
    async fn watcher_publishes_reloaded_map() {
        let path = std::env::temp_dir().join(format!("ocb-user-map-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"alice": "a1"}"#).unwrap();

        let (tx, mut rx) = channel(NotifySettings {
            user_map: UserMap::load(&path).unwrap(),
            ..NotifySettings::default()
        });
        let cancel = CancellationToken::new();
        let handle = spawn_user_map_watcher(path.clone(), tx, cancel.clone());

        // Make sure the new mtime differs even on coarse filesystems.
        tokio::time::sleep(Duration::from_millis(1100)).await;
        std::fs::write(&path, r#"{"alice": "a2"}"#).unwrap();

        tokio::time::timeout(Duration::from_secs(10), rx.changed())
            .await
            .unwrap()
            .unwrap();
        let snapshot = rx.borrow().clone();
        assert_eq!(
            UserMapper::new(&snapshot.user_map, "").map("alice").as_deref(),
            Some("a2")
        );

        cancel.cancel();
        handle.await.unwrap();
        let _ = std::fs::remove_file(&path);
    }
}
