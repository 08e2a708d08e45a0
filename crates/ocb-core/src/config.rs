use std::{env, path::PathBuf, str::FromStr, time::Duration};

use crate::{errors::Error, fetcher::BotApiConfig, pump::PumpConfig, Result};

/// Which delivery backend the process drives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    Telegram,
    Debug,
    Audit,
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "telegram" => Ok(BackendKind::Telegram),
            "debug" => Ok(BackendKind::Debug),
            "audit" => Ok(BackendKind::Audit),
            other => Err(Error::Config(format!("unknown OCB_BACKEND: {other}"))),
        }
    }
}

/// Typed process configuration, read once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    // Backend
    pub backend: BackendKind,
    pub bot_id: Option<i64>,
    pub telegram_bot_token: Option<String>,
    pub admins: Vec<String>,

    // Storage
    pub database_url: Option<String>,
    pub database_migrate: bool,

    // Upstream bot API
    pub botapi_url: String,
    pub botapi_username: String,
    pub botapi_password: String,
    pub botapi_wait: Duration,

    // Relay pump
    pub interval: Duration,
    pub batch_size: u32,
    pub stop_timeout: Duration,
    pub delivery_timeout: Duration,

    // Users / links
    pub user_map_file: Option<PathBuf>,
    pub user_domain: String,
    pub link_url: Option<String>,
}

impl Config {
    /// Load from the process environment, after an optional `.env` file.
    pub fn load() -> Result<Self> {
        // Existing environment variables win over `.env`.
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
            Err(e) if e.not_found() => {}
            Err(e) => return Err(Error::Config(format!("failed to read .env: {e}"))),
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);

        let backend = match get("OCB_BACKEND") {
            Some(v) => v.parse()?,
            None => BackendKind::Telegram,
        };
        let bot_id = parse_opt::<i64>(&get, "OCB_BOT_ID")?;

        let telegram_bot_token = get("TELEGRAM_BOT_TOKEN");
        if backend == BackendKind::Telegram && telegram_bot_token.is_none() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let botapi_url = get("ONLINECONF_BOTAPI_URL").ok_or_else(|| {
            Error::Config("ONLINECONF_BOTAPI_URL environment variable is required".to_string())
        })?;

        let batch_size = parse_opt::<u32>(&get, "RELAY_BATCH_SIZE")?.unwrap_or(100);
        if batch_size == 0 {
            return Err(Error::Config("RELAY_BATCH_SIZE must be positive".to_string()));
        }
        let delivery_timeout = secs(&get, "DELIVERY_TIMEOUT_SECS", 30)?;
        if delivery_timeout.is_zero() {
            return Err(Error::Config("DELIVERY_TIMEOUT_SECS must be positive".to_string()));
        }

        Ok(Self {
            backend,
            bot_id,
            telegram_bot_token,
            admins: parse_csv(get("BOT_ADMINS")),
            database_url: get("DATABASE_URL"),
            database_migrate: get("DATABASE_MIGRATE").map(|v| parse_bool(&v)).unwrap_or(false),
            botapi_url,
            botapi_username: get("ONLINECONF_BOTAPI_USERNAME")
                .unwrap_or_else(|| "onlineconf-bot".to_string()),
            botapi_password: get("ONLINECONF_BOTAPI_PASSWORD").unwrap_or_default(),
            botapi_wait: secs(&get, "ONLINECONF_BOTAPI_WAIT", 60)?,
            interval: secs(&get, "RELAY_INTERVAL_SECS", 1)?,
            batch_size,
            stop_timeout: secs(&get, "RELAY_STOP_TIMEOUT_SECS", 15)?,
            delivery_timeout,
            user_map_file: get("USER_MAP_FILE").map(PathBuf::from),
            user_domain: get("USER_DOMAIN").unwrap_or_default(),
            link_url: get("LINK_URL"),
        })
    }

    pub fn pump(&self) -> PumpConfig {
        PumpConfig {
            interval: self.interval,
            batch_size: self.batch_size,
            stop_timeout: self.stop_timeout,
        }
    }

    pub fn botapi(&self) -> BotApiConfig {
        BotApiConfig {
            url: self.botapi_url.clone(),
            username: self.botapi_username.clone(),
            password: self.botapi_password.clone(),
            wait: self.botapi_wait,
        }
    }
}

fn parse_opt<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>> {
    get(key)
        .map(|v| {
            v.trim()
                .parse::<T>()
                .map_err(|_| Error::Config(format!("{key} is not a valid number: {v}")))
        })
        .transpose()
}

fn secs(get: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> Result<Duration> {
    Ok(Duration::from_secs(
        parse_opt::<u64>(get, key)?.unwrap_or(default),
    ))
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_csv(v: Option<String>) -> Vec<String> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_match_relay_contract() {
        let cfg = Config::from_lookup(lookup(&[
            ("OCB_BACKEND", "debug"),
            ("ONLINECONF_BOTAPI_URL", "http://oc.local"),
        ]))
        .unwrap();

        assert_eq!(cfg.backend, BackendKind::Debug);
        assert_eq!(cfg.interval, Duration::from_secs(1));
        assert_eq!(cfg.batch_size, 100);
        assert_eq!(cfg.stop_timeout, Duration::from_secs(15));
        assert_eq!(cfg.botapi_wait, Duration::from_secs(60));
        assert_eq!(cfg.botapi_username, "onlineconf-bot");
        assert!(cfg.database_url.is_none());
        assert!(!cfg.database_migrate);
    }

    #[test]
    fn telegram_requires_token() {
        let err = Config::from_lookup(lookup(&[("ONLINECONF_BOTAPI_URL", "http://oc.local")]))
            .unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("TELEGRAM_BOT_TOKEN")));
    }

    #[test]
    fn upstream_url_is_required() {
        let err = Config::from_lookup(lookup(&[("OCB_BACKEND", "audit")])).unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("ONLINECONF_BOTAPI_URL")));
    }

    #[test]
    fn parses_overrides_and_admins() {
        let cfg = Config::from_lookup(lookup(&[
            ("OCB_BACKEND", "audit"),
            ("OCB_BOT_ID", "42"),
            ("ONLINECONF_BOTAPI_URL", "http://oc.local"),
            ("RELAY_BATCH_SIZE", "5"),
            ("RELAY_STOP_TIMEOUT_SECS", "3"),
            ("BOT_ADMINS", " root, ops ,"),
            ("DATABASE_MIGRATE", "yes"),
        ]))
        .unwrap();

        assert_eq!(cfg.bot_id, Some(42));
        assert_eq!(cfg.pump().batch_size, 5);
        assert_eq!(cfg.pump().stop_timeout, Duration::from_secs(3));
        assert_eq!(cfg.admins, vec!["root", "ops"]);
        assert!(cfg.database_migrate);
    }

    #[test]
    fn rejects_garbage_numbers() {
        let err = Config::from_lookup(lookup(&[
            ("OCB_BACKEND", "debug"),
            ("ONLINECONF_BOTAPI_URL", "http://oc.local"),
            ("RELAY_INTERVAL_SECS", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn rejects_zero_batch_size_and_delivery_timeout() {
        for key in ["RELAY_BATCH_SIZE", "DELIVERY_TIMEOUT_SECS"] {
            let err = Config::from_lookup(lookup(&[
                ("OCB_BACKEND", "debug"),
                ("ONLINECONF_BOTAPI_URL", "http://oc.local"),
                (key, "0"),
            ]))
            .unwrap_err();
            assert!(err.to_string().contains(key), "{key}: {err}");
        }
    }

    #[test]
    fn unknown_backend_is_rejected() {
        assert!("slack".parse::<BackendKind>().is_err());
        assert_eq!(" Audit ".parse::<BackendKind>().unwrap(), BackendKind::Audit);
    }
}
