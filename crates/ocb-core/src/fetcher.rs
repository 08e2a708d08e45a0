//! Long-poll client for the onlineconf bot API.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{errors::Error, notification::NotificationBatch, ports::NotificationSource, Result};

const NOTIFICATION_PATH: &str = "/botapi/notification/";

/// Headroom on top of the long-poll wait before the client gives up.
const REQUEST_SLACK: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct BotApiConfig {
    pub url: String,
    pub username: String,
    pub password: String,
    /// How long the server may hold a request open.
    pub wait: Duration,
}

#[derive(Clone, Debug)]
pub struct BotApiClient {
    cfg: BotApiConfig,
    endpoint: reqwest::Url,
    http: reqwest::Client,
}

impl BotApiClient {
    pub fn new(cfg: BotApiConfig) -> Result<Self> {
        let mut endpoint = reqwest::Url::parse(&cfg.url)
            .map_err(|e| Error::Config(format!("invalid bot API url {}: {e}", cfg.url)))?;
        endpoint.set_path(NOTIFICATION_PATH);
        endpoint.set_query(None);

        let http = reqwest::Client::builder()
            .timeout(cfg.wait + REQUEST_SLACK)
            .build()
            .map_err(|e| Error::Config(format!("failed to build http client: {e}")))?;

        Ok(Self {
            cfg,
            endpoint,
            http,
        })
    }

    async fn get(&self, last_id: i64, limit: u32) -> Result<NotificationBatch> {
        let resp = self
            .http
            .get(self.endpoint.clone())
            .query(&[
                ("lastID", last_id.to_string()),
                ("limit", limit.to_string()),
                ("wait", self.cfg.wait.as_secs().to_string()),
            ])
            .basic_auth(&self.cfg.username, Some(&self.cfg.password))
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("request failed: {e}")))?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            return Err(Error::Upstream(format!(
                "GET {} returned {status}",
                self.endpoint
            )));
        }

        resp.json::<NotificationBatch>()
            .await
            .map_err(|e| Error::Upstream(format!("malformed notifications payload: {e}")))
    }
}

#[async_trait]
impl NotificationSource for BotApiClient {
    async fn fetch(
        &self,
        last_id: i64,
        limit: u32,
        cancel: &CancellationToken,
    ) -> Result<NotificationBatch> {
        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Canceled),
            res = self.get(last_id, limit) => res,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };

    use axum::{
        extract::{Query, State},
        http::{HeaderMap, StatusCode},
        routing::get,
        Router,
    };

    #[derive(Default)]
    struct Seen {
        queries: Vec<HashMap<String, String>>,
        auth: Vec<Option<String>>,
    }

    #[derive(Clone)]
    struct Upstream {
        seen: Arc<Mutex<Seen>>,
        status: StatusCode,
        body: &'static str,
        delay: Duration,
    }

    async fn handler(
        State(up): State<Upstream>,
        Query(q): Query<HashMap<String, String>>,
        headers: HeaderMap,
    ) -> (StatusCode, String) {
        {
            let mut seen = up.seen.lock().unwrap();
            seen.queries.push(q);
            seen.auth.push(
                headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string),
            );
        }
        tokio::time::sleep(up.delay).await;
        (up.status, up.body.to_string())
    }

    async fn serve(up: Upstream) -> String {
        let app = Router::new()
            .route(NOTIFICATION_PATH, get(handler))
            .with_state(up);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn client(url: String) -> BotApiClient {
        BotApiClient::new(BotApiConfig {
            url,
            username: "bot".to_string(),
            password: "secret".to_string(),
            wait: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn upstream(status: StatusCode, body: &'static str) -> Upstream {
        Upstream {
            seen: Arc::new(Mutex::new(Seen::default())),
            status,
            body,
            delay: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn sends_long_poll_parameters_and_basic_auth() {
        let up = upstream(
            StatusCode::OK,
            r#"{"notifications":[{"id":5,"path":"/a","action":"create"}],"lastID":6}"#,
        );
        let seen = up.seen.clone();
        let c = client(serve(up).await);

        let batch = c.fetch(4, 100, &CancellationToken::new()).await.unwrap();
        assert_eq!(batch.last_id, 6);
        assert_eq!(batch.notifications.len(), 1);
        assert_eq!(batch.notifications[0].id, 5);

        let seen = seen.lock().unwrap();
        let q = &seen.queries[0];
        assert_eq!(q.get("lastID").map(String::as_str), Some("4"));
        assert_eq!(q.get("limit").map(String::as_str), Some("100"));
        assert_eq!(q.get("wait").map(String::as_str), Some("5"));
        // base64("bot:secret")
        assert_eq!(seen.auth[0].as_deref(), Some("Basic Ym90OnNlY3JldA=="));
    }

    #[tokio::test]
    async fn non_200_is_upstream_error() {
        let c = client(serve(upstream(StatusCode::BAD_GATEWAY, "oops")).await);
        let err = c.fetch(1, 10, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, Error::Upstream(msg) if msg.contains("502")));
    }

    #[tokio::test]
    async fn malformed_payload_is_upstream_error() {
        let c = client(serve(upstream(StatusCode::OK, "{\"lastID\":")).await);
        let err = c.fetch(1, 10, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, Error::Upstream(_)));
    }

    #[tokio::test]
    async fn cancel_interrupts_long_poll() {
        let mut up = upstream(StatusCode::OK, r#"{"lastID":1}"#);
        up.delay = Duration::from_secs(30);
        let c = client(serve(up).await);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = c.fetch(1, 10, &cancel).await.unwrap_err();
        assert!(err.is_canceled());
    }

    #[test]
    fn endpoint_replaces_configured_path() {
        let c = client("https://oc.example/some/prefix?x=1".to_string());
        assert_eq!(
            c.endpoint.as_str(),
            "https://oc.example/botapi/notification/"
        );
    }

    #[test]
    fn invalid_url_is_config_error() {
        let err = BotApiClient::new(BotApiConfig {
            url: "not a url".to_string(),
            username: String::new(),
            password: String::new(),
            wait: Duration::from_secs(1),
        })
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
