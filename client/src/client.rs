use chrono::Utc;
use flamydash_types::{
    api::{AnalyticsAck, AnalyticsEvent, AzGameResponse, EmbedInfo, GamesList, HealthResponse},
    codec::{self, RequestParams},
    ErrorBody, PageContext,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::fallback;
use crate::recorder::enrich_event_data;
use crate::{Error, Result};

/// Retry behaviour for transient failures (connection errors, 429 and 5xx).
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Whether POSTs are retried too.
    pub retry_non_idempotent: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
            retry_non_idempotent: false,
        }
    }
}

impl RetryPolicy {
    fn backoff(&self, attempt: usize) -> Duration {
        let factor = 1u32 << attempt.min(16) as u32;
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout()
}

/// HTTP client for the portal API.
#[derive(Clone)]
pub struct Client {
    pub base_url: Url,
    http: reqwest::Client,
    retry_policy: RetryPolicy,
    page: PageContext,
}

impl Client {
    pub fn new(base_url: &str) -> Result<Self> {
        let mut base_url = Url::parse(base_url)?;
        match base_url.scheme() {
            "http" | "https" => {}
            scheme => return Err(Error::InvalidScheme(scheme.to_string())),
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            base_url,
            http: reqwest::Client::new(),
            retry_policy: RetryPolicy::default(),
            page: PageContext::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Page the requests claim to come from.
    pub fn with_page(mut self, page: PageContext) -> Self {
        self.page = page;
        self
    }

    pub fn page(&self) -> &PageContext {
        &self.page
    }

    pub(crate) async fn get_with_retry(&self, url: Url) -> Result<reqwest::Response> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let last = attempt >= self.retry_policy.max_attempts.max(1);
            match self.http.get(url.clone()).send().await {
                Ok(response) if !last && is_retryable_status(response.status()) => {
                    debug!(url = %url, status = %response.status(), attempt, "retrying request");
                }
                Ok(response) => return Ok(response),
                Err(err) if !last && is_retryable_error(&err) => {
                    debug!(url = %url, ?err, attempt, "retrying request");
                }
                Err(err) => return Err(err.into()),
            }
            tokio::time::sleep(self.retry_policy.backoff(attempt - 1)).await;
        }
    }

    pub(crate) async fn post_json_with_retry<T: Serialize + ?Sized>(
        &self,
        url: Url,
        body: &T,
    ) -> Result<reqwest::Response> {
        let max_attempts = if self.retry_policy.retry_non_idempotent {
            self.retry_policy.max_attempts.max(1)
        } else {
            1
        };
        let mut attempt = 0;
        loop {
            attempt += 1;
            let last = attempt >= max_attempts;
            match self.http.post(url.clone()).json(body).send().await {
                Ok(response) if !last && is_retryable_status(response.status()) => {
                    debug!(url = %url, status = %response.status(), attempt, "retrying request");
                }
                Ok(response) => return Ok(response),
                Err(err) if !last && is_retryable_error(&err) => {
                    debug!(url = %url, ?err, attempt, "retrying request");
                }
                Err(err) => return Err(err.into()),
            }
            tokio::time::sleep(self.retry_policy.backoff(attempt - 1)).await;
        }
    }

    async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }
        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ErrorBody>(&body) {
            Ok(error) => Err(Error::Api {
                status,
                code: error.code,
                error: error.error,
            }),
            Err(_) if body.is_empty() => Err(Error::Failed(status)),
            Err(_) => Err(Error::FailedWithBody { status, body }),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path)?;
        Self::read_json(self.get_with_retry(url).await?).await
    }

    /// Request parameters for `game_id` from the configured page, stamped now.
    pub fn game_params(&self, game_id: &str) -> RequestParams {
        RequestParams::for_page(&self.page, game_id, codec::now_secs())
    }

    pub async fn get_game_config(&self, game_id: &str) -> Result<AzGameResponse> {
        self.get_game_config_with(&self.game_params(game_id)).await
    }

    pub async fn get_game_config_with(&self, params: &RequestParams) -> Result<AzGameResponse> {
        let token = codec::encode(params)?;
        let mut url = self.base_url.join("api/sdk/gmadsv1")?;
        url.query_pairs_mut().append_pair("params", &token);
        Self::read_json(self.get_with_retry(url).await?).await
    }

    /// Config from the API, or the static fallback when the API cannot answer.
    pub async fn get_game_config_or_fallback(&self, game_id: &str) -> AzGameResponse {
        match self.get_game_config(game_id).await {
            Ok(config) => config,
            Err(err) => {
                warn!(?err, game_id, "game config unavailable; using static fallback");
                fallback::fallback_config(None, game_id, &self.page.domain)
            }
        }
    }

    pub async fn games(&self) -> Result<GamesList> {
        self.get_json("api/games").await
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        self.get_json("api/health").await
    }

    pub async fn game_embed(&self, game_id: &str) -> Result<EmbedInfo> {
        let mut url = self.base_url.join("api/games/")?;
        url.path_segments_mut()
            .map_err(|_| Error::InvalidScheme(self.base_url.scheme().to_string()))?
            .pop_if_empty()
            .push(game_id)
            .push("embed");
        Self::read_json(self.get_with_retry(url).await?).await
    }

    /// Post an analytics event, adding `timestamp`, `url` and `user_agent` to its data.
    pub async fn record_game_event(
        &self,
        event_type: &str,
        game_id: &str,
        data: Map<String, Value>,
    ) -> Result<AnalyticsAck> {
        let data = enrich_event_data(data, &self.page, Utc::now());
        let event = AnalyticsEvent::new(event_type, game_id, data);
        let url = self.base_url.join("api/analytics/events")?;
        Self::read_json(self.post_json_with_retry(url, &event).await?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::State as AxumState,
        http::StatusCode as AxumStatusCode,
        routing::{get, post},
        Router,
    };
    use flamydash_server::{Api, Server, ServerConfig};
    use flamydash_types::{Catalog, ErrorCode};
    use std::{
        net::SocketAddr,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
    };
    use tokio::time::sleep;

    struct TestContext {
        base_url: String,
        server_handle: tokio::task::JoinHandle<()>,
    }

    impl TestContext {
        async fn new() -> Self {
            let config = ServerConfig {
                rate_limit_requests: None,
                ..Default::default()
            };
            let server = Arc::new(Server::new_with_config(Catalog::bundled().unwrap(), config));
            let api = Api::new(server);

            // Start server on random port
            let addr = SocketAddr::from(([127, 0, 0, 1], 0));
            let router = api.router();
            let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
            let actual_addr = listener.local_addr().unwrap();
            let base_url = format!("http://{actual_addr}");

            let server_handle = tokio::spawn(async move {
                axum::serve(
                    listener,
                    router.into_make_service_with_connect_info::<SocketAddr>(),
                )
                .await
                .unwrap();
            });

            // Give server time to start
            sleep(Duration::from_millis(100)).await;

            Self {
                base_url,
                server_handle,
            }
        }

        fn create_client(&self) -> Client {
            Client::new(&self.base_url).unwrap()
        }
    }

    impl Drop for TestContext {
        fn drop(&mut self) {
            self.server_handle.abort();
        }
    }

    #[tokio::test]
    async fn test_client_game_config() {
        let ctx = TestContext::new().await;
        let client = ctx.create_client();

        let config = client.get_game_config("flamy-dash").await.unwrap();
        assert_eq!(config.regisinfo.name, "Flamy Dash");
        assert!(config.regisinfo.signed.is_some());
        assert!(config.gameinfo.mount_url().is_some());
        assert!(config.static_mode.is_none());
    }

    #[tokio::test]
    async fn test_client_game_config_errors() {
        let ctx = TestContext::new().await;
        let client = ctx.create_client();

        let err = client.get_game_config("unknown-game").await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::GameNotFound));
        let Error::Api { status, .. } = err else {
            panic!("expected api error");
        };
        assert_eq!(status, reqwest::StatusCode::NOT_FOUND);

        let stale = client
            .game_params("flamy-dash")
            .with("ts", codec::now_secs() - 7200);
        let err = client.get_game_config_with(&stale).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ExpiredRequest));

        let mut incomplete = client.game_params("flamy-dash");
        incomplete.remove("hn");
        let err = client.get_game_config_with(&incomplete).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::InvalidParams));
    }

    #[tokio::test]
    async fn test_client_listing_health_and_embed() {
        let ctx = TestContext::new().await;
        let client = ctx.create_client();

        let games = client.games().await.unwrap();
        assert_eq!(games.total, 1);
        assert_eq!(games.games[0].id, "flamy-dash");

        let health = client.health().await.unwrap();
        assert_eq!(health.status, "healthy");
        assert_eq!(health.games_available, 1);

        let embed = client.game_embed("flamy-dash").await.unwrap();
        assert_eq!((embed.width, embed.height), (960, 600));
        let err = client.game_embed("missing").await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::GameNotFound));
    }

    #[tokio::test]
    async fn test_client_records_events() {
        let ctx = TestContext::new().await;
        let client = ctx.create_client();

        let mut data = Map::new();
        data.insert("score".to_string(), Value::from(1200));
        let ack = client
            .record_game_event("score_achieved", "flamy-dash", data)
            .await
            .unwrap();
        assert!(ack.success);
        assert!(ack.event_id.unwrap().starts_with("evt_"));

        let err = client
            .record_game_event("", "flamy-dash", Map::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::MissingFields));
    }

    #[tokio::test]
    async fn test_client_falls_back_when_unreachable() {
        let ctx = TestContext::new().await;
        let client = ctx
            .create_client()
            .with_retry_policy(RetryPolicy {
                max_attempts: 1,
                ..Default::default()
            });
        drop(ctx);
        sleep(Duration::from_millis(50)).await;

        let config = client.get_game_config_or_fallback("flamy-dash").await;
        assert_eq!(config.static_mode, Some(true));
        assert_eq!(config.regisinfo.name, "Flamy Dash");
    }

    #[test]
    fn test_client_invalid_scheme() {
        let result = Client::new("ftp://example.com");
        assert!(result.is_err());
        if let Err(err) = result {
            assert!(matches!(err, Error::InvalidScheme(_)));
            assert_eq!(
                err.to_string(),
                "invalid URL scheme: ftp (expected http or https)"
            );
        }

        assert!(Client::new("http://localhost:3000").is_ok());
        assert!(Client::new("https://localhost:3000").is_ok());
    }

    #[test]
    fn test_client_base_url_keeps_prefix() {
        let client = Client::new("https://flamydash.com/portal").unwrap();
        assert_eq!(
            client.base_url.join("api/health").unwrap().as_str(),
            "https://flamydash.com/portal/api/health"
        );
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(250),
            ..Default::default()
        };
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(5), Duration::from_millis(250));
    }

    async fn serve_router(router: Router) -> (String, tokio::task::JoinHandle<()>) {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
        let actual_addr = listener.local_addr().unwrap();
        let base_url = format!("http://{actual_addr}");

        let handle = tokio::spawn(async move {
            axum::serve(listener, router.into_make_service())
                .await
                .unwrap();
        });

        sleep(Duration::from_millis(50)).await;
        (base_url, handle)
    }

    #[tokio::test]
    async fn test_get_with_retry_retries_retryable_statuses() {
        let counter = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/flaky",
                get(
                    |AxumState(counter): AxumState<Arc<AtomicUsize>>| async move {
                        let attempt = counter.fetch_add(1, Ordering::SeqCst);
                        if attempt < 2 {
                            AxumStatusCode::SERVICE_UNAVAILABLE
                        } else {
                            AxumStatusCode::OK
                        }
                    },
                ),
            )
            .with_state(counter.clone());

        let (base_url, handle) = serve_router(router).await;
        let client = Client::new(&base_url)
            .unwrap()
            .with_retry_policy(RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::ZERO,
                max_backoff: Duration::ZERO,
                retry_non_idempotent: false,
            });

        let url = client.base_url.join("flaky").unwrap();
        let response = client.get_with_retry(url).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert_eq!(counter.load(Ordering::SeqCst), 3);

        handle.abort();
    }

    #[tokio::test]
    async fn test_post_is_not_retried_by_default() {
        let counter = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/api/analytics/events",
                post(
                    |AxumState(counter): AxumState<Arc<AtomicUsize>>,
                     _body: axum::body::Bytes| async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        AxumStatusCode::SERVICE_UNAVAILABLE
                    },
                ),
            )
            .with_state(counter.clone());

        let (base_url, handle) = serve_router(router).await;
        let client = Client::new(&base_url)
            .unwrap()
            .with_retry_policy(RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::ZERO,
                max_backoff: Duration::ZERO,
                retry_non_idempotent: false,
            });

        let err = client
            .record_game_event("load_started", "flamy-dash", Map::new())
            .await
            .expect_err("POST should not be retried by default");
        let Error::Failed(status) = err else {
            panic!("expected Failed, got {err:?}");
        };
        assert_eq!(status, reqwest::StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        handle.abort();
    }
}
