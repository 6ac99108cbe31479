use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Request},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use flamydash_types::{ErrorBody, ErrorCode};
use governor::middleware::NoOpMiddleware;
use std::any::Any;
use std::sync::Arc;
use std::time::Instant;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::Server;

mod error;
mod http;

pub use error::ApiError;

const REQUEST_ID: &str = "x-request-id";

pub struct Api {
    server: Arc<Server>,
}

type IpGovernorConfig =
    tower_governor::governor::GovernorConfig<SmartIpKeyExtractor, NoOpMiddleware>;

impl Api {
    pub fn new(server: Arc<Server>) -> Self {
        Self { server }
    }

    fn governor_config(&self) -> Option<Arc<IpGovernorConfig>> {
        let (requests, window) = self.server.config.rate_limit()?;
        // One token every window/requests, with a full window's worth available up front.
        let period = (window / requests).max(std::time::Duration::from_millis(1));
        tracing::info!(
            requests,
            window_secs = window.as_secs(),
            period_ms = period.as_millis() as u64,
            "api rate limit configured"
        );
        let config = GovernorConfigBuilder::default()
            .period(period)
            .burst_size(requests)
            .key_extractor(SmartIpKeyExtractor)
            .finish();
        if config.is_none() {
            tracing::warn!("invalid rate-limit config; rate limiting disabled");
        }
        config.map(Arc::new)
    }

    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(AllowOrigin::any())
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([
                header::CONTENT_TYPE,
                header::AUTHORIZATION,
                header::HeaderName::from_static("x-requested-with"),
                header::HeaderName::from_static(REQUEST_ID),
            ])
            .expose_headers([header::HeaderName::from_static(REQUEST_ID)]);

        let api = Router::new()
            .route("/api/sdk/gmadsv1", get(http::game_config))
            .route("/api/analytics/events", post(http::record_event))
            .route("/api/games", get(http::games))
            .route("/api/games/:game_id/embed", get(http::game_embed))
            .route("/api/health", get(http::health));
        let api = match self.governor_config() {
            Some(config) => api
                .layer(GovernorLayer { config })
                .layer(middleware::from_fn(rate_limit_body)),
            None => api,
        };

        let router = Router::new()
            .route("/games/:game_id/latest/", get(http::game_page))
            .route("/games/:game_id/latest", get(http::game_page))
            .merge(api)
            .fallback(http::not_found);

        let router = router.layer(middleware::from_fn(answer_options));
        let router = router.layer(cors);
        let router = match self.server.config.http_body_limit_bytes() {
            Some(limit) => router.layer(DefaultBodyLimit::max(limit)),
            None => router,
        };
        let expose = self.server.config.is_development();
        let router = router.layer(CatchPanicLayer::custom(
            move |panic: Box<dyn Any + Send + 'static>| panic_response(panic, expose),
        ));
        let router = router.layer(middleware::from_fn(request_id_middleware));
        let router = router.layer(TraceLayer::new_for_http());

        router.with_state(self.server.clone())
    }
}

fn panic_response(panic: Box<dyn Any + Send + 'static>, expose: bool) -> Response {
    let detail = if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else {
        "handler panicked".to_string()
    };
    ApiError::Internal { detail, expose }.into_response()
}

/// Preflight and bare OPTIONS requests get an empty 200.
async fn answer_options(req: Request, next: Next) -> Response {
    if req.method() == Method::OPTIONS {
        return (StatusCode::OK, Body::empty()).into_response();
    }
    next.run(req).await
}

/// Replace the limiter's plain-text rejection with the JSON error shape.
async fn rate_limit_body(req: Request, next: Next) -> Response {
    let response = next.run(req).await;
    if response.status() != StatusCode::TOO_MANY_REQUESTS {
        return response;
    }
    let (mut parts, _) = response.into_parts();
    parts.headers.remove(header::CONTENT_TYPE);
    parts.headers.remove(header::CONTENT_LENGTH);
    let body = Json(ErrorBody::new(ErrorCode::RateLimitExceeded, "Too many requests"));
    (parts, body).into_response()
}

async fn request_id_middleware(req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(REQUEST_ID)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();
    let mut response = next.run(req).await;
    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .insert(header::HeaderName::from_static(REQUEST_ID), header_value);
    }
    tracing::info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "http.request"
    );
    response
}
