use axum::{
    body::Bytes,
    extract::{ConnectInfo, Path, Query, State as AxumState},
    http::{HeaderMap, Uri},
    response::Html,
    Json,
};
use flamydash_types::api::{
    AnalyticsAck, AnalyticsEvent, AzGameResponse, EmbedInfo, GamesList, HealthResponse,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;

use super::ApiError;
use crate::analytics::{self, IntakeError, RequestMeta};
use crate::responder::ConfigError;
use crate::Server;

#[derive(Debug, Deserialize)]
pub(super) struct ConfigQuery {
    params: Option<String>,
}

/// AzGame-compatible `gmadsv1` endpoint.
pub(super) async fn game_config(
    AxumState(server): AxumState<Arc<Server>>,
    Query(query): Query<ConfigQuery>,
) -> Result<Json<AzGameResponse>, ApiError> {
    let response = server
        .responder()
        .get_config(query.params.as_deref(), server.config.max_request_age_secs())?;
    Ok(Json(response))
}

/// Accepts any body; anything that is not an event object is missing its fields.
pub(super) async fn record_event(
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    body: Bytes,
) -> Result<Json<AnalyticsAck>, ApiError> {
    let event: AnalyticsEvent =
        serde_json::from_slice(&body).map_err(|_| IntakeError::MissingFields)?;
    let meta = RequestMeta::from_headers(&headers, peer.map(|ConnectInfo(addr)| addr));
    Ok(Json(analytics::record_event(event, meta)?))
}

pub(super) async fn games(AxumState(server): AxumState<Arc<Server>>) -> Json<GamesList> {
    Json(server.games_list())
}

pub(super) async fn game_embed(
    AxumState(server): AxumState<Arc<Server>>,
    Path(game_id): Path<String>,
) -> Result<Json<EmbedInfo>, ApiError> {
    server
        .embed_info(&game_id)
        .map(Json)
        .ok_or_else(|| ConfigError::GameNotFound(game_id).into())
}

pub(super) async fn health(AxumState(server): AxumState<Arc<Server>>) -> Json<HealthResponse> {
    Json(server.health())
}

/// Serves `<games_dir>/<game_id>/latest/index.html`.
pub(super) async fn game_page(
    AxumState(server): AxumState<Arc<Server>>,
    Path(game_id): Path<String>,
) -> Result<Html<String>, ApiError> {
    let Some(path) = server.game_page_path(&game_id) else {
        return Err(ApiError::GameNotFound { game_id });
    };
    match tokio::fs::read_to_string(&path).await {
        Ok(page) => Ok(Html(page)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            Err(ApiError::GameNotFound { game_id })
        }
        Err(err) => Err(ApiError::Internal {
            detail: format!("failed to read {}: {err}", path.display()),
            expose: server.config.is_development(),
        }),
    }
}

pub(super) async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound {
        path: uri.path().to_string(),
    }
}
