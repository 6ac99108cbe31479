use chrono::{SecondsFormat, Utc};
use flamydash_types::{
    api::{EmbedInfo, GameSummary, GamesList, HealthResponse, API_VERSION},
    Catalog,
};
use std::path::PathBuf;
use std::sync::Arc;

mod api;
pub use api::{Api, ApiError};

pub mod analytics;
mod config;
pub use config::{Environment, ServerConfig, DEFAULT_GAMES_DIR};
pub mod responder;
pub use responder::{ConfigError, GameConfigResponder};

/// Version reported by the health endpoint.
pub const SERVER_VERSION: &str = "1.0.0";

/// Endpoints advertised by the health endpoint.
pub const ENDPOINTS: [&str; 5] = [
    "/api/sdk/gmadsv1",
    "/api/analytics/events",
    "/api/health",
    "/api/games",
    "/api/games/:gameId/embed",
];

/// Shared state behind every request. Read-only once built.
pub struct Server {
    pub config: ServerConfig,
    responder: GameConfigResponder,
}

impl Server {
    pub fn new(catalog: Catalog) -> Self {
        Self::new_with_config(catalog, ServerConfig::default())
    }

    pub fn new_with_config(catalog: Catalog, config: ServerConfig) -> Self {
        let responder = GameConfigResponder::new(Arc::new(catalog), &config.public_origin);
        Self { config, responder }
    }

    pub fn catalog(&self) -> &Catalog {
        self.responder.catalog()
    }

    pub fn responder(&self) -> &GameConfigResponder {
        &self.responder
    }

    pub fn games_list(&self) -> GamesList {
        let games = self
            .catalog()
            .games
            .values()
            .map(GameSummary::from)
            .collect::<Vec<_>>();
        GamesList {
            total: games.len(),
            games,
            timestamp: now_iso(),
            api_version: API_VERSION.to_string(),
        }
    }

    pub fn health(&self) -> HealthResponse {
        HealthResponse {
            status: "healthy".to_string(),
            timestamp: now_iso(),
            version: SERVER_VERSION.to_string(),
            api_version: API_VERSION.to_string(),
            games_available: self.catalog().len(),
            endpoints: ENDPOINTS.iter().map(|endpoint| endpoint.to_string()).collect(),
        }
    }

    pub fn embed_info(&self, game_id: &str) -> Option<EmbedInfo> {
        self.responder.embed_info(game_id)
    }

    /// Location of a game's `latest/index.html`, if `game_id` is a plain name.
    pub fn game_page_path(&self, game_id: &str) -> Option<PathBuf> {
        let games_dir = self.config.games_dir.as_ref()?;
        let plain = !game_id.is_empty()
            && game_id != "."
            && game_id != ".."
            && !game_id.contains(['/', '\\']);
        plain.then(|| games_dir.join(game_id).join("latest").join("index.html"))
    }
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
