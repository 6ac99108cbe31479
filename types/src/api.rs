//! JSON bodies exchanged over the portal HTTP API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::catalog::{AdsConfig, GameRecord, Promotion};

/// Value reported as `api_version` by listing and health endpoints.
pub const API_VERSION: &str = "azgame-compatible";

/// Response of `GET /api/sdk/gmadsv1`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AzGameResponse {
    pub adsinfo: AdsInfo,
    pub regisinfo: RegisInfo,
    pub gameinfo: GameInfo,
    /// Set by clients answering from bundled data instead of the API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_mode: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdsInfo {
    pub enable: String,
    pub ads_debug: String,
    #[serde(default)]
    pub ads_code: String,
    pub time_show_inter: u32,
    pub time_show_reward: u32,
    pub sdk_type: String,
}

impl From<&AdsConfig> for AdsInfo {
    fn from(config: &AdsConfig) -> Self {
        Self {
            enable: config.enable.clone(),
            ads_debug: config.ads_debug.clone(),
            ads_code: config.ads_code.clone(),
            time_show_inter: config.time_show_inter,
            time_show_reward: config.time_show_reward,
            sdk_type: config.sdk_type.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegisInfo {
    pub allow_play: String,
    pub unlock_timer: u32,
    pub name: String,
    pub description: String,
    pub image: String,
    pub rtype: String,
    pub redirect_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

/// Unity WebGL loader settings, camelCase as the loader expects them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnityConfig {
    pub data_url: String,
    pub framework_url: String,
    pub code_url: String,
    pub loader_url: String,
    pub company_name: String,
    pub product_name: String,
    pub product_version: String,
}

/// Everything needed to mount the game.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GameInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iframe_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_fullscreen: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_sound: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controls: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iframe_sandbox: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loader_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wasm_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unity_config: Option<UnityConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moregames_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_moregame: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promotion: Option<Promotion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
}

impl GameInfo {
    /// URL to load in the iframe, preferring the explicit mount URL.
    pub fn mount_url(&self) -> Option<&str> {
        self.iframe_url.as_deref().or(self.game_url.as_deref())
    }
}

/// Machine-readable error codes returned next to a human `error` string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    MissingParams,
    InvalidParams,
    ExpiredRequest,
    GameNotFound,
    MissingFields,
    RecordingError,
    InternalError,
    ServerError,
    NotFound,
    RateLimitExceeded,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::MissingParams => "MISSING_PARAMS",
            ErrorCode::InvalidParams => "INVALID_PARAMS",
            ErrorCode::ExpiredRequest => "EXPIRED_REQUEST",
            ErrorCode::GameNotFound => "GAME_NOT_FOUND",
            ErrorCode::MissingFields => "MISSING_FIELDS",
            ErrorCode::RecordingError => "RECORDING_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::ServerError => "SERVER_ERROR",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of every non-2xx JSON response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: ErrorCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(rename = "gameId", default, skip_serializing_if = "Option::is_none")]
    pub game_id: Option<String>,
}

impl ErrorBody {
    pub fn new(code: ErrorCode, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code,
            message: None,
            path: None,
            game_id: None,
        }
    }
}

/// Body of `POST /api/analytics/events`.
///
/// Fields are optional so a missing one reports `MISSING_FIELDS` rather than a
/// deserialization failure.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
}

impl AnalyticsEvent {
    pub fn new(event_type: &str, game_id: &str, data: Map<String, Value>) -> Self {
        Self {
            event_type: Some(event_type.to_string()),
            game_id: Some(game_id.to_string()),
            data: Some(data),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsAck {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
}

/// Entry of `GET /api/games`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub image: String,
    pub category: String,
    pub tags: Vec<String>,
    pub rating: String,
    pub version: String,
    pub unlock_timer: u32,
    pub redirect_url: String,
}

impl From<&GameRecord> for GameSummary {
    fn from(game: &GameRecord) -> Self {
        Self {
            id: game.id.clone(),
            name: game.name.clone(),
            description: game.description.clone(),
            image: game.image.clone(),
            category: game.category.clone(),
            tags: game.tags.clone(),
            rating: game.rating.clone(),
            version: game.version.clone(),
            unlock_timer: game.unlock_timer,
            redirect_url: game.redirect_url.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GamesList {
    pub games: Vec<GameSummary>,
    pub total: usize,
    pub timestamp: String,
    pub api_version: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub version: String,
    pub api_version: String,
    pub games_available: usize,
    pub endpoints: Vec<String>,
}

/// Body of `GET /api/games/:gameId/embed`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmbedInfo {
    pub game_id: String,
    pub embed_url: String,
    pub width: u32,
    pub height: u32,
    pub instructions: String,
}
