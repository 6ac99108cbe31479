use flamydash_types::{
    api::{AdsInfo, AzGameResponse, EmbedInfo, GameInfo, RegisInfo, UnityConfig},
    catalog::{Catalog, GameRecord},
    codec::{self, DecodeError, EncodeError, RequestParams},
    ErrorCode, DEFAULT_GAME_ID,
};
use serde::Serialize;
use serde_json::Value;
use std::borrow::Cow;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Stand-in for a real signature. Tokens carrying it authenticate nothing.
pub const SIGNATURE_PLACEHOLDER: &str = "base64_encoded_signature_placeholder";

const DEFAULT_SIGNED_HOST: &str = "game.azgame.io";
const DEFAULT_SIGNED_DOMAIN: &str = "flamydash.com";
const COMPANY_NAME: &str = "Flamy Dash Team";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required parameters")]
    MissingParams,
    #[error("Invalid parameter format")]
    InvalidFormat(#[source] DecodeError),
    #[error("Invalid parameters")]
    InvalidParams,
    #[error("Request expired")]
    Expired,
    #[error("Game not found")]
    GameNotFound(String),
    #[error("failed to sign response: {0}")]
    Signing(#[from] EncodeError),
}

impl ConfigError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ConfigError::MissingParams => ErrorCode::MissingParams,
            ConfigError::InvalidFormat(_) | ConfigError::InvalidParams => ErrorCode::InvalidParams,
            ConfigError::Expired => ErrorCode::ExpiredRequest,
            ConfigError::GameNotFound(_) => ErrorCode::GameNotFound,
            ConfigError::Signing(_) => ErrorCode::InternalError,
        }
    }
}

/// Shape of the placeholder `regisinfo.signed` token.
#[derive(Debug, Serialize)]
struct SignedToken<'a> {
    signed: &'static str,
    ap: &'static str,
    hn: &'a str,
    domain: &'a str,
    s: &'static str,
    stype: u8,
}

/// Build the `signed` token for a request.
///
/// This is not a signature: it re-encodes the caller's host and domain next to
/// [SIGNATURE_PLACEHOLDER] so SDK clients that expect the field keep working.
pub fn generate_signed_token(params: &RequestParams) -> Result<String, EncodeError> {
    let token = SignedToken {
        signed: SIGNATURE_PLACEHOLDER,
        ap: "yes",
        hn: non_empty(params.hostname()).unwrap_or(DEFAULT_SIGNED_HOST),
        domain: non_empty(params.domain()).unwrap_or(DEFAULT_SIGNED_DOMAIN),
        s: "yes",
        stype: 2,
    };
    codec::encode(&token)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.is_empty())
}

/// Game named by `gid`; falsy values (`""`, `0`, `false`, `null`) select [DEFAULT_GAME_ID].
fn requested_game_id(params: &RequestParams) -> Cow<'_, str> {
    match params.get("gid") {
        None | Some(Value::Null) | Some(Value::Bool(false)) => Cow::Borrowed(DEFAULT_GAME_ID),
        Some(Value::String(id)) if id.is_empty() => Cow::Borrowed(DEFAULT_GAME_ID),
        Some(Value::String(id)) => Cow::Borrowed(id.as_str()),
        Some(Value::Number(id)) if id.as_f64() == Some(0.0) => Cow::Borrowed(DEFAULT_GAME_ID),
        Some(other) => Cow::Owned(other.to_string()),
    }
}

/// Answers `gmadsv1` requests from the catalog.
#[derive(Clone, Debug)]
pub struct GameConfigResponder {
    catalog: Arc<Catalog>,
    public_origin: String,
}

impl GameConfigResponder {
    pub fn new(catalog: Arc<Catalog>, public_origin: &str) -> Self {
        Self {
            catalog,
            public_origin: public_origin.trim_end_matches('/').to_string(),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn get_config(
        &self,
        token: Option<&str>,
        max_age_secs: u64,
    ) -> Result<AzGameResponse, ConfigError> {
        self.get_config_at(token, max_age_secs, codec::now_secs())
    }

    /// Decode, validate and answer a token against the clock value `now`.
    pub fn get_config_at(
        &self,
        token: Option<&str>,
        max_age_secs: u64,
        now: i64,
    ) -> Result<AzGameResponse, ConfigError> {
        let token = token
            .filter(|token| !token.is_empty())
            .ok_or(ConfigError::MissingParams)?;
        let params = codec::decode(token).map_err(ConfigError::InvalidFormat)?;
        if !codec::validate_required(&params) {
            return Err(ConfigError::InvalidParams);
        }
        let fresh = params
            .timestamp()
            .is_some_and(|ts| codec::validate_timestamp_at(ts, max_age_secs, now));
        if !fresh {
            return Err(ConfigError::Expired);
        }

        let game_id = requested_game_id(&params);
        let game = self
            .catalog
            .get(&game_id)
            .ok_or_else(|| ConfigError::GameNotFound(game_id.to_string()))?;
        let signed = generate_signed_token(&params)?;

        info!(
            game_id = %game.id,
            domain = params.domain().unwrap_or("unknown"),
            "game config requested"
        );
        Ok(self.assemble(game, signed))
    }

    fn assemble(&self, game: &GameRecord, signed: String) -> AzGameResponse {
        let defaults = &self.catalog.default_settings;
        AzGameResponse {
            adsinfo: AdsInfo::from(&self.catalog.ads_config),
            regisinfo: RegisInfo {
                allow_play: defaults.allow_play.clone(),
                unlock_timer: game.unlock_timer,
                name: game.name.clone(),
                description: game.description.clone(),
                image: game.image.clone(),
                rtype: defaults.rtype.clone(),
                redirect_url: game.redirect_url.clone(),
                signed: Some(signed),
                rating: Some(game.rating.clone()),
                category: Some(game.category.clone()),
                tags: Some(game.tags.clone()),
            },
            gameinfo: self.game_info(game),
            static_mode: None,
        }
    }

    /// Mount parameters and Build asset URLs for `game`.
    pub fn game_info(&self, game: &GameRecord) -> GameInfo {
        let release = format!("{}/games/{}/{}/", self.public_origin, game.id, game.version);
        let build = format!("{release}Build/{}-v{}", game.id, game.version);
        let loader_url = format!("{build}.loader.js");
        let framework_url = format!("{build}.framework.js.unityweb");
        let wasm_url = format!("{build}.wasm.unityweb");
        let data_url = format!("{build}.data.unityweb");

        GameInfo {
            iframe_url: Some(self.embed_url(game)),
            width: Some(game.width),
            height: Some(game.height),
            version: Some(game.version.clone()),
            enable_fullscreen: Some(game.enable_fullscreen.clone()),
            enable_sound: Some(game.enable_sound.clone()),
            controls: game.controls.clone(),
            iframe_sandbox: self.catalog.default_settings.iframe_sandbox.clone(),
            game_url: Some(release),
            unity_config: Some(UnityConfig {
                data_url: data_url.clone(),
                framework_url: framework_url.clone(),
                code_url: wasm_url.clone(),
                loader_url: loader_url.clone(),
                company_name: COMPANY_NAME.to_string(),
                product_name: game.name.clone(),
                product_version: game.version.clone(),
            }),
            loader_url: Some(loader_url),
            framework_url: Some(framework_url),
            wasm_url: Some(wasm_url),
            data_url: Some(data_url),
            moregames_url: Some(game.moregames_url.clone()),
            enable_moregame: Some(game.enable_moregame.clone()),
            promotion: Some(game.promotion.clone()),
            redirect_url: Some(game.redirect_url.clone()),
        }
    }

    /// The game's own embed URL, or the portal's `latest` page for it.
    pub fn embed_url(&self, game: &GameRecord) -> String {
        game.iframe_url
            .clone()
            .unwrap_or_else(|| format!("{}/games/{}/latest/", self.public_origin, game.id))
    }

    pub fn embed_info(&self, game_id: &str) -> Option<EmbedInfo> {
        let game = self.catalog.get(game_id)?;
        Some(EmbedInfo {
            game_id: game.id.clone(),
            embed_url: self.embed_url(game),
            width: game.width,
            height: game.height,
            instructions: "Use this data to create iframe embed".to_string(),
        })
    }
}
