//! Config used when the API cannot answer, so the page can still mount a game.

use flamydash_types::{
    api::{AdsInfo, AzGameResponse, GameInfo, RegisInfo},
    Catalog, GameRecord, PageContext, RequestParams,
};

const DEFAULT_NAME: &str = "Flamy Dash";
const DEFAULT_DESCRIPTION: &str = "Master the flames of precision";
const DEFAULT_VERSION: &str = "1.0.0";
const DEFAULT_WIDTH: u32 = 960;
const DEFAULT_HEIGHT: u32 = 600;
const DEFAULT_UNLOCK_TIMER: u32 = 15;

struct FallbackGame {
    name: String,
    description: String,
    image: String,
    iframe_url: String,
    width: u32,
    height: u32,
    enable_fullscreen: String,
    enable_sound: String,
}

impl FallbackGame {
    fn builtin(domain: &str) -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            description: DEFAULT_DESCRIPTION.to_string(),
            image: format!("https://{domain}/flamy-dash.png"),
            iframe_url: format!("https://{domain}/games/flamy-dash/latest/"),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            enable_fullscreen: "yes".to_string(),
            enable_sound: "yes".to_string(),
        }
    }

    fn from_record(game: &GameRecord, domain: &str) -> Self {
        Self {
            name: game.name.clone(),
            description: game.description.clone(),
            image: game.image.clone(),
            iframe_url: game
                .iframe_url
                .clone()
                .unwrap_or_else(|| format!("https://{domain}/games/{}/latest/", game.id)),
            width: game.width,
            height: game.height,
            enable_fullscreen: game.enable_fullscreen.clone(),
            enable_sound: game.enable_sound.clone(),
        }
    }
}

/// A complete [AzGameResponse] built without the API, flagged `static_mode`.
///
/// Uses the catalog entry for `game_id` when there is one, otherwise the
/// built-in Flamy Dash defaults served from `domain`.
pub fn fallback_config(catalog: Option<&Catalog>, game_id: &str, domain: &str) -> AzGameResponse {
    let game = catalog
        .and_then(|catalog| catalog.get(game_id))
        .map(|game| FallbackGame::from_record(game, domain))
        .unwrap_or_else(|| FallbackGame::builtin(domain));

    AzGameResponse {
        adsinfo: AdsInfo {
            enable: "no".to_string(),
            ads_debug: "yes".to_string(),
            ads_code: String::new(),
            time_show_inter: 60,
            time_show_reward: 60,
            sdk_type: "iframe".to_string(),
        },
        regisinfo: RegisInfo {
            allow_play: "yes".to_string(),
            unlock_timer: DEFAULT_UNLOCK_TIMER,
            name: game.name,
            description: game.description,
            image: game.image,
            rtype: "1".to_string(),
            redirect_url: format!("https://{domain}/"),
            signed: None,
            rating: None,
            category: None,
            tags: None,
        },
        gameinfo: GameInfo {
            iframe_url: Some(game.iframe_url),
            width: Some(game.width),
            height: Some(game.height),
            version: Some(DEFAULT_VERSION.to_string()),
            enable_fullscreen: Some(game.enable_fullscreen),
            enable_sound: Some(game.enable_sound),
            ..Default::default()
        },
        static_mode: Some(true),
    }
}

/// Request parameters for a page running without the API.
pub fn static_params(page: &PageContext, game_id: &str, ts: i64) -> RequestParams {
    RequestParams::for_page(page, game_id, ts).with("static", "true")
}
