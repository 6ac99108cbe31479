//! Static game catalog.
//!
//! The catalog is read once at startup (`games.json` layout: `games`,
//! `ads_config`, `default_settings`) and never mutated afterwards.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Catalog bundled with the crate.
pub const BUNDLED_CATALOG: &str = include_str!("../assets/games.json");

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("game {key} declares mismatched id {id}")]
    MismatchedId { key: String, id: String },
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Promotion {
    pub enable: String,
    pub call_to_action: String,
    #[serde(default)]
    pub promotion_list: Vec<Value>,
}

/// One playable game.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub image: String,
    pub version: String,
    pub redirect_url: String,
    pub moregames_url: String,
    pub enable_moregame: String,
    pub unlock_timer: u32,
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub rating: String,
    #[serde(default)]
    pub promotion: Promotion,

    // Iframe mount settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iframe_url: Option<String>,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_yes")]
    pub enable_fullscreen: String,
    #[serde(default = "default_yes")]
    pub enable_sound: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controls: Option<Value>,
}

fn default_width() -> u32 {
    960
}

fn default_height() -> u32 {
    600
}

fn default_yes() -> String {
    "yes".to_string()
}

/// Ad display policy shared by every game.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdsConfig {
    pub enable: String,
    pub ads_debug: String,
    #[serde(default)]
    pub ads_code: String,
    pub time_show_inter: u32,
    pub time_show_reward: u32,
    pub sdk_type: String,
}

impl Default for AdsConfig {
    fn default() -> Self {
        Self {
            enable: "no".to_string(),
            ads_debug: "yes".to_string(),
            ads_code: String::new(),
            time_show_inter: 60,
            time_show_reward: 60,
            sdk_type: "gm".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DefaultSettings {
    pub allow_play: String,
    pub rtype: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iframe_sandbox: Option<String>,
}

impl Default for DefaultSettings {
    fn default() -> Self {
        Self {
            allow_play: "yes".to_string(),
            rtype: "1".to_string(),
            iframe_sandbox: None,
        }
    }
}

/// Immutable set of [GameRecord]s keyed by id, plus the global settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub games: BTreeMap<String, GameRecord>,
    #[serde(default)]
    pub ads_config: AdsConfig,
    #[serde(default)]
    pub default_settings: DefaultSettings,
}

impl Catalog {
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let catalog: Self = serde_json::from_str(json)?;
        if let Some((key, game)) = catalog.games.iter().find(|(key, game)| **key != game.id) {
            return Err(CatalogError::MismatchedId {
                key: key.clone(),
                id: game.id.clone(),
            });
        }
        Ok(catalog)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// The catalog shipped in [BUNDLED_CATALOG].
    pub fn bundled() -> Result<Self, CatalogError> {
        Self::from_json(BUNDLED_CATALOG)
    }

    pub fn get(&self, id: &str) -> Option<&GameRecord> {
        self.games.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.games.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_GAME_ID;

    #[test]
    fn bundled_catalog_parses() {
        let catalog = Catalog::bundled().unwrap();
        let game = catalog.get(DEFAULT_GAME_ID).unwrap();
        assert_eq!(game.name, "Flamy Dash");
        assert_eq!(game.unlock_timer, 15);
        assert_eq!(
            game.tags,
            vec!["one-button", "precision", "grappling-hook", "endless"]
        );
        assert_eq!(catalog.ads_config.sdk_type, "gm");
        assert_eq!(catalog.default_settings.rtype, "1");
        assert_eq!(catalog.ids().collect::<Vec<_>>(), vec![DEFAULT_GAME_ID]);
    }

    #[test]
    fn optional_fields_take_defaults() {
        let catalog = Catalog::from_json(
            r#"{
                "games": {
                    "tiny": {
                        "id": "tiny", "name": "Tiny", "image": "i.png", "version": "1",
                        "redirect_url": "r", "moregames_url": "m", "enable_moregame": "no",
                        "unlock_timer": 0, "category": "puzzle", "rating": "3.0"
                    }
                }
            }"#,
        )
        .unwrap();
        let game = catalog.get("tiny").unwrap();
        assert_eq!(game.width, 960);
        assert_eq!(game.height, 600);
        assert_eq!(game.enable_sound, "yes");
        assert!(game.iframe_url.is_none());
        assert!(game.tags.is_empty());
        assert_eq!(catalog.ads_config, AdsConfig::default());
    }

    #[test]
    fn rejects_mismatched_ids() {
        let json = BUNDLED_CATALOG.replacen("\"id\": \"flamy-dash\"", "\"id\": \"other\"", 1);
        assert!(matches!(
            Catalog::from_json(&json),
            Err(CatalogError::MismatchedId { .. })
        ));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Catalog::load("/definitely/not/here/games.json").unwrap_err();
        assert!(matches!(err, CatalogError::Io { .. }));
    }
}
