//! postMessage protocol between the hosting page and the embedded game.
//!
//! The game posts `{type, event?, data?}` envelopes (as JSON text or as a
//! structured value). The page answers with [ParentMessage]s.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::api::GameInfo;

pub const GAME_EVENT: &str = "GAME_EVENT";
pub const GAME_STATUS: &str = "GAME_STATUS";
pub const GAME_ERROR: &str = "GAME_ERROR";

/// A message exactly as delivered by `window.postMessage`.
#[derive(Clone, Debug, PartialEq)]
pub enum RawMessage {
    Text(String),
    Object(Value),
}

impl From<Value> for RawMessage {
    fn from(value: Value) -> Self {
        RawMessage::Object(value)
    }
}

impl From<&str> for RawMessage {
    fn from(text: &str) -> Self {
        RawMessage::Text(text.to_string())
    }
}

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("message is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Named events carried by `GAME_EVENT`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GameEvent {
    Loaded,
    Started,
    Paused,
    Resumed,
    Ended,
    Score,
    Other(String),
}

impl GameEvent {
    pub fn from_name(name: &str) -> Self {
        match name {
            "loaded" => GameEvent::Loaded,
            "started" => GameEvent::Started,
            "paused" => GameEvent::Paused,
            "resumed" => GameEvent::Resumed,
            "ended" => GameEvent::Ended,
            "score" => GameEvent::Score,
            other => GameEvent::Other(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            GameEvent::Loaded => "loaded",
            GameEvent::Started => "started",
            GameEvent::Paused => "paused",
            GameEvent::Resumed => "resumed",
            GameEvent::Ended => "ended",
            GameEvent::Score => "score",
            GameEvent::Other(name) => name,
        }
    }

    /// Analytics event recorded when the game reports this event.
    pub fn analytics_name(&self) -> Option<&'static str> {
        match self {
            GameEvent::Started => Some("game_started"),
            GameEvent::Paused => Some("game_paused"),
            GameEvent::Resumed => Some("game_resumed"),
            GameEvent::Ended => Some("game_ended"),
            GameEvent::Score => Some("score_achieved"),
            GameEvent::Loaded | GameEvent::Other(_) => None,
        }
    }

    /// Whether the game's payload is forwarded with the analytics event.
    pub fn forwards_data(&self) -> bool {
        matches!(self, GameEvent::Ended | GameEvent::Score)
    }
}

/// A message posted by the game to the page.
#[derive(Clone, Debug, PartialEq)]
pub enum GameMessage {
    Event {
        event: GameEvent,
        data: Option<Value>,
    },
    Status {
        loading_progress: Option<f64>,
        data: Option<Value>,
    },
    Error {
        message: Option<String>,
        data: Option<Value>,
    },
    /// Anything with an unrecognized or missing `type`.
    Unknown { kind: Option<String> },
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type", default)]
    kind: Option<Value>,
    #[serde(default)]
    event: Option<Value>,
    #[serde(default)]
    data: Option<Value>,
}

impl GameMessage {
    pub fn parse(raw: &RawMessage) -> Result<Self, MessageError> {
        match raw {
            RawMessage::Text(text) => Ok(Self::from_value(serde_json::from_str(text)?)),
            RawMessage::Object(value) => Ok(Self::from_value(value.clone())),
        }
    }

    pub fn from_value(value: Value) -> Self {
        let Ok(envelope) = serde_json::from_value::<Envelope>(value) else {
            return GameMessage::Unknown { kind: None };
        };
        let Some(Value::String(kind)) = envelope.kind else {
            return GameMessage::Unknown { kind: None };
        };
        let data = envelope.data.filter(|data| !data.is_null());
        match kind.as_str() {
            GAME_EVENT => {
                let name = match &envelope.event {
                    Some(Value::String(name)) => name.as_str(),
                    _ => "",
                };
                GameMessage::Event {
                    event: GameEvent::from_name(name),
                    data,
                }
            }
            GAME_STATUS => GameMessage::Status {
                loading_progress: data
                    .as_ref()
                    .and_then(|data| data.get("loading_progress"))
                    .and_then(progress_value),
                data,
            },
            GAME_ERROR => GameMessage::Error {
                message: data
                    .as_ref()
                    .and_then(|data| data.get("message"))
                    .and_then(Value::as_str)
                    .filter(|message| !message.is_empty())
                    .map(str::to_string),
                data,
            },
            _ => GameMessage::Unknown { kind: Some(kind) },
        }
    }
}

fn progress_value(value: &Value) -> Option<f64> {
    let progress = match value {
        Value::Number(number) => number.as_f64()?,
        Value::String(raw) => raw.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    progress.is_finite().then_some(progress)
}

/// Mount settings handed to the game once its frame has loaded.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ParentConfig {
    pub game_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_sound: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_fullscreen: Option<String>,
}

impl ParentConfig {
    pub fn new(game_id: &str, info: &GameInfo) -> Self {
        Self {
            game_id: game_id.to_string(),
            version: info.version.clone(),
            width: info.width,
            height: info.height,
            enable_sound: info.enable_sound.clone(),
            enable_fullscreen: info.enable_fullscreen.clone(),
        }
    }
}

/// A message posted by the page to the game.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParentMessage {
    ParentReady { config: ParentConfig },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_text_and_objects_alike() {
        let value = json!({ "type": "GAME_EVENT", "event": "loaded" });
        let text = RawMessage::Text(value.to_string());
        let object = RawMessage::Object(value);
        let expected = GameMessage::Event {
            event: GameEvent::Loaded,
            data: None,
        };
        assert_eq!(GameMessage::parse(&text).unwrap(), expected);
        assert_eq!(GameMessage::parse(&object).unwrap(), expected);
    }

    #[test]
    fn invalid_json_text_is_an_error() {
        assert!(GameMessage::parse(&RawMessage::from("{not json")).is_err());
    }

    #[test]
    fn unknown_and_untyped_messages() {
        assert_eq!(
            GameMessage::from_value(json!({ "type": "AD_REQUEST" })),
            GameMessage::Unknown {
                kind: Some("AD_REQUEST".to_string())
            }
        );
        assert_eq!(
            GameMessage::from_value(json!({ "event": "loaded" })),
            GameMessage::Unknown { kind: None }
        );
        assert_eq!(
            GameMessage::from_value(json!(42)),
            GameMessage::Unknown { kind: None }
        );
        assert_eq!(
            GameMessage::from_value(json!({ "type": 7 })),
            GameMessage::Unknown { kind: None }
        );
    }

    #[test]
    fn status_progress() {
        let status = |data: Value| {
            match GameMessage::from_value(json!({ "type": "GAME_STATUS", "data": data })) {
                GameMessage::Status {
                    loading_progress, ..
                } => loading_progress,
                other => panic!("unexpected message {other:?}"),
            }
        };
        assert_eq!(status(json!({ "loading_progress": 42.5 })), Some(42.5));
        assert_eq!(status(json!({ "loading_progress": "60" })), Some(60.0));
        assert_eq!(status(json!({ "loading_progress": null })), None);
        assert_eq!(status(json!({ "fps": 60 })), None);
        assert_eq!(status(json!("busy")), None);
    }

    #[test]
    fn error_message_extraction() {
        let error = json!({ "type": "GAME_ERROR", "data": { "message": "webgl lost" } });
        assert_eq!(
            GameMessage::from_value(error),
            GameMessage::Error {
                message: Some("webgl lost".to_string()),
                data: Some(json!({ "message": "webgl lost" })),
            }
        );
        assert_eq!(
            GameMessage::from_value(json!({ "type": "GAME_ERROR" })),
            GameMessage::Error {
                message: None,
                data: None
            }
        );
    }

    #[test]
    fn event_analytics_names() {
        assert_eq!(GameEvent::from_name("score").analytics_name(), Some("score_achieved"));
        assert_eq!(GameEvent::from_name("started").analytics_name(), Some("game_started"));
        assert_eq!(GameEvent::from_name("loaded").analytics_name(), None);
        assert_eq!(GameEvent::from_name("jump").analytics_name(), None);
        assert_eq!(GameEvent::from_name("jump").name(), "jump");
        assert!(GameEvent::Ended.forwards_data());
        assert!(!GameEvent::Paused.forwards_data());
    }

    #[test]
    fn parent_ready_shape() {
        let message = ParentMessage::ParentReady {
            config: ParentConfig {
                game_id: "flamy-dash".to_string(),
                width: Some(960),
                ..Default::default()
            },
        };
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({ "type": "PARENT_READY", "config": { "game_id": "flamy-dash", "width": 960 } })
        );
    }
}
