//! Common types used throughout the Flamy Dash portal.

pub mod api;
pub use api::{AzGameResponse, ErrorBody, ErrorCode};
pub mod catalog;
pub use catalog::{Catalog, CatalogError, GameRecord};
pub mod codec;
pub use codec::{DecodeError, EncodeError, PageContext, RequestParams};
pub mod message;
pub use message::{GameEvent, GameMessage, ParentMessage, RawMessage};

/// Game served when a request does not name one.
pub const DEFAULT_GAME_ID: &str = "flamy-dash";

/// Public origin the game assets are served from.
pub const DEFAULT_PUBLIC_ORIGIN: &str = "https://flamydash.com";
