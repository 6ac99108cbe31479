pub mod client;
pub mod driver;
pub mod fallback;
pub mod recorder;
pub mod session;

pub use client::Client;
pub use client::RetryPolicy;
pub use driver::{SessionHandle, SessionHost};
pub use recorder::{EventRecorder, HttpRecorder, LocalRecorder};
pub use session::{Effect, GameSession, Input, LaunchPolicy, LoadState, Overlay};
use flamydash_types::{EncodeError, ErrorCode};
use thiserror::Error;

/// Error type for client operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("failed: {0}")]
    Failed(reqwest::StatusCode),
    #[error("failed: {status}: {body}")]
    FailedWithBody {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("{code}: {error} ({status})")]
    Api {
        status: reqwest::StatusCode,
        code: ErrorCode,
        error: String,
    },
    #[error("encoding failed: {0}")]
    Encode(#[from] EncodeError),
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),
    #[error("invalid URL scheme: {0} (expected http or https)")]
    InvalidScheme(String),
}

impl Error {
    /// Machine-readable code reported by the server, if any.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Error::Api { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;
