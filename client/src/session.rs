//! Loading state machine for an embedded game.
//!
//! [GameSession::handle] is a pure transition function: it consumes one
//! [Input] and returns the [Effect]s the caller must carry out (mount the
//! frame, start timers, record analytics). Inputs are processed strictly in
//! arrival order.
//!
//! ```text
//! Idle --play--> Loading --loaded--> Loaded
//!                   |  ^
//!     error/timeout |  | retry
//!                   v  |
//!                  Error
//! ```

use flamydash_types::{
    api::AzGameResponse,
    message::{GameMessage, ParentConfig, ParentMessage, RawMessage},
    GameEvent,
};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Time allowed between entering Loading and the game reporting it is ready.
pub const LOAD_TIMEOUT: Duration = Duration::from_secs(30);
/// Delay between the frame's `onload` and treating the game as loaded.
pub const COMPLETION_CHECK_DELAY: Duration = Duration::from_millis(800);
/// Interval between simulated progress steps.
pub const PROGRESS_TICK: Duration = Duration::from_millis(500);
/// Largest simulated progress step, in percent.
pub const MAX_PROGRESS_STEP: f64 = 15.0;
/// Simulated progress never passes this value.
pub const SIMULATED_PROGRESS_CAP: f64 = 90.0;

const FRAME_ALLOW: &str = "autoplay; fullscreen; gamepad; microphone; camera";
const TIMEOUT_MESSAGE: &str =
    "Game loading is taking longer than expected. Please check your connection and try again.";
const GAME_ERROR_MESSAGE: &str = "Game encountered an error";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LaunchPolicy {
    /// Mount the game in an iframe inside the container.
    #[default]
    Embed,
    /// Open the game URL in a new tab.
    Redirect,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Loading,
    Loaded,
    Error,
}

/// Mutually exclusive UI layer over the container.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Overlay {
    Play,
    Loading,
    Error,
    None,
}

/// Identity of a browsing context, used to authenticate message sources.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WindowId(pub u64);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Key {
    Space,
    F11,
    Other(String),
}

/// Everything needed to create the game iframe.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameSpec {
    pub window: WindowId,
    pub url: String,
    pub title: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub allow: String,
    pub allow_fullscreen: bool,
    pub sandbox: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Input {
    /// Play button.
    Play,
    /// Retry button on the error overlay.
    Retry,
    /// The frame's `onload` fired.
    FrameLoaded,
    /// The frame's `onerror` fired.
    FrameFailed,
    CompletionCheck { attempt: u64 },
    LoadTimeout { attempt: u64 },
    ProgressTick { attempt: u64, increment: f64 },
    /// A `postMessage` delivered to the page.
    Message {
        source: Option<WindowId>,
        raw: RawMessage,
    },
    Key(Key),
    FullscreenChanged { active: bool },
    FullscreenFailed,
    Destroy,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    MountFrame(FrameSpec),
    RemoveFrame,
    FocusFrame,
    ShowOverlay(Overlay),
    SetProgress(f64),
    SetStatus(String),
    SetErrorText(String),
    EnableFullscreenControl,
    ToggleFullscreen,
    PostToGame(ParentMessage),
    OpenInNewTab(String),
    StartTimeout { attempt: u64, after: Duration },
    CancelTimeout,
    ScheduleCompletionCheck { attempt: u64, after: Duration },
    StartProgressTicker { attempt: u64, every: Duration },
    StopProgressTicker,
    Record {
        event_type: String,
        data: Map<String, Value>,
    },
}

impl Effect {
    fn record(event_type: &str) -> Self {
        Self::record_with(event_type, Map::new())
    }

    fn record_with(event_type: &str, data: Map<String, Value>) -> Self {
        Effect::Record {
            event_type: event_type.to_string(),
            data,
        }
    }
}

fn error_data(message: &str) -> Map<String, Value> {
    let mut data = Map::new();
    data.insert("error".to_string(), Value::from(message));
    data
}

/// Game payloads forwarded with analytics; non-objects are wrapped under `value`.
fn event_data(data: Option<Value>) -> Map<String, Value> {
    match data {
        Some(Value::Object(map)) => map,
        Some(Value::Null) | None => Map::new(),
        Some(other) => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

/// One game mounted (or waiting to be mounted) in one container.
#[derive(Clone, Debug)]
pub struct GameSession {
    container_id: String,
    game_id: String,
    title: String,
    mount_url: Option<String>,
    parent_config: ParentConfig,
    frame_template: FrameSpec,
    policy: LaunchPolicy,

    state: LoadState,
    overlay: Overlay,
    progress: f64,
    simulated_progress: f64,
    real_progress: bool,
    attempt: u64,
    frame: Option<WindowId>,
    fullscreen: bool,
}

impl GameSession {
    pub fn new(
        container_id: &str,
        game_id: &str,
        config: &AzGameResponse,
        policy: LaunchPolicy,
    ) -> Self {
        let info = &config.gameinfo;
        let title = config.regisinfo.name.clone();
        let mount_url = info.mount_url().map(str::to_string);
        Self {
            container_id: container_id.to_string(),
            game_id: game_id.to_string(),
            frame_template: FrameSpec {
                window: WindowId(0),
                url: mount_url.clone().unwrap_or_default(),
                title: format!("{title} Game"),
                width: info.width,
                height: info.height,
                allow: FRAME_ALLOW.to_string(),
                allow_fullscreen: info.enable_fullscreen.as_deref() != Some("no"),
                sandbox: info.iframe_sandbox.clone(),
            },
            title,
            mount_url,
            parent_config: ParentConfig::new(game_id, info),
            policy,
            state: LoadState::Idle,
            overlay: Overlay::Play,
            progress: 0.0,
            simulated_progress: 0.0,
            real_progress: false,
            attempt: 0,
            frame: None,
            fullscreen: false,
        }
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    pub fn policy(&self) -> LaunchPolicy {
        self.policy
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn overlay(&self) -> Overlay {
        self.overlay
    }

    pub fn is_loading(&self) -> bool {
        self.state == LoadState::Loading
    }

    pub fn is_loaded(&self) -> bool {
        self.state == LoadState::Loaded
    }

    /// Loading progress in percent.
    pub fn progress(&self) -> f64 {
        self.progress
    }

    /// Content window of the current frame, if one is mounted.
    pub fn frame(&self) -> Option<WindowId> {
        self.frame
    }

    /// Incremented on every load attempt; timers from older attempts are stale.
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    pub fn handle(&mut self, input: Input) -> Vec<Effect> {
        let mut effects = Vec::new();
        match input {
            Input::Play => match self.state {
                LoadState::Idle | LoadState::Error => self.start_loading(&mut effects),
                LoadState::Loading | LoadState::Loaded => {
                    debug!(state = ?self.state, "play ignored");
                }
            },
            Input::Retry => {
                if self.state == LoadState::Error {
                    self.start_loading(&mut effects);
                }
            }
            Input::FrameLoaded => {
                if self.state == LoadState::Loading && self.frame.is_some() {
                    info!(game_id = %self.game_id, "game frame loaded");
                    effects.push(Effect::PostToGame(ParentMessage::ParentReady {
                        config: self.parent_config.clone(),
                    }));
                    effects.push(Effect::ScheduleCompletionCheck {
                        attempt: self.attempt,
                        after: COMPLETION_CHECK_DELAY,
                    });
                }
            }
            Input::FrameFailed => {
                if self.state == LoadState::Loading {
                    let message = format!("Failed to load {} iframe", self.title);
                    let record = Effect::record_with("load_failed", error_data(&message));
                    self.fail(&message, record, &mut effects);
                }
            }
            Input::CompletionCheck { attempt } => {
                if attempt == self.attempt && self.state == LoadState::Loading {
                    self.complete(&mut effects);
                }
            }
            Input::LoadTimeout { attempt } => {
                if attempt == self.attempt && self.state == LoadState::Loading {
                    warn!(game_id = %self.game_id, "game loading timed out");
                    self.fail(TIMEOUT_MESSAGE, Effect::record("load_timeout"), &mut effects);
                }
            }
            Input::ProgressTick { attempt, increment } => {
                if attempt == self.attempt
                    && self.state == LoadState::Loading
                    && !self.real_progress
                {
                    let step = if increment.is_finite() {
                        increment.clamp(0.0, MAX_PROGRESS_STEP)
                    } else {
                        0.0
                    };
                    self.simulated_progress =
                        (self.simulated_progress + step).min(SIMULATED_PROGRESS_CAP);
                    self.set_progress(self.simulated_progress, &mut effects);
                }
            }
            Input::Message { source, raw } => self.on_message(source, raw, &mut effects),
            Input::Key(Key::Space) => {
                if matches!(self.state, LoadState::Idle | LoadState::Error) {
                    self.start_loading(&mut effects);
                }
            }
            Input::Key(Key::F11) => effects.push(Effect::ToggleFullscreen),
            Input::Key(Key::Other(_)) => {}
            Input::FullscreenChanged { active } => {
                self.fullscreen = active;
                let status = if active {
                    "Fullscreen dash mode activated!"
                } else {
                    "Exited fullscreen mode"
                };
                effects.push(Effect::SetStatus(status.to_string()));
            }
            Input::FullscreenFailed => {
                effects.push(Effect::SetStatus("Fullscreen mode failed to start".to_string()));
            }
            Input::Destroy => self.destroy(&mut effects),
        }
        effects
    }

    fn start_loading(&mut self, effects: &mut Vec<Effect>) {
        self.attempt += 1;
        self.progress = 0.0;
        self.simulated_progress = 0.0;
        self.real_progress = false;
        effects.push(Effect::record("load_started"));

        let Some(url) = self.mount_url.clone() else {
            let message = "Failed to load the game";
            let record = Effect::record_with("load_failed", error_data("missing game url"));
            self.fail(message, record, effects);
            return;
        };

        if self.policy == LaunchPolicy::Redirect {
            info!(game_id = %self.game_id, url = %url, "opening game in new tab");
            self.state = LoadState::Loaded;
            self.show_overlay(Overlay::None, effects);
            effects.push(Effect::OpenInNewTab(url));
            effects.push(Effect::SetStatus(format!("{} opened in a new tab", self.title)));
            effects.push(Effect::record("load_completed"));
            return;
        }

        info!(game_id = %self.game_id, attempt = self.attempt, "loading game");
        self.state = LoadState::Loading;
        self.show_overlay(Overlay::Loading, effects);
        effects.push(Effect::SetProgress(0.0));
        effects.push(Effect::SetStatus(format!("Loading {}...", self.title)));
        if self.frame.take().is_some() {
            effects.push(Effect::RemoveFrame);
        }
        let window = WindowId(self.attempt);
        self.frame = Some(window);
        effects.push(Effect::MountFrame(FrameSpec {
            window,
            url,
            ..self.frame_template.clone()
        }));
        effects.push(Effect::StartTimeout {
            attempt: self.attempt,
            after: LOAD_TIMEOUT,
        });
        effects.push(Effect::StartProgressTicker {
            attempt: self.attempt,
            every: PROGRESS_TICK,
        });
    }

    fn complete(&mut self, effects: &mut Vec<Effect>) {
        info!(game_id = %self.game_id, "game loaded");
        self.state = LoadState::Loaded;
        effects.push(Effect::CancelTimeout);
        effects.push(Effect::StopProgressTicker);
        self.set_progress(100.0, effects);
        self.show_overlay(Overlay::None, effects);
        effects.push(Effect::SetStatus(format!(
            "{} loaded successfully! Game ready to play.",
            self.title
        )));
        effects.push(Effect::record("load_completed"));
        effects.push(Effect::FocusFrame);
        effects.push(Effect::EnableFullscreenControl);
    }

    fn fail(&mut self, message: &str, record: Effect, effects: &mut Vec<Effect>) {
        self.state = LoadState::Error;
        effects.push(Effect::CancelTimeout);
        effects.push(Effect::StopProgressTicker);
        self.show_overlay(Overlay::Error, effects);
        effects.push(Effect::SetErrorText(message.to_string()));
        effects.push(record);
    }

    fn destroy(&mut self, effects: &mut Vec<Effect>) {
        // Invalidates any timer still in flight.
        self.attempt += 1;
        if self.frame.take().is_some() {
            effects.push(Effect::RemoveFrame);
        }
        effects.push(Effect::CancelTimeout);
        effects.push(Effect::StopProgressTicker);
        self.state = LoadState::Idle;
        self.progress = 0.0;
        self.simulated_progress = 0.0;
        self.real_progress = false;
        self.show_overlay(Overlay::Play, effects);
        debug!(container = %self.container_id, "game session destroyed");
    }

    fn show_overlay(&mut self, overlay: Overlay, effects: &mut Vec<Effect>) {
        if self.overlay != overlay {
            self.overlay = overlay;
            effects.push(Effect::ShowOverlay(overlay));
        }
    }

    fn set_progress(&mut self, progress: f64, effects: &mut Vec<Effect>) {
        self.progress = progress.clamp(0.0, 100.0);
        effects.push(Effect::SetProgress(self.progress));
    }

    fn on_message(&mut self, source: Option<WindowId>, raw: RawMessage, effects: &mut Vec<Effect>) {
        let Some(frame) = self.frame else {
            return;
        };
        if source != Some(frame) {
            return;
        }
        let message = match GameMessage::parse(&raw) {
            Ok(message) => message,
            Err(err) => {
                warn!(%err, "failed to parse game message");
                return;
            }
        };

        match message {
            GameMessage::Event { event, data } => {
                debug!(event = event.name(), "game event");
                if event == GameEvent::Loaded {
                    if self.state == LoadState::Loading {
                        self.complete(effects);
                    }
                    return;
                }
                if let Some(event_type) = event.analytics_name() {
                    let data = if event.forwards_data() {
                        event_data(data)
                    } else {
                        Map::new()
                    };
                    effects.push(Effect::record_with(event_type, data));
                }
            }
            GameMessage::Status {
                loading_progress: Some(progress),
                ..
            } => {
                if self.state == LoadState::Loading {
                    self.real_progress = true;
                    self.set_progress(progress, effects);
                }
            }
            GameMessage::Status { .. } => {}
            GameMessage::Error { message, .. } => {
                let message = message.unwrap_or_else(|| GAME_ERROR_MESSAGE.to_string());
                if self.state == LoadState::Loading {
                    warn!(game_id = %self.game_id, %message, "game reported an error");
                    let record = Effect::record_with("load_failed", error_data(&message));
                    self.fail(&message, record, effects);
                } else {
                    warn!(state = ?self.state, %message, "game error ignored");
                }
            }
            GameMessage::Unknown { kind } => {
                debug!(?kind, "unknown game message");
            }
        }
    }
}
