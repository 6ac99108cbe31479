//! Runs a [GameSession] on a tokio task.
//!
//! The driver owns the session's timers and forwards `Record` effects to an
//! [EventRecorder]. Every other effect is handed to the [SessionHost], which
//! owns the page (frame, overlays, status line).

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::{
    sync::{mpsc, watch},
    task::{JoinError, JoinHandle},
    time::{interval_at, sleep, Instant},
};
use tracing::{debug, trace};

use crate::{
    recorder::EventRecorder,
    session::{Effect, GameSession, Input, LoadState, MAX_PROGRESS_STEP},
};

/// Applies page-level effects.
pub trait SessionHost: Send + 'static {
    fn apply(&mut self, effect: &Effect);
}

#[derive(Default)]
struct Timers {
    timeout: Option<JoinHandle<()>>,
    completion: Option<JoinHandle<()>>,
    ticker: Option<JoinHandle<()>>,
}

impl Timers {
    fn replace(slot: &mut Option<JoinHandle<()>>, task: Option<JoinHandle<()>>) {
        if let Some(old) = std::mem::replace(slot, task) {
            old.abort();
        }
    }

    fn abort_all(&mut self) {
        Self::replace(&mut self.timeout, None);
        Self::replace(&mut self.completion, None);
        Self::replace(&mut self.ticker, None);
    }
}

impl Drop for Timers {
    fn drop(&mut self) {
        self.abort_all();
    }
}

/// Sends `input` to the driver after `after`, unless the driver has stopped.
fn deliver_after(
    inbox: mpsc::WeakUnboundedSender<Input>,
    after: Duration,
    input: Input,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        sleep(after).await;
        if let Some(inbox) = inbox.upgrade() {
            let _ = inbox.send(input);
        }
    })
}

fn progress_ticker(
    inbox: mpsc::WeakUnboundedSender<Input>,
    attempt: u64,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticks = interval_at(Instant::now() + every, every);
        loop {
            ticks.tick().await;
            let increment = rand::thread_rng().gen_range(0.0..MAX_PROGRESS_STEP);
            let Some(inbox) = inbox.upgrade() else {
                return;
            };
            if inbox.send(Input::ProgressTick { attempt, increment }).is_err() {
                return;
            }
        }
    })
}

struct Driver<H> {
    session: GameSession,
    host: H,
    recorder: Arc<dyn EventRecorder>,
    inbox: mpsc::WeakUnboundedSender<Input>,
    state: watch::Sender<LoadState>,
    timers: Timers,
}

impl<H: SessionHost> Driver<H> {
    async fn run(mut self, mut inputs: mpsc::UnboundedReceiver<Input>) -> GameSession {
        while let Some(input) = inputs.recv().await {
            trace!(?input, "session input");
            for effect in self.session.handle(input) {
                self.apply(effect);
            }
            self.state.send_replace(self.session.state());
        }
        self.timers.abort_all();
        debug!(game_id = self.session.game_id(), "session driver stopped");
        self.session
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::StartTimeout { attempt, after } => {
                let task = deliver_after(self.inbox.clone(), after, Input::LoadTimeout { attempt });
                Timers::replace(&mut self.timers.timeout, Some(task));
            }
            Effect::CancelTimeout => Timers::replace(&mut self.timers.timeout, None),
            Effect::ScheduleCompletionCheck { attempt, after } => {
                let task =
                    deliver_after(self.inbox.clone(), after, Input::CompletionCheck { attempt });
                Timers::replace(&mut self.timers.completion, Some(task));
            }
            Effect::StartProgressTicker { attempt, every } => {
                let task = progress_ticker(self.inbox.clone(), attempt, every);
                Timers::replace(&mut self.timers.ticker, Some(task));
            }
            Effect::StopProgressTicker => Timers::replace(&mut self.timers.ticker, None),
            Effect::Record { event_type, data } => {
                self.recorder
                    .record(&event_type, self.session.game_id(), data);
            }
            other => self.host.apply(&other),
        }
    }
}

/// Handle to a running session driver.
pub struct SessionHandle {
    inputs: mpsc::UnboundedSender<Input>,
    state: watch::Receiver<LoadState>,
    task: JoinHandle<GameSession>,
}

impl SessionHandle {
    /// Start driving `session` on the current tokio runtime.
    pub fn spawn<H: SessionHost>(
        session: GameSession,
        host: H,
        recorder: Arc<dyn EventRecorder>,
    ) -> Self {
        let (inputs, receiver) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(session.state());
        let driver = Driver {
            session,
            host,
            recorder,
            inbox: inputs.downgrade(),
            state: state_tx,
            timers: Timers::default(),
        };
        let task = tokio::spawn(driver.run(receiver));
        Self {
            inputs,
            state,
            task,
        }
    }

    /// Queue an input. Returns false once the driver has stopped.
    pub fn send(&self, input: Input) -> bool {
        self.inputs.send(input).is_ok()
    }

    pub fn play(&self) -> bool {
        self.send(Input::Play)
    }

    pub fn retry(&self) -> bool {
        self.send(Input::Retry)
    }

    pub fn destroy(&self) -> bool {
        self.send(Input::Destroy)
    }

    /// State after the most recently processed input.
    pub fn state(&self) -> LoadState {
        *self.state.borrow()
    }

    /// Wait until the session reaches `target`. Returns false if the driver stops first.
    pub async fn wait_for(&mut self, target: LoadState) -> bool {
        self.state.wait_for(|state| *state == target).await.is_ok()
    }

    /// Stop accepting inputs, drain the queue and return the session.
    pub async fn finish(self) -> Result<GameSession, JoinError> {
        drop(self.inputs);
        self.task.await
    }
}
