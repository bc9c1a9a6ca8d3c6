use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

use omr_core::{update, AppState, AppViewModel, Msg};
use omr_engine::{EngineConfig, EngineHandle, ServiceError};
use omr_logging::omr_debug;

use super::effects::EffectRunner;

/// Application state plus the runner that executes its effects.
pub struct App {
    state: AppState,
    runner: EffectRunner,
    msg_rx: mpsc::Receiver<Msg>,
}

impl App {
    pub fn new(config: EngineConfig) -> Result<Self, ServiceError> {
        Ok(Self::with_engine(EngineHandle::new(config)?))
    }

    pub fn with_engine(engine: EngineHandle) -> Self {
        let (msg_tx, msg_rx) = mpsc::channel();
        Self {
            state: AppState::new(),
            runner: EffectRunner::new(engine, msg_tx),
            msg_rx,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn dispatch(&mut self, msg: Msg) {
        let state = std::mem::take(&mut self.state);
        let (state, effects) = update(state, msg);
        self.state = state;
        if self.state.consume_dirty() {
            log_view(&self.state.view());
        }
        self.runner.enqueue(effects);
    }

    /// Feeds engine results back into the state until `done` holds.
    /// Returns false if `timeout` passes first.
    pub fn run_until(&mut self, timeout: Duration, done: impl Fn(&AppState) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while !done(&self.state) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.msg_rx.recv_timeout(remaining) {
                Ok(msg) => self.dispatch(msg),
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return false,
            }
        }
        true
    }
}

fn log_view(view: &AppViewModel) {
    omr_debug!(
        "view: files={} collecting={} can_submit={} submission={:?} results={}",
        view.file_count,
        view.collecting,
        view.can_submit,
        view.submission,
        view.results.len()
    );
}
