// Copyright (C) 2025  Tom Waddington
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published
// by the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Sequence controller
//!
//! Owns the live sequence, hands snapshots to playback runs and folds the
//! runs' state updates back into what the foreground displays

use std::fmt;
use std::sync::Arc;
use std::thread;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::injector::PointerInjector;
use crate::playback::{PlaybackEngine, RunEvent, RunOutcome, report_unstarted};
use crate::types::{ActionPoint, PlaybackConfig, Settings};

/// Builds the injector for a run, on the run's own thread.
pub type InjectorFactory = Arc<dyn Fn() -> Result<Box<dyn PointerInjector>> + Send + Sync>;

/// What the foreground shows about the current run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunState {
    pub running: bool,
    pub cancelling: bool,
    pub countdown: u32,
    // (pass, index) of the action being executed
    pub progress: Option<(u64, usize)>,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.cancelling {
            f.write_str("Cancelling...")
        } else if self.countdown > 0 {
            write!(f, "Run in {}...", self.countdown)
        } else if self.running {
            f.write_str("Cancel")
        } else {
            f.write_str("Run")
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Started,
    Cancelling,
    // A cancellation is already pending
    Ignored,
}

struct ActiveRun {
    cancel: CancellationToken,
    thread: Option<thread::JoinHandle<()>>,
}

pub struct SequenceController {
    points: Vec<ActionPoint>,
    config: PlaybackConfig,
    state: RunState,
    run_enabled: bool,
    capturing: bool,
    last_error: Option<String>,
    active: Option<ActiveRun>,
    factory: InjectorFactory,
    events_tx: UnboundedSender<RunEvent>,
    events_rx: UnboundedReceiver<RunEvent>,
}

impl SequenceController {
    pub fn new(settings: Settings, factory: InjectorFactory) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut controller = Self {
            points: settings.points,
            config: settings.config,
            state: RunState::default(),
            run_enabled: false,
            capturing: false,
            last_error: None,
            active: None,
            factory,
            events_tx,
            events_rx,
        };
        controller.refresh_run_enabled();
        controller
    }

    pub fn points(&self) -> &[ActionPoint] {
        &self.points
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    pub fn settings(&self) -> Settings {
        Settings {
            points: self.points.clone(),
            config: self.config.clone(),
        }
    }

    /// Whether the run toggle is available: something to play, or a run to cancel.
    pub fn can_run(&self) -> bool {
        self.run_enabled
    }

    fn refresh_run_enabled(&mut self) {
        self.run_enabled = !self.points.is_empty() || self.is_running();
    }

    fn ensure_editable(&self) -> Result<()> {
        if self.is_running() {
            return Err(Error::RunInProgress);
        }
        Ok(())
    }

    pub fn set_config(&mut self, config: PlaybackConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Appends a default point and returns its index.
    pub fn add_point(&mut self) -> Result<usize> {
        self.ensure_editable()?;
        self.points.push(ActionPoint::default());
        self.refresh_run_enabled();
        Ok(self.points.len() - 1)
    }

    pub fn update_point(&mut self, index: usize, point: ActionPoint) -> Result<()> {
        self.ensure_editable()?;
        let slot = self
            .points
            .get_mut(index)
            .ok_or(Error::IndexOutOfRange(index))?;
        *slot = point;
        Ok(())
    }

    pub fn remove_point(&mut self, index: usize) -> Result<ActionPoint> {
        self.ensure_editable()?;
        if index >= self.points.len() {
            return Err(Error::IndexOutOfRange(index));
        }
        let removed = self.points.remove(index);
        self.refresh_run_enabled();
        Ok(removed)
    }

    pub fn replace(&mut self, points: Vec<ActionPoint>) -> Result<()> {
        self.ensure_editable()?;
        self.points = points;
        self.refresh_run_enabled();
        Ok(())
    }

    pub fn clear(&mut self) -> Result<()> {
        self.replace(Vec::new())
    }

    pub fn begin_capture(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(Error::RunInProgress);
        }
        if self.capturing {
            return Err(Error::CaptureInProgress);
        }
        self.capturing = true;
        debug!("Capture session opened");
        Ok(())
    }

    /// Closes the capture session. A non-empty capture replaces the sequence.
    pub fn finish_capture(&mut self, points: Vec<ActionPoint>) -> Result<bool> {
        self.capturing = false;
        if points.is_empty() {
            debug!("Capture produced no points, keeping the sequence");
            return Ok(false);
        }
        self.replace(points)?;
        Ok(true)
    }

    /// Starts a run, or cancels the active one.
    pub fn run_or_cancel(&mut self) -> Result<Toggle> {
        if self.state.cancelling {
            return Ok(Toggle::Ignored);
        }

        if let Some(run) = &self.active {
            run.cancel.cancel();
            self.state.cancelling = true;
            info!("Cancelling playback");
            return Ok(Toggle::Cancelling);
        }

        if self.capturing {
            return Err(Error::CaptureInProgress);
        }
        if self.points.is_empty() {
            return Err(Error::EmptySequence);
        }
        self.config.validate()?;

        self.start_run()?;
        Ok(Toggle::Started)
    }

    fn start_run(&mut self) -> Result<()> {
        let snapshot = self.points.clone();
        let config = self.config.clone();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let events = self.events_tx.clone();
        let factory = Arc::clone(&self.factory);

        info!(
            points = snapshot.len(),
            repeat = config.repeat_count,
            speed = config.speed,
            "Starting playback"
        );

        let countdown = config.countdown;
        let thread = thread::Builder::new()
            .name("playback".to_string())
            .spawn(move || {
                // Injectors are built here since OS input handles may be bound to their thread
                let injector = match factory() {
                    Ok(injector) => injector,
                    Err(error) => {
                        report_unstarted(&events, error);
                        return;
                    }
                };
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(error) => {
                        report_unstarted(&events, Error::Io(error));
                        return;
                    }
                };
                runtime.block_on(
                    PlaybackEngine::new(injector, config, token, events).execute(snapshot),
                );
            })?;

        self.active = Some(ActiveRun {
            cancel,
            thread: Some(thread),
        });
        self.last_error = None;
        self.state = RunState {
            running: true,
            countdown,
            ..RunState::default()
        };
        self.refresh_run_enabled();
        Ok(())
    }

    /// Folds a state update from the playback thread into the controller.
    pub fn apply(&mut self, event: &RunEvent) {
        match event {
            RunEvent::Countdown(remaining) => self.state.countdown = *remaining,
            RunEvent::Progress { pass, index } => self.state.progress = Some((*pass, *index)),
            RunEvent::Ended(outcome) => {
                if let Some(mut run) = self.active.take() {
                    if let Some(handle) = run.thread.take() {
                        let _ = handle.join();
                    }
                }
                self.state = RunState::default();

                match outcome {
                    RunOutcome::Completed { passes } => info!(passes, "Sequence finished"),
                    RunOutcome::Cancelled { passes } => info!(passes, "Playback stopped"),
                    RunOutcome::Failed { passes, error } => {
                        error!(%error, passes, "Playback failed");
                        self.last_error = Some(error.to_string());
                    }
                }
                self.refresh_run_enabled();
            }
        }
    }

    /// Waits for the next update from the active run and applies it.
    pub async fn next_event(&mut self) -> Option<RunEvent> {
        let event = self.events_rx.recv().await?;
        self.apply(&event);
        Some(event)
    }
}

impl Drop for SequenceController {
    fn drop(&mut self) {
        if let Some(run) = &self.active {
            run.cancel.cancel();
        }
    }
}
