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

//! Playback engine for recorded sequences
//!
//! Counts down, then replays a snapshot of the sequence with the configured
//! timing until the repeat count is reached or the run is cancelled

use rand::Rng;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::injector::PointerInjector;
use crate::types::{ActionKind, ActionPoint, DisplayGeometry, PlaybackConfig};

pub const COUNTDOWN_TICK: Duration = Duration::from_millis(1000);

#[derive(Debug)]
pub enum RunOutcome {
    Completed { passes: u64 },
    Cancelled { passes: u64 },
    Failed { passes: u64, error: Error },
}

/// State updates posted from the playback thread to the foreground.
#[derive(Debug)]
pub enum RunEvent {
    Countdown(u32),
    Progress { pass: u64, index: usize },
    // Always the last event of a run, sent exactly once
    Ended(RunOutcome),
}

// Sends `Ended` when dropped, including during a panic unwind
struct EndGuard {
    events: UnboundedSender<RunEvent>,
    outcome: Option<RunOutcome>,
}

impl Drop for EndGuard {
    fn drop(&mut self) {
        let outcome = self.outcome.take().unwrap_or(RunOutcome::Failed {
            passes: 0,
            error: Error::Aborted,
        });
        let _ = self.events.send(RunEvent::Ended(outcome));
    }
}

/// Sends the final `Ended` event for a run that never got an engine.
pub fn report_unstarted(events: &UnboundedSender<RunEvent>, error: Error) {
    let _ = events.send(RunEvent::Ended(RunOutcome::Failed { passes: 0, error }));
}

pub struct PlaybackEngine<I: PointerInjector> {
    injector: I,
    config: PlaybackConfig,
    cancel: CancellationToken,
    events: UnboundedSender<RunEvent>,
}

impl<I: PointerInjector> PlaybackEngine<I> {
    pub fn new(
        injector: I,
        config: PlaybackConfig,
        cancel: CancellationToken,
        events: UnboundedSender<RunEvent>,
    ) -> Self {
        Self {
            injector,
            config,
            cancel,
            events,
        }
    }

    fn should_continue(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    fn notify(&self, event: RunEvent) {
        let _ = self.events.send(event);
    }

    fn calculate_delay(&self, base_ms: u64) -> Duration {
        let jitter_ms = (base_ms as f64 * self.config.jitter) as u64;

        if jitter_ms > 0 {
            let mut rng = rand::thread_rng();
            let variation = rng.gen_range(0..=jitter_ms * 2);
            let delay = base_ms.saturating_add(variation).saturating_sub(jitter_ms);
            Duration::from_millis(delay)
        } else {
            Duration::from_millis(base_ms)
        }
    }

    /// Sleeps unless cancelled first. Returns false when the wait was cut short.
    async fn wait(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = sleep(duration) => true,
        }
    }

    async fn countdown(&self) {
        let mut remaining = self.config.countdown;
        while remaining > 0 && self.should_continue() {
            self.notify(RunEvent::Countdown(remaining));
            remaining -= 1;
            if !self.wait(COUNTDOWN_TICK).await {
                break;
            }
        }
        self.notify(RunEvent::Countdown(0));
    }

    async fn execute_point(&mut self, display: &DisplayGeometry, point: &ActionPoint) -> Result<()> {
        let target = display.normalize(point.x, point.y);
        self.injector.move_to(target, self.config.speed)?;

        if point.kind.presses() {
            self.injector.press()?;
            // A cancelled hold still falls through to the release below
            if self.config.click_duration_ms > 0 {
                self.wait(Duration::from_millis(self.config.click_duration_ms))
                    .await;
            }
        }
        if point.kind.releases() {
            self.injector.release()?;
        }
        if point.kind == ActionKind::Move {
            debug!(x = point.x, y = point.y, "Moved without clicking");
        }
        Ok(())
    }

    async fn replay(&mut self, points: &[ActionPoint], passes: &mut u64) -> Result<()> {
        let display = self.injector.display()?;
        let repeat = self.config.repeat_count;

        while self.should_continue() && (repeat == 0 || *passes < repeat) {
            for (index, point) in points.iter().enumerate() {
                if !self.should_continue() {
                    return Ok(());
                }

                self.notify(RunEvent::Progress {
                    pass: *passes,
                    index,
                });
                self.execute_point(&display, point).await?;

                if self.should_continue() && self.config.delay_after_action_ms > 0 {
                    let delay = self.calculate_delay(self.config.delay_after_action_ms);
                    self.wait(delay).await;
                }
            }

            *passes += 1;
            debug!(passes = *passes, "Pass complete");

            if self.should_continue() && self.config.delay_after_pass_ms > 0 {
                let delay = self.calculate_delay(self.config.delay_after_pass_ms);
                self.wait(delay).await;
            }
        }
        Ok(())
    }

    /// Runs the countdown and replay. Reports the outcome as a final `RunEvent::Ended`.
    pub async fn execute(mut self, points: Vec<ActionPoint>) {
        let mut guard = EndGuard {
            events: self.events.clone(),
            outcome: None,
        };

        self.countdown().await;

        let mut passes = 0;
        let result = if points.is_empty() {
            Ok(())
        } else {
            self.replay(&points, &mut passes).await
        };

        let outcome = match result {
            Err(error) => {
                warn!(%error, passes, "Playback failed");
                RunOutcome::Failed { passes, error }
            }
            Ok(()) if !self.should_continue() => {
                info!(passes, "Playback cancelled");
                RunOutcome::Cancelled { passes }
            }
            Ok(()) => {
                info!(passes, "Playback finished");
                RunOutcome::Completed { passes }
            }
        };
        guard.outcome = Some(outcome);
    }
}
