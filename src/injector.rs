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

//! Pointer injection for playback
//!
//! Moves the OS cursor in small steps toward a target and synthesizes
//! primary button presses

use enigo::{Button, Coordinate, Direction, Enigo, Mouse, Settings};
use std::thread;
use std::time::Duration;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::types::{DisplayGeometry, NormalizedPoint};

// Normalized units covered per step at speed 1.0
pub const STEP_DIVISOR: f64 = 3000.0;

pub const STEP_DELAY: Duration = Duration::from_millis(10);

/// The OS pointer as seen by the playback engine. Calls are synchronous.
pub trait PointerInjector {
    fn display(&mut self) -> Result<DisplayGeometry>;

    /// Travels from the current cursor position to `target` at `speed`.
    fn move_to(&mut self, target: NormalizedPoint, speed: f64) -> Result<()>;

    fn press(&mut self) -> Result<()>;

    fn release(&mut self) -> Result<()>;
}

impl<T: PointerInjector + ?Sized> PointerInjector for Box<T> {
    fn display(&mut self) -> Result<DisplayGeometry> {
        (**self).display()
    }

    fn move_to(&mut self, target: NormalizedPoint, speed: f64) -> Result<()> {
        (**self).move_to(target, speed)
    }

    fn press(&mut self) -> Result<()> {
        (**self).press()
    }

    fn release(&mut self) -> Result<()> {
        (**self).release()
    }
}

/// Intermediate cursor positions from `from` to `to`, ending exactly on `to`.
pub fn plan_steps(from: NormalizedPoint, to: NormalizedPoint, speed: f64) -> Vec<NormalizedPoint> {
    // Deltas in i64 so any pair of i32 positions is representable
    let dx = i64::from(to.x) - i64::from(from.x);
    let dy = i64::from(to.y) - i64::from(from.y);
    let span = dx.abs().max(dy.abs()) as f64;
    let steps = ((span / (STEP_DIVISOR * speed)).round() as i64).max(1);

    let (step_x, step_y) = (dx / steps, dy / steps);
    let mut path: Vec<NormalizedPoint> = (1..steps)
        .map(|i| NormalizedPoint {
            x: (i64::from(from.x) + step_x * i) as i32,
            y: (i64::from(from.y) + step_y * i) as i32,
        })
        .collect();
    path.push(to);
    path
}

fn injection_error(e: impl std::fmt::Display) -> Error {
    Error::Injection(e.to_string())
}

pub struct EnigoInjector {
    enigo: Enigo,
    display: DisplayGeometry,
}

impl EnigoInjector {
    /// Connects to the OS input system. `scale` is the ratio of physical to logical pixels.
    pub fn new(scale: (f64, f64)) -> Result<Self> {
        let enigo = Enigo::new(&Settings::default()).map_err(injection_error)?;
        let (width, height) = enigo.main_display().map_err(injection_error)?;

        let geometry = DisplayGeometry {
            width: (f64::from(width) / scale.0) as i32,
            height: (f64::from(height) / scale.1) as i32,
            scale_x: scale.0,
            scale_y: scale.1,
        };
        debug!(display = ?geometry, "Pointer injector ready");

        Ok(Self { enigo, display: geometry })
    }

    fn place(&mut self, point: NormalizedPoint) -> Result<()> {
        let (x, y) = self.display.denormalize(point);
        let x = (f64::from(x) * self.display.scale_x) as i32;
        let y = (f64::from(y) * self.display.scale_y) as i32;
        self.enigo
            .move_mouse(x, y, Coordinate::Abs)
            .map_err(injection_error)
    }
}

impl PointerInjector for EnigoInjector {
    fn display(&mut self) -> Result<DisplayGeometry> {
        Ok(self.display)
    }

    fn move_to(&mut self, target: NormalizedPoint, speed: f64) -> Result<()> {
        let (x, y) = self.enigo.location().map_err(injection_error)?;
        let from = self.display.normalize_reported(x, y);

        let path = plan_steps(from, target, speed);
        trace!(?from, ?target, steps = path.len(), "Moving pointer");
        for step in path {
            self.place(step)?;
            thread::sleep(STEP_DELAY);
        }
        Ok(())
    }

    fn press(&mut self) -> Result<()> {
        self.enigo
            .button(Button::Left, Direction::Press)
            .map_err(injection_error)
    }

    fn release(&mut self) -> Result<()> {
        self.enigo
            .button(Button::Left, Direction::Release)
            .map_err(injection_error)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio_util::sync::CancellationToken;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) enum Call {
        MoveTo(NormalizedPoint),
        Press,
        Release,
    }

    /// Records calls instead of touching the OS. The display is 65535 wide so
    /// normalized and screen coordinates coincide.
    #[derive(Clone, Default)]
    pub(crate) struct MockInjector {
        pub calls: Arc<Mutex<Vec<Call>>>,
        pub fail_on_press: bool,
        // Cancels the token once this many moves have been made
        pub cancel_after_moves: Option<(usize, CancellationToken)>,
    }

    impl MockInjector {
        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        pub fn moves(&self) -> usize {
            self.calls()
                .iter()
                .filter(|call| matches!(call, Call::MoveTo(_)))
                .count()
        }
    }

    impl PointerInjector for MockInjector {
        fn display(&mut self) -> Result<DisplayGeometry> {
            Ok(DisplayGeometry::new(65535, 65535))
        }

        fn move_to(&mut self, target: NormalizedPoint, _speed: f64) -> Result<()> {
            let mut calls = self.calls.lock().unwrap();
            calls.push(Call::MoveTo(target));
            if let Some((limit, token)) = &self.cancel_after_moves {
                let moves = calls.iter().filter(|c| matches!(c, Call::MoveTo(_))).count();
                if moves >= *limit {
                    token.cancel();
                }
            }
            Ok(())
        }

        fn press(&mut self) -> Result<()> {
            if self.fail_on_press {
                return Err(Error::Injection("button stuck".to_string()));
            }
            self.calls.lock().unwrap().push(Call::Press);
            Ok(())
        }

        fn release(&mut self) -> Result<()> {
            self.calls.lock().unwrap().push(Call::Release);
            Ok(())
        }
    }

    fn at(x: i32, y: i32) -> NormalizedPoint {
        NormalizedPoint { x, y }
    }

    #[test]
    fn test_plan_steps_short_move_is_single_snap() {
        assert_eq!(plan_steps(at(0, 0), at(100, 100), 1.0), vec![at(100, 100)]);
        assert_eq!(plan_steps(at(5, 5), at(5, 5), 1.0), vec![at(5, 5)]);
    }

    #[test]
    fn test_plan_steps_uses_largest_axis() {
        // 30000 / 3000 = 10 steps
        let path = plan_steps(at(0, 0), at(30000, 3000), 1.0);
        assert_eq!(path.len(), 10);
        assert_eq!(path[0], at(3000, 300));
        assert_eq!(path[8], at(27000, 2700));
        assert_eq!(*path.last().unwrap(), at(30000, 3000));
    }

    #[test]
    fn test_plan_steps_speed_divides_step_count() {
        let slow = plan_steps(at(0, 0), at(60000, 0), 0.5);
        let fast = plan_steps(at(0, 0), at(60000, 0), 2.0);
        assert_eq!(slow.len(), 40);
        assert_eq!(fast.len(), 10);
    }

    #[test]
    fn test_plan_steps_snaps_to_uneven_target() {
        let path = plan_steps(at(0, 0), at(-10001, 7), 1.0);
        assert_eq!(path.len(), 3);
        assert_eq!(*path.last().unwrap(), at(-10001, 7));
    }

    #[test]
    fn test_plan_steps_spans_full_i32_range() {
        let far = at(i32::MIN + 33, 0);
        let path = plan_steps(at(30000, 0), far, 100.0);
        // 2147513615 / 300000 rounds to 7158 steps
        assert_eq!(path.len(), 7158);
        assert!(path.windows(2).all(|w| w[1].x < w[0].x));
        assert_eq!(*path.last().unwrap(), far);
    }
}
