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

//! Point capture state machine
//!
//! Turns a stream of pointer and modifier events into an ordered list of
//! action points. A press and release closer than [`MIN_DRAG_DISTANCE`]
//! records a single point; anything further records a start and an end point.
//! The machine does not care where events come from, see [`crate::input`].

use tracing::{debug, trace};

use crate::types::{ActionKind, ActionPoint};

/// Press/release pairs further apart than this are drags.
pub const MIN_DRAG_DISTANCE: f64 = 10.0;

/// Radius of a rendered marker; trajectory lines stop at the marker edge.
pub const MARKER_RADIUS: f64 = 15.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Left,
    Right,
    Middle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    ButtonDown { x: i32, y: i32, button: PointerButton },
    ButtonUp { x: i32, y: i32, button: PointerButton },
    Move { x: i32, y: i32 },
    ModifierDown,
    ModifierUp,
    // Close the capture session
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectoryLine {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl TrajectoryLine {
    /// Line from `start` toward `(x, y)`, pulled in by `start_offset` and `end_offset`.
    pub fn between(start: &ActionPoint, x: i32, y: i32, start_offset: f64, end_offset: f64) -> Self {
        let (sin, cos) = start.angle_to(x, y).sin_cos();
        Self {
            x1: f64::from(start.x) + cos * start_offset,
            y1: f64::from(start.y) + sin * start_offset,
            x2: f64::from(x) - cos * end_offset,
            y2: f64::from(y) - sin * end_offset,
        }
    }
}

/// Receives the visual side effects of a capture session.
pub trait CaptureView {
    /// A new numbered marker (1-based) at the point, styled by its kind.
    fn marker_created(&mut self, number: usize, point: &ActionPoint);
    /// The kind of an existing marker changed.
    fn marker_updated(&mut self, number: usize, point: &ActionPoint);
    fn line_updated(&mut self, line: &TrajectoryLine);
    fn line_finished(&mut self, line: &TrajectoryLine);
    fn line_removed(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Intent {
    Click(PointerButton),
    Move,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Idle,
    Tracking { intent: Intent, start: usize },
}

pub struct CaptureSession<V: CaptureView> {
    view: V,
    points: Vec<ActionPoint>,
    mode: Mode,
    last_position: (i32, i32),
}

impl<V: CaptureView> CaptureSession<V> {
    pub fn new(view: V) -> Self {
        Self {
            view,
            points: Vec::new(),
            mode: Mode::Idle,
            last_position: (0, 0),
        }
    }

    pub fn points(&self) -> &[ActionPoint] {
        &self.points
    }

    pub fn is_tracking(&self) -> bool {
        matches!(self.mode, Mode::Tracking { .. })
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn handle(&mut self, event: InputEvent) {
        match (self.mode, event) {
            (_, InputEvent::Move { x, y }) => {
                self.last_position = (x, y);
                if let Mode::Tracking { start, .. } = self.mode {
                    let line = TrajectoryLine::between(&self.points[start], x, y, MARKER_RADIUS, 0.0);
                    self.view.line_updated(&line);
                }
            }
            (Mode::Idle, InputEvent::ButtonDown { x, y, button: PointerButton::Left }) => {
                self.last_position = (x, y);
                self.begin(Intent::Click(PointerButton::Left), ActionKind::Press);
            }
            (Mode::Idle, InputEvent::ModifierDown) => {
                self.begin(Intent::Move, ActionKind::Move);
            }
            (Mode::Tracking { intent: Intent::Click(held), start }, InputEvent::ButtonUp { x, y, button })
                if held == button =>
            {
                self.last_position = (x, y);
                self.resolve(Intent::Click(held), start);
            }
            (Mode::Tracking { intent: Intent::Move, start }, InputEvent::ModifierUp) => {
                self.resolve(Intent::Move, start);
            }
            (_, InputEvent::Exit) => {}
            (mode, event) => {
                trace!(?mode, ?event, "Ignoring capture event");
            }
        }
    }

    fn begin(&mut self, intent: Intent, kind: ActionKind) {
        let (x, y) = self.last_position;
        let point = ActionPoint::new(x, y, kind);
        self.points.push(point);
        let start = self.points.len() - 1;
        self.mode = Mode::Tracking { intent, start };

        debug!(number = start + 1, x, y, ?intent, "Gesture started");
        self.view.marker_created(start + 1, &point);
        let line = TrajectoryLine::between(&point, x, y, MARKER_RADIUS, 0.0);
        self.view.line_updated(&line);
    }

    fn resolve(&mut self, intent: Intent, start: usize) {
        let (x, y) = self.last_position;
        let origin = self.points[start];

        if origin.distance_to(x, y) > MIN_DRAG_DISTANCE {
            let kind = match intent {
                Intent::Click(_) => ActionKind::Release,
                Intent::Move => ActionKind::Move,
            };
            let end = ActionPoint::new(x, y, kind);
            self.points.push(end);

            debug!(number = self.points.len(), x, y, "Gesture ended as drag");
            self.view.marker_created(self.points.len(), &end);
            let line = TrajectoryLine::between(&origin, x, y, MARKER_RADIUS, MARKER_RADIUS);
            self.view.line_finished(&line);
        } else {
            let point = &mut self.points[start];
            point.kind = match intent {
                Intent::Click(_) => ActionKind::PressAndRelease,
                Intent::Move => ActionKind::Move,
            };

            debug!(number = start + 1, "Gesture ended in place");
            self.view.line_removed();
            self.view.marker_updated(start + 1, point);
        }

        self.mode = Mode::Idle;
    }

    /// Ends the session. A gesture still in flight resolves at the last known position.
    pub fn finish(mut self) -> Vec<ActionPoint> {
        if let Mode::Tracking { intent, start } = self.mode {
            self.resolve(intent, start);
        }
        self.points
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum Drawn {
        Marker(usize, ActionPoint),
        Restyled(usize, ActionPoint),
        Line(TrajectoryLine),
        Finished(TrajectoryLine),
        Removed,
    }

    #[derive(Default)]
    pub(crate) struct RecordingView {
        pub drawn: Vec<Drawn>,
    }

    impl CaptureView for RecordingView {
        fn marker_created(&mut self, number: usize, point: &ActionPoint) {
            self.drawn.push(Drawn::Marker(number, *point));
        }

        fn marker_updated(&mut self, number: usize, point: &ActionPoint) {
            self.drawn.push(Drawn::Restyled(number, *point));
        }

        fn line_updated(&mut self, line: &TrajectoryLine) {
            self.drawn.push(Drawn::Line(*line));
        }

        fn line_finished(&mut self, line: &TrajectoryLine) {
            self.drawn.push(Drawn::Finished(*line));
        }

        fn line_removed(&mut self) {
            self.drawn.push(Drawn::Removed);
        }
    }

    fn down(x: i32, y: i32) -> InputEvent {
        InputEvent::ButtonDown {
            x,
            y,
            button: PointerButton::Left,
        }
    }

    fn up(x: i32, y: i32) -> InputEvent {
        InputEvent::ButtonUp {
            x,
            y,
            button: PointerButton::Left,
        }
    }

    fn capture(events: &[InputEvent]) -> Vec<ActionPoint> {
        let mut session = CaptureSession::new(RecordingView::default());
        for event in events {
            session.handle(*event);
        }
        session.finish()
    }

    #[test]
    fn test_click_in_place() {
        let points = capture(&[down(50, 50), up(52, 51)]);
        assert_eq!(points, vec![ActionPoint::new(50, 50, ActionKind::PressAndRelease)]);
    }

    #[test]
    fn test_drag_records_press_and_release() {
        let points = capture(&[down(50, 50), InputEvent::Move { x: 80, y: 50 }, up(80, 50)]);
        assert_eq!(
            points,
            vec![
                ActionPoint::new(50, 50, ActionKind::Press),
                ActionPoint::new(80, 50, ActionKind::Release),
            ]
        );
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let points = capture(&[down(0, 0), up(10, 0)]);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].kind, ActionKind::PressAndRelease);

        let points = capture(&[down(0, 0), up(11, 0)]);
        assert_eq!(points.len(), 2);
    }

    #[test]
    fn test_modifier_in_place_records_move() {
        let points = capture(&[
            InputEvent::Move { x: 200, y: 300 },
            InputEvent::ModifierDown,
            InputEvent::Move { x: 203, y: 300 },
            InputEvent::ModifierUp,
        ]);
        assert_eq!(points, vec![ActionPoint::new(200, 300, ActionKind::Move)]);
    }

    #[test]
    fn test_modifier_drag_records_two_moves() {
        let points = capture(&[
            InputEvent::Move { x: 10, y: 10 },
            InputEvent::ModifierDown,
            InputEvent::Move { x: 100, y: 100 },
            InputEvent::ModifierUp,
        ]);
        assert_eq!(
            points,
            vec![
                ActionPoint::new(10, 10, ActionKind::Move),
                ActionPoint::new(100, 100, ActionKind::Move),
            ]
        );
    }

    #[test]
    fn test_spurious_events_are_ignored() {
        let points = capture(&[
            up(5, 5),
            InputEvent::ModifierUp,
            down(50, 50),
            // Already tracking, neither starts a second gesture
            down(70, 70),
            InputEvent::ModifierDown,
            // Wrong button and wrong trigger do not end the gesture
            InputEvent::ButtonUp {
                x: 90,
                y: 90,
                button: PointerButton::Right,
            },
            InputEvent::ModifierUp,
            up(50, 50),
        ]);
        assert_eq!(points, vec![ActionPoint::new(50, 50, ActionKind::PressAndRelease)]);
    }

    #[test]
    fn test_non_primary_button_does_not_start() {
        let points = capture(&[
            InputEvent::ButtonDown {
                x: 1,
                y: 1,
                button: PointerButton::Right,
            },
            InputEvent::ButtonUp {
                x: 1,
                y: 1,
                button: PointerButton::Right,
            },
        ]);
        assert!(points.is_empty());
    }

    #[test]
    fn test_sequence_accumulates_in_order() {
        let points = capture(&[
            down(10, 10),
            up(10, 10),
            down(100, 100),
            up(200, 100),
            InputEvent::ModifierDown,
            InputEvent::ModifierUp,
        ]);
        let kinds: Vec<_> = points.iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ActionKind::PressAndRelease,
                ActionKind::Press,
                ActionKind::Release,
                ActionKind::Move,
            ]
        );
        // The modifier gesture starts where the pointer last was
        assert_eq!((points[3].x, points[3].y), (200, 100));
    }

    #[test]
    fn test_finish_resolves_open_gesture() {
        let mut session = CaptureSession::new(RecordingView::default());
        session.handle(down(0, 0));
        session.handle(InputEvent::Move { x: 0, y: 40 });
        assert!(session.is_tracking());

        let points = session.finish();
        assert_eq!(
            points,
            vec![
                ActionPoint::new(0, 0, ActionKind::Press),
                ActionPoint::new(0, 40, ActionKind::Release),
            ]
        );
    }

    #[test]
    fn test_view_receives_markers_and_lines() {
        let mut session = CaptureSession::new(RecordingView::default());
        session.handle(down(0, 0));
        session.handle(InputEvent::Move { x: 100, y: 0 });
        session.handle(up(100, 0));
        session.handle(down(300, 300));
        session.handle(up(300, 300));

        let drawn = &session.view().drawn;
        assert_eq!(drawn[0], Drawn::Marker(1, ActionPoint::new(0, 0, ActionKind::Press)));
        assert!(matches!(drawn[1], Drawn::Line(_)));
        assert_eq!(
            drawn[2],
            Drawn::Line(TrajectoryLine {
                x1: 15.0,
                y1: 0.0,
                x2: 100.0,
                y2: 0.0
            })
        );
        assert_eq!(drawn[3], Drawn::Marker(2, ActionPoint::new(100, 0, ActionKind::Release)));
        assert_eq!(
            drawn[4],
            Drawn::Finished(TrajectoryLine {
                x1: 15.0,
                y1: 0.0,
                x2: 85.0,
                y2: 0.0
            })
        );
        assert_eq!(drawn[5], Drawn::Marker(3, ActionPoint::new(300, 300, ActionKind::Press)));
        assert!(matches!(drawn[6], Drawn::Line(_)));
        assert_eq!(drawn[7], Drawn::Removed);
        assert_eq!(
            drawn[8],
            Drawn::Restyled(3, ActionPoint::new(300, 300, ActionKind::PressAndRelease))
        );
    }

    #[test]
    fn test_trajectory_line_offsets_along_bearing() {
        let start = ActionPoint::new(0, 0, ActionKind::Press);
        let line = TrajectoryLine::between(&start, 0, 100, 10.0, 20.0);
        assert!(line.x1.abs() < 1e-9);
        assert!((line.y1 - 10.0).abs() < 1e-9);
        assert!(line.x2.abs() < 1e-9);
        assert!((line.y2 - 80.0).abs() < 1e-9);
    }
}
