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

//! Input sources for capture sessions
//!
//! Two sources feed the same state machine: a global OS hook that lets clicks
//! pass through to other applications, and the terminal itself as a scoped
//! capture surface

use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyboardEnhancementFlags, ModifierKeyCode, MouseButton, MouseEvent, MouseEventKind,
    PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, supports_keyboard_enhancement};
use enigo::{Enigo, Mouse, Settings};
use rdev::{Button, EventType, Key};
use std::io::{IsTerminal, Write};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, error, info, trace};

use crate::capture::{CaptureSession, CaptureView, InputEvent, PointerButton, TrajectoryLine};
use crate::error::Result;
use crate::types::ActionPoint;

/// Delivers raw pointer and modifier events to a capture session.
pub trait EventSource {
    fn start(&mut self, events: UnboundedSender<InputEvent>) -> Result<()>;

    fn stop(&mut self);
}

/// Runs a capture session over `source` until it reports `Exit`.
pub async fn record<S, V>(source: &mut S, view: V) -> Result<Vec<ActionPoint>>
where
    S: EventSource + ?Sized,
    V: CaptureView,
{
    let (tx, mut rx) = mpsc::unbounded_channel();
    source.start(tx)?;
    info!("Capture started, press Esc to finish");

    let mut session = CaptureSession::new(view);
    while let Some(event) = rx.recv().await {
        if event == InputEvent::Exit {
            break;
        }
        session.handle(event);
    }

    source.stop();
    let points = session.finish();
    info!(points = points.len(), "Capture finished");
    Ok(points)
}

/// Global hook over all pointer and keyboard input, via `rdev`.
#[derive(Default)]
pub struct GlobalHook {
    stop: Arc<AtomicBool>,
}

impl GlobalHook {
    pub fn new() -> Self {
        Self::default()
    }
}

fn hook_button(button: &Button) -> Option<PointerButton> {
    match button {
        Button::Left => Some(PointerButton::Left),
        Button::Right => Some(PointerButton::Right),
        Button::Middle => Some(PointerButton::Middle),
        Button::Unknown(_) => None,
    }
}

/// Screen position of the OS cursor, in the same pixel space the injector replays into.
fn cursor_location(enigo: &Enigo) -> Option<(i32, i32)> {
    match enigo.location() {
        Ok(location) => Some(location),
        Err(e) => {
            debug!(error = %e, "Cursor position unavailable");
            None
        }
    }
}

fn cursor_reader() -> Option<Enigo> {
    match Enigo::new(&Settings::default()) {
        Ok(enigo) => Some(enigo),
        Err(e) => {
            error!(error = %e, "Cannot read the cursor position");
            None
        }
    }
}

// rdev reports buttons without a position, so the last known one is tracked
// here. Buttons are dropped until a position is known.
fn translate_hook(event: &EventType, position: &mut Option<(i32, i32)>) -> Option<InputEvent> {
    match event {
        EventType::MouseMove { x, y } => {
            let (x, y) = (*x as i32, *y as i32);
            *position = Some((x, y));
            Some(InputEvent::Move { x, y })
        }
        EventType::ButtonPress(button) => {
            let (x, y) = (*position)?;
            hook_button(button).map(|button| InputEvent::ButtonDown { x, y, button })
        }
        EventType::ButtonRelease(button) => {
            let (x, y) = (*position)?;
            hook_button(button).map(|button| InputEvent::ButtonUp { x, y, button })
        }
        EventType::KeyPress(Key::ControlLeft | Key::ControlRight) => Some(InputEvent::ModifierDown),
        EventType::KeyRelease(Key::ControlLeft | Key::ControlRight) => Some(InputEvent::ModifierUp),
        EventType::KeyPress(Key::Escape) => Some(InputEvent::Exit),
        _ => None,
    }
}

impl EventSource for GlobalHook {
    fn start(&mut self, events: UnboundedSender<InputEvent>) -> Result<()> {
        self.stop.store(false, Ordering::SeqCst);
        let stop = Arc::clone(&self.stop);
        let on_failure = events.clone();

        thread::Builder::new()
            .name("input-hook".to_string())
            .spawn(move || {
                let mut position = cursor_reader().as_ref().and_then(cursor_location);
                let result = rdev::listen(move |event| {
                    if stop.load(Ordering::SeqCst) {
                        return;
                    }
                    if let Some(input) = translate_hook(&event.event_type, &mut position) {
                        let _ = events.send(input);
                    }
                });
                if let Err(e) = result {
                    error!(error = ?e, "Global input hook failed");
                    let _ = on_failure.send(InputEvent::Exit);
                }
            })?;

        debug!("Global input hook started");
        Ok(())
    }

    fn stop(&mut self) {
        // rdev cannot be unhooked; the listener stays installed but goes quiet
        self.stop.store(true, Ordering::SeqCst);
        debug!("Global input hook stopped");
    }
}

// RAII guard for terminal raw mode - only enables if stdout is a TTY
struct RawModeGuard {
    enabled: bool,
}

impl RawModeGuard {
    fn new() -> Result<Self> {
        let enabled = if std::io::stdout().is_terminal() {
            enable_raw_mode()?;
            true
        } else {
            false
        };
        Ok(RawModeGuard { enabled })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if self.enabled {
            let _ = disable_raw_mode();
        }
    }
}

/// The terminal window as a capture surface, via `crossterm` mouse reporting.
/// Terminal mouse events only trigger a capture; the recorded position is the
/// OS cursor's screen position at that moment.
#[derive(Default)]
pub struct TerminalSurface {
    stop: Arc<AtomicBool>,
    reader: Option<thread::JoinHandle<()>>,
    enhanced_keys: bool,
    raw_mode: Option<RawModeGuard>,
}

impl TerminalSurface {
    pub fn new() -> Self {
        Self::default()
    }
}

fn terminal_button(button: MouseButton) -> PointerButton {
    match button {
        MouseButton::Left => PointerButton::Left,
        MouseButton::Right => PointerButton::Right,
        MouseButton::Middle => PointerButton::Middle,
    }
}

fn translate_terminal(
    event: &Event,
    cursor: impl FnOnce() -> Option<(i32, i32)>,
) -> Option<InputEvent> {
    match event {
        Event::Mouse(MouseEvent { kind, .. }) => match kind {
            MouseEventKind::Down(button) => {
                let (x, y) = cursor()?;
                Some(InputEvent::ButtonDown {
                    x,
                    y,
                    button: terminal_button(*button),
                })
            }
            MouseEventKind::Up(button) => {
                let (x, y) = cursor()?;
                Some(InputEvent::ButtonUp {
                    x,
                    y,
                    button: terminal_button(*button),
                })
            }
            MouseEventKind::Drag(_) | MouseEventKind::Moved => {
                let (x, y) = cursor()?;
                Some(InputEvent::Move { x, y })
            }
            _ => None,
        },
        Event::Key(KeyEvent { code, kind, .. }) => match (code, kind) {
            (KeyCode::Esc | KeyCode::Char('q'), KeyEventKind::Press) => Some(InputEvent::Exit),
            (
                KeyCode::Modifier(ModifierKeyCode::LeftControl | ModifierKeyCode::RightControl),
                KeyEventKind::Press,
            ) => Some(InputEvent::ModifierDown),
            (
                KeyCode::Modifier(ModifierKeyCode::LeftControl | ModifierKeyCode::RightControl),
                KeyEventKind::Release,
            ) => Some(InputEvent::ModifierUp),
            _ => None,
        },
        _ => None,
    }
}

impl EventSource for TerminalSurface {
    fn start(&mut self, events: UnboundedSender<InputEvent>) -> Result<()> {
        self.raw_mode = Some(RawModeGuard::new()?);

        let mut stdout = std::io::stdout();
        execute!(stdout, EnableMouseCapture)?;
        // Modifier press/release is only reported with the enhanced keyboard protocol
        self.enhanced_keys = supports_keyboard_enhancement().unwrap_or(false);
        if self.enhanced_keys {
            execute!(
                stdout,
                PushKeyboardEnhancementFlags(
                    KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES
                        | KeyboardEnhancementFlags::REPORT_EVENT_TYPES
                        | KeyboardEnhancementFlags::REPORT_ALL_KEYS_AS_ESCAPE_CODES
                )
            )?;
        } else {
            info!("Terminal does not report modifier keys; move gestures are unavailable");
        }

        debug!("Terminal capture surface started");

        self.stop.store(false, Ordering::SeqCst);
        let stop = Arc::clone(&self.stop);
        let reader = thread::Builder::new()
            .name("terminal-input".to_string())
            .spawn(move || {
                let Some(enigo) = cursor_reader() else {
                    return;
                };
                while !stop.load(Ordering::SeqCst) {
                    match event::poll(Duration::from_millis(100)) {
                        Ok(false) => continue,
                        Ok(true) => {}
                        Err(e) => {
                            error!(error = %e, "Terminal input failed");
                            break;
                        }
                    }
                    let event = match event::read() {
                        Ok(event) => event,
                        Err(e) => {
                            error!(error = %e, "Terminal input failed");
                            break;
                        }
                    };
                    trace!(?event, "Terminal event");
                    if let Some(input) = translate_terminal(&event, || cursor_location(&enigo)) {
                        let exit = input == InputEvent::Exit;
                        if events.send(input).is_err() || exit {
                            break;
                        }
                    }
                }
            })?;
        self.reader = Some(reader);
        Ok(())
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }

        let mut stdout = std::io::stdout();
        if self.enhanced_keys {
            let _ = execute!(stdout, PopKeyboardEnhancementFlags);
            self.enhanced_keys = false;
        }
        let _ = execute!(stdout, DisableMouseCapture);
        self.raw_mode = None;
        debug!("Terminal capture surface stopped");
    }
}

impl Drop for TerminalSurface {
    fn drop(&mut self) {
        if self.raw_mode.is_some() {
            self.stop();
        }
    }
}

/// Renders capture feedback as text lines.
pub struct ConsoleView<W: Write> {
    out: W,
}

impl ConsoleView<std::io::Stderr> {
    pub fn stderr() -> Self {
        Self {
            out: std::io::stderr(),
        }
    }
}

impl<W: Write> ConsoleView<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    // Raw mode may be on, so lines end in \r\n
    fn line(&mut self, text: std::fmt::Arguments<'_>) {
        let _ = write!(self.out, "{text}\r\n");
        let _ = self.out.flush();
    }
}

impl<W: Write> CaptureView for ConsoleView<W> {
    fn marker_created(&mut self, number: usize, point: &ActionPoint) {
        self.line(format_args!("({number}) {} at {}, {}", point.kind, point.x, point.y));
    }

    fn marker_updated(&mut self, number: usize, point: &ActionPoint) {
        self.line(format_args!("({number}) -> {}", point.kind));
    }

    fn line_updated(&mut self, line: &TrajectoryLine) {
        trace!(?line, "Trajectory preview");
    }

    fn line_finished(&mut self, line: &TrajectoryLine) {
        self.line(format_args!(
            "    {:.0}, {:.0} ---> {:.0}, {:.0}",
            line.x1, line.y1, line.x2, line.y2
        ));
    }

    fn line_removed(&mut self) {}
}
