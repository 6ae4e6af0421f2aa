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

//! Core types for recorded pointer sequences

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Upper bound of the normalized pointer axis, independent of screen size.
pub const NORMALIZED_MAX: i32 = 65535;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActionKind {
    #[default]
    PressAndRelease,
    Press,
    Release,
    Move,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::PressAndRelease => "click",
            ActionKind::Press => "press",
            ActionKind::Release => "release",
            ActionKind::Move => "move",
        }
    }

    pub fn presses(self) -> bool {
        matches!(self, ActionKind::PressAndRelease | ActionKind::Press)
    }

    pub fn releases(self) -> bool {
        matches!(self, ActionKind::PressAndRelease | ActionKind::Release)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "click" => Ok(ActionKind::PressAndRelease),
            "press" | "push" => Ok(ActionKind::Press),
            "release" => Ok(ActionKind::Release),
            "move" => Ok(ActionKind::Move),
            other => Err(Error::InvalidConfig(format!("unknown action kind '{other}'"))),
        }
    }
}

/// A screen position plus what to do there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActionPoint {
    pub x: i32,
    pub y: i32,
    pub kind: ActionKind,
}

impl ActionPoint {
    pub fn new(x: i32, y: i32, kind: ActionKind) -> Self {
        Self { x, y, kind }
    }

    pub fn distance_to(&self, x: i32, y: i32) -> f64 {
        let dx = f64::from(x - self.x);
        let dy = f64::from(y - self.y);
        dx.hypot(dy)
    }

    pub fn distance(&self, other: &ActionPoint) -> f64 {
        self.distance_to(other.x, other.y)
    }

    /// Bearing in radians from this point toward `(x, y)`, measured from the +x axis.
    pub fn angle_to(&self, x: i32, y: i32) -> f64 {
        f64::from(y - self.y).atan2(f64::from(x - self.x))
    }
}

impl fmt::Display for ActionPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.kind, self.x, self.y)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackConfig {
    // Pointer travel rate divisor; larger is faster
    pub speed: f64,
    // Hold time between press and release
    pub click_duration_ms: u64,
    pub delay_after_action_ms: u64,
    pub delay_after_pass_ms: u64,
    // 0 repeats until cancelled
    pub repeat_count: u64,
    // Seconds counted down before the first action
    pub countdown: u32,
    // Jitter as a fraction (0.0 to 1.0) of the configured delays
    pub jitter: f64,
    // Capture through the global hook instead of the terminal surface
    pub interactive: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            speed: 0.6,
            click_duration_ms: 0,
            delay_after_action_ms: 0,
            delay_after_pass_ms: 0,
            repeat_count: 0,
            countdown: 3,
            jitter: 0.0,
            interactive: true,
        }
    }
}

impl PlaybackConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.speed.is_finite() || self.speed <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "speed must be a positive number, got {}",
                self.speed
            )));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(Error::InvalidConfig(format!(
                "jitter must be between 0.0 and 1.0, got {}",
                self.jitter
            )));
        }
        Ok(())
    }
}

/// Everything persisted between sessions: the sequence and its playback configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    pub points: Vec<ActionPoint>,
    pub config: PlaybackConfig,
}

/// Size of the primary display plus the OS scale applied to reported cursor positions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayGeometry {
    pub width: i32,
    pub height: i32,
    pub scale_x: f64,
    pub scale_y: f64,
}

impl DisplayGeometry {
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            width,
            height,
            scale_x: 1.0,
            scale_y: 1.0,
        }
    }

    /// Maps screen pixels onto the normalized axis. Off-screen positions are
    /// pinned to the nearest display edge.
    pub fn normalize(&self, x: i32, y: i32) -> NormalizedPoint {
        NormalizedPoint {
            x: to_axis(scale_axis(i64::from(x), i64::from(NORMALIZED_MAX), self.width)),
            y: to_axis(scale_axis(i64::from(y), i64::from(NORMALIZED_MAX), self.height)),
        }
    }

    /// Normalizes a position reported by the OS, undoing the display scale first.
    pub fn normalize_reported(&self, x: i32, y: i32) -> NormalizedPoint {
        let x = (f64::from(x) / self.scale_x) as i32;
        let y = (f64::from(y) / self.scale_y) as i32;
        self.normalize(x, y)
    }

    pub fn denormalize(&self, point: NormalizedPoint) -> (i32, i32) {
        (
            to_pixel(scale_axis(i64::from(point.x), i64::from(self.width), NORMALIZED_MAX)),
            to_pixel(scale_axis(i64::from(point.y), i64::from(self.height), NORMALIZED_MAX)),
        )
    }
}

fn scale_axis(value: i64, numerator: i64, denominator: i32) -> i64 {
    if denominator <= 0 {
        return 0;
    }
    value * numerator / i64::from(denominator)
}

fn to_axis(value: i64) -> i32 {
    value.clamp(0, i64::from(NORMALIZED_MAX)) as i32
}

fn to_pixel(value: i64) -> i32 {
    i32::try_from(value).unwrap_or(if value < 0 { i32::MIN } else { i32::MAX })
}

/// A position on the fixed 0..=65535 axis used when commanding pointer movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NormalizedPoint {
    pub x: i32,
    pub y: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_point_is_click_at_origin() {
        let point = ActionPoint::default();
        assert_eq!(point, ActionPoint::new(0, 0, ActionKind::PressAndRelease));
    }

    #[test]
    fn test_clone_is_unlinked() {
        let original = ActionPoint::new(10, 20, ActionKind::Press);
        let mut copy = original.clone();
        assert_eq!(copy, original);

        copy.x = 99;
        copy.kind = ActionKind::Move;
        assert_eq!(original.x, 10);
        assert_eq!(original.kind, ActionKind::Press);
    }

    #[test]
    fn test_distance() {
        let a = ActionPoint::new(50, 50, ActionKind::Press);
        assert_eq!(a.distance_to(80, 50), 30.0);
        assert!((a.distance_to(52, 51) - 5f64.sqrt()).abs() < 1e-9);
        assert_eq!(a.distance(&ActionPoint::new(53, 54, ActionKind::Move)), 5.0);
    }

    #[test]
    fn test_angle_to() {
        let a = ActionPoint::new(0, 0, ActionKind::Move);
        assert_eq!(a.angle_to(10, 0), 0.0);
        assert!((a.angle_to(0, 10) - std::f64::consts::FRAC_PI_2).abs() < 1e-9);
        assert!((a.angle_to(-10, 0) - std::f64::consts::PI).abs() < 1e-9);
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!("click".parse::<ActionKind>().unwrap(), ActionKind::PressAndRelease);
        assert_eq!("push".parse::<ActionKind>().unwrap(), ActionKind::Press);
        assert!("drag".parse::<ActionKind>().is_err());
    }

    #[test]
    fn test_config_validation() {
        assert!(PlaybackConfig::default().validate().is_ok());

        let zero_speed = PlaybackConfig {
            speed: 0.0,
            ..PlaybackConfig::default()
        };
        assert!(matches!(zero_speed.validate(), Err(Error::InvalidConfig(_))));

        let bad_jitter = PlaybackConfig {
            jitter: 1.5,
            ..PlaybackConfig::default()
        };
        assert!(bad_jitter.validate().is_err());
    }

    #[test]
    fn test_normalize() {
        let display = DisplayGeometry::new(1920, 1080);
        assert_eq!(display.normalize(0, 0), NormalizedPoint { x: 0, y: 0 });
        assert_eq!(
            display.normalize(1920, 1080),
            NormalizedPoint {
                x: NORMALIZED_MAX,
                y: NORMALIZED_MAX
            }
        );
        assert_eq!(display.normalize(960, 540), NormalizedPoint { x: 32767, y: 32767 });
    }

    #[test]
    fn test_normalize_reported_undoes_scale() {
        let display = DisplayGeometry {
            scale_x: 2.0,
            scale_y: 2.0,
            ..DisplayGeometry::new(1000, 1000)
        };
        assert_eq!(display.normalize_reported(1000, 500), display.normalize(500, 250));
    }

    #[test]
    fn test_normalize_pins_off_screen_points_to_edges() {
        let display = DisplayGeometry::new(1920, 1080);
        assert_eq!(
            display.normalize(100_000_000, 540),
            NormalizedPoint {
                x: NORMALIZED_MAX,
                y: 32767
            }
        );
        assert_eq!(display.normalize(i32::MIN, i32::MAX), NormalizedPoint { x: 0, y: NORMALIZED_MAX });
        assert_eq!(display.normalize(-5, 2000), NormalizedPoint { x: 0, y: NORMALIZED_MAX });
    }

    #[test]
    fn test_denormalize() {
        let display = DisplayGeometry::new(1920, 1080);
        assert_eq!(display.denormalize(NormalizedPoint { x: 0, y: 0 }), (0, 0));
        assert_eq!(
            display.denormalize(NormalizedPoint {
                x: NORMALIZED_MAX,
                y: NORMALIZED_MAX
            }),
            (1920, 1080)
        );
    }
}
