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

//! Settings file parser for pointcast
//!
//! Parses settings files with the format:
//! - @ directives (speed, click-duration, delay-action, delay-pass, repeat,
//!   countdown, jitter, interactive)
//! - # comments
//! - point lines: `click|press|release|move X Y`

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, not_line_ending, space0, space1},
    combinator::{map, value},
};
use std::fmt::Write as _;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{ActionKind, ActionPoint, PlaybackConfig, Settings};

#[derive(Debug, Clone, PartialEq)]
enum Directive {
    Speed(f64),
    ClickDuration(u64),
    DelayAfterAction(u64),
    DelayAfterPass(u64),
    Repeat(u64),
    Countdown(u32),
    Jitter(f64),
    Interactive(bool),
}

#[derive(Debug, Clone, PartialEq)]
enum Entry {
    Directive(Directive),
    Point(ActionPoint),
}

fn directive<'a>(input: &'a str, name: &str) -> IResult<&'a str, ()> {
    let (input, _) = tag("@")(input)?;
    let (input, _) = space0(input)?;
    let (input, _) = tag(name)(input)?;
    let (input, _) = char(':')(input)?;
    let (input, _) = space0(input)?;
    Ok((input, ()))
}

fn parse_speed(input: &str) -> IResult<&str, Directive> {
    let (input, _) = directive(input, "speed")?;
    let (input, value) = nom::number::complete::double(input)?;
    Ok((input, Directive::Speed(value)))
}

fn parse_click_duration(input: &str) -> IResult<&str, Directive> {
    let (input, _) = directive(input, "click-duration")?;
    let (input, value) = nom::character::complete::u64(input)?;
    Ok((input, Directive::ClickDuration(value)))
}

fn parse_delay_action(input: &str) -> IResult<&str, Directive> {
    let (input, _) = directive(input, "delay-action")?;
    let (input, value) = nom::character::complete::u64(input)?;
    Ok((input, Directive::DelayAfterAction(value)))
}

fn parse_delay_pass(input: &str) -> IResult<&str, Directive> {
    let (input, _) = directive(input, "delay-pass")?;
    let (input, value) = nom::character::complete::u64(input)?;
    Ok((input, Directive::DelayAfterPass(value)))
}

fn parse_repeat(input: &str) -> IResult<&str, Directive> {
    let (input, _) = directive(input, "repeat")?;
    let (input, value) = nom::character::complete::u64(input)?;
    Ok((input, Directive::Repeat(value)))
}

fn parse_countdown(input: &str) -> IResult<&str, Directive> {
    let (input, _) = directive(input, "countdown")?;
    let (input, value) = nom::character::complete::u32(input)?;
    Ok((input, Directive::Countdown(value)))
}

fn parse_jitter(input: &str) -> IResult<&str, Directive> {
    let (input, _) = directive(input, "jitter")?;
    let (input, value) = nom::number::complete::double(input)?;
    Ok((input, Directive::Jitter(value)))
}

fn parse_interactive(input: &str) -> IResult<&str, Directive> {
    let (input, _) = directive(input, "interactive")?;
    let (input, value) = alt((value(true, tag("true")), value(false, tag("false")))).parse(input)?;
    Ok((input, Directive::Interactive(value)))
}

fn parse_directive(input: &str) -> IResult<&str, Directive> {
    alt((
        parse_speed,
        parse_click_duration,
        parse_delay_action,
        parse_delay_pass,
        parse_repeat,
        parse_countdown,
        parse_jitter,
        parse_interactive,
    ))
    .parse(input)
}

fn parse_comment(input: &str) -> IResult<&str, ()> {
    let (input, _) = char('#')(input)?;
    let (input, _) = not_line_ending(input)?;
    Ok((input, ()))
}

fn parse_kind(input: &str) -> IResult<&str, ActionKind> {
    alt((
        value(ActionKind::PressAndRelease, tag("click")),
        value(ActionKind::Press, tag("press")),
        value(ActionKind::Press, tag("push")),
        value(ActionKind::Release, tag("release")),
        value(ActionKind::Move, tag("move")),
    ))
    .parse(input)
}

fn parse_point(input: &str) -> IResult<&str, ActionPoint> {
    let (input, kind) = parse_kind(input)?;
    let (input, _) = space1(input)?;
    let (input, x) = nom::character::complete::i32(input)?;
    let (input, _) = space1(input)?;
    let (input, y) = nom::character::complete::i32(input)?;
    Ok((input, ActionPoint::new(x, y, kind)))
}

fn parse_line(input: &str) -> IResult<&str, Option<Entry>> {
    alt((
        map(parse_directive, |d| Some(Entry::Directive(d))),
        value(None, parse_comment),
        map(parse_point, |p| Some(Entry::Point(p))),
    ))
    .parse(input)
}

fn apply(settings: &mut Settings, entry: Entry) {
    let config = &mut settings.config;
    match entry {
        Entry::Point(point) => settings.points.push(point),
        Entry::Directive(Directive::Speed(v)) => config.speed = v,
        Entry::Directive(Directive::ClickDuration(v)) => config.click_duration_ms = v,
        Entry::Directive(Directive::DelayAfterAction(v)) => config.delay_after_action_ms = v,
        Entry::Directive(Directive::DelayAfterPass(v)) => config.delay_after_pass_ms = v,
        Entry::Directive(Directive::Repeat(v)) => config.repeat_count = v,
        Entry::Directive(Directive::Countdown(v)) => config.countdown = v,
        Entry::Directive(Directive::Jitter(v)) => config.jitter = v,
        Entry::Directive(Directive::Interactive(v)) => config.interactive = v,
    }
}

pub fn parse_settings(input: &str) -> Result<Settings> {
    let mut settings = Settings::default();

    for (line_num, line) in input.lines().enumerate() {
        let trimmed = line.trim();

        if trimmed.is_empty() {
            continue;
        }

        match parse_line(trimmed) {
            Ok((remaining, Some(entry))) => {
                if !remaining.trim().is_empty() {
                    return Err(Error::Parse {
                        line: line_num + 1,
                        message: format!("Unexpected text after entry: '{}'", remaining),
                    });
                }
                apply(&mut settings, entry);
            }
            Ok((_, None)) => {}
            Err(e) => {
                return Err(Error::Parse {
                    line: line_num + 1,
                    message: format!("Parse error: {}", e),
                });
            }
        }
    }

    settings.config.validate()?;
    Ok(settings)
}

pub fn render_settings(settings: &Settings) -> String {
    let PlaybackConfig {
        speed,
        click_duration_ms,
        delay_after_action_ms,
        delay_after_pass_ms,
        repeat_count,
        countdown,
        jitter,
        interactive,
    } = &settings.config;

    let mut out = String::from("# pointcast settings\n");
    let _ = writeln!(out, "@ speed:{speed}");
    let _ = writeln!(out, "@ click-duration:{click_duration_ms}");
    let _ = writeln!(out, "@ delay-action:{delay_after_action_ms}");
    let _ = writeln!(out, "@ delay-pass:{delay_after_pass_ms}");
    let _ = writeln!(out, "@ repeat:{repeat_count}");
    let _ = writeln!(out, "@ countdown:{countdown}");
    let _ = writeln!(out, "@ jitter:{jitter}");
    let _ = writeln!(out, "@ interactive:{interactive}");
    for point in &settings.points {
        let _ = writeln!(out, "{point}");
    }
    out
}

/// Reads settings from `path`. A missing file yields the defaults.
pub fn load_settings(path: &Path) -> Result<Settings> {
    match fs::read_to_string(path) {
        Ok(text) => {
            let settings = parse_settings(&text)?;
            debug!(path = %path.display(), points = settings.points.len(), "Loaded settings");
            Ok(settings)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "No settings file, using defaults");
            Ok(Settings::default())
        }
        Err(e) => Err(e.into()),
    }
}

pub fn save_settings(path: &Path, settings: &Settings) -> Result<()> {
    fs::write(path, render_settings(settings))?;
    debug!(path = %path.display(), points = settings.points.len(), "Saved settings");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_speed() {
        let input = "@ speed:0.2";
        let result = parse_speed(input);
        assert!(result.is_ok());
        let (_, directive) = result.unwrap();
        assert_eq!(directive, Directive::Speed(0.2));
    }

    #[test]
    fn test_parse_delays() {
        let (_, directive) = parse_directive("@ delay-action:150").unwrap();
        assert_eq!(directive, Directive::DelayAfterAction(150));

        let (_, directive) = parse_directive("@delay-pass: 2000").unwrap();
        assert_eq!(directive, Directive::DelayAfterPass(2000));
    }

    #[test]
    fn test_parse_interactive() {
        let (_, directive) = parse_interactive("@ interactive:false").unwrap();
        assert_eq!(directive, Directive::Interactive(false));
    }

    #[test]
    fn test_parse_point() {
        let (_, point) = parse_point("release 300 -20").unwrap();
        assert_eq!(point, ActionPoint::new(300, -20, ActionKind::Release));

        let (_, point) = parse_point("push 1 2").unwrap();
        assert_eq!(point.kind, ActionKind::Press);
    }

    #[test]
    fn test_parse_settings() {
        let input = r#"# recorded on the office monitor
@ speed:1.5
@ click-duration:50
@ repeat:3
@ countdown:0

click 100 200
press 100 200
release 300 200
move 400 400
"#;
        let settings = parse_settings(input).unwrap();
        assert_eq!(settings.config.speed, 1.5);
        assert_eq!(settings.config.click_duration_ms, 50);
        assert_eq!(settings.config.repeat_count, 3);
        assert_eq!(settings.config.countdown, 0);
        // Unset directives keep their defaults
        assert_eq!(settings.config.delay_after_pass_ms, 0);
        assert!(settings.config.interactive);
        assert_eq!(
            settings.points,
            vec![
                ActionPoint::new(100, 200, ActionKind::PressAndRelease),
                ActionPoint::new(100, 200, ActionKind::Press),
                ActionPoint::new(300, 200, ActionKind::Release),
                ActionPoint::new(400, 400, ActionKind::Move),
            ]
        );
    }

    #[test]
    fn test_negative_repeat_is_rejected() {
        let result = parse_settings("@ repeat:-1\n");
        assert!(matches!(result, Err(Error::Parse { line: 1, .. })));
    }

    #[test]
    fn test_trailing_text_is_rejected() {
        let result = parse_settings("click 1 2\nclick 3 4 extra\n");
        assert!(matches!(result, Err(Error::Parse { line: 2, .. })));
    }

    #[test]
    fn test_zero_speed_is_rejected() {
        let result = parse_settings("@ speed:0\n");
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_render_then_parse_keeps_settings() {
        let settings = Settings {
            points: vec![
                ActionPoint::new(5, 6, ActionKind::Press),
                ActionPoint::new(50, 60, ActionKind::Release),
            ],
            config: PlaybackConfig {
                speed: 0.75,
                jitter: 0.25,
                repeat_count: 10,
                interactive: false,
                ..PlaybackConfig::default()
            },
        };
        let text = render_settings(&settings);
        assert!(text.contains("press 5 6\n"));
        assert_eq!(parse_settings(&text).unwrap(), settings);
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings(&dir.path().join("absent.clicks")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seq.clicks");
        let settings = Settings {
            points: vec![ActionPoint::new(1, 1, ActionKind::Move)],
            config: PlaybackConfig::default(),
        };

        save_settings(&path, &settings).unwrap();
        assert_eq!(load_settings(&path).unwrap(), settings);
    }
}
