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

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use pointcast::controller::{InjectorFactory, SequenceController, Toggle};
use pointcast::injector::{EnigoInjector, PointerInjector};
use pointcast::input::{ConsoleView, EventSource, GlobalHook, TerminalSurface, record};
use pointcast::parser::{load_settings, save_settings};
use pointcast::playback::{RunEvent, RunOutcome};
use pointcast::types::{ActionKind, ActionPoint, PlaybackConfig};

#[derive(Parser)]
#[command(name = "pointcast", version, about = "Record pointer clicks and replay them")]
struct Cli {
    /// Settings file holding the sequence and playback configuration
    #[arg(short, long, default_value = "pointcast.clicks", global = true)]
    file: PathBuf,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture a new sequence. Esc finishes.
    Record {
        /// Capture inside this terminal instead of through the global hook
        #[arg(long, conflicts_with = "global")]
        local: bool,
        /// Capture through the global hook, letting clicks reach other windows
        #[arg(long)]
        global: bool,
    },
    /// Replay the sequence. Ctrl-C cancels.
    Run {
        #[command(flatten)]
        overrides: ConfigArgs,
        /// Ratio of physical to logical pixels on the primary display
        #[arg(long, default_value_t = 1.0, value_parser = parse_scale)]
        scale: f64,
    },
    /// Show the sequence and configuration
    List,
    /// Append a point
    Add {
        #[arg(allow_negative_numbers = true)]
        x: Option<i32>,
        #[arg(allow_negative_numbers = true)]
        y: Option<i32>,
        #[arg(long, default_value = "click")]
        kind: ActionKind,
    },
    /// Change a point (1-based index)
    Edit {
        index: usize,
        #[arg(allow_negative_numbers = true)]
        x: i32,
        #[arg(allow_negative_numbers = true)]
        y: i32,
        #[arg(long)]
        kind: Option<ActionKind>,
    },
    /// Remove a point (1-based index)
    Remove { index: usize },
    /// Remove every point
    Clear,
    /// Update and save the playback configuration
    Config {
        #[command(flatten)]
        values: ConfigArgs,
        /// Default capture source: true for the global hook
        #[arg(long)]
        interactive: Option<bool>,
    },
}

#[derive(Args)]
struct ConfigArgs {
    #[arg(long)]
    speed: Option<f64>,
    /// Hold time between press and release, in ms
    #[arg(long)]
    click_duration: Option<u64>,
    /// Pause after each action, in ms
    #[arg(long)]
    delay_action: Option<u64>,
    /// Pause after each pass over the sequence, in ms
    #[arg(long)]
    delay_pass: Option<u64>,
    /// Number of passes, 0 runs until cancelled
    #[arg(long)]
    repeat: Option<u64>,
    /// Seconds to count down before starting
    #[arg(long)]
    countdown: Option<u32>,
    /// Random variation of the delays, 0.0 to 1.0
    #[arg(long)]
    jitter: Option<f64>,
}

impl ConfigArgs {
    fn apply(&self, mut config: PlaybackConfig) -> PlaybackConfig {
        if let Some(speed) = self.speed {
            config.speed = speed;
        }
        if let Some(ms) = self.click_duration {
            config.click_duration_ms = ms;
        }
        if let Some(ms) = self.delay_action {
            config.delay_after_action_ms = ms;
        }
        if let Some(ms) = self.delay_pass {
            config.delay_after_pass_ms = ms;
        }
        if let Some(repeat) = self.repeat {
            config.repeat_count = repeat;
        }
        if let Some(countdown) = self.countdown {
            config.countdown = countdown;
        }
        if let Some(jitter) = self.jitter {
            config.jitter = jitter;
        }
        config
    }
}

fn parse_scale(s: &str) -> std::result::Result<f64, String> {
    let scale: f64 = s.parse().map_err(|_| format!("'{s}' is not a number"))?;
    if !scale.is_finite() || scale <= 0.0 {
        return Err(format!("scale must be a positive number, got {s}"));
    }
    Ok(scale)
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "pointcast=debug"
    } else {
        "pointcast=info"
    };
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .try_init();
}

fn injector_factory(scale: f64) -> InjectorFactory {
    Arc::new(move || {
        let injector = EnigoInjector::new((scale, scale))?;
        Ok(Box::new(injector) as Box<dyn PointerInjector>)
    })
}

fn print_sequence(controller: &SequenceController) {
    let config = controller.config();
    println!(
        "speed {}  click {}ms  after action {}ms  after pass {}ms  repeat {}  countdown {}s  jitter {}  {}",
        config.speed,
        config.click_duration_ms,
        config.delay_after_action_ms,
        config.delay_after_pass_ms,
        if config.repeat_count == 0 {
            "until cancelled".to_string()
        } else {
            config.repeat_count.to_string()
        },
        config.countdown,
        config.jitter,
        if config.interactive { "global capture" } else { "terminal capture" },
    );
    if controller.points().is_empty() {
        println!("(no points)");
    }
    for (i, point) in controller.points().iter().enumerate() {
        println!("{:>3}. {:<8} {:>6} {:>6}", i + 1, point.kind, point.x, point.y);
    }
}

// Converts a displayed 1-based index
fn position(index: usize) -> Result<usize> {
    if index == 0 {
        bail!("Points are numbered from 1");
    }
    Ok(index - 1)
}

async fn capture(controller: &mut SequenceController, local: bool) -> Result<()> {
    controller.begin_capture()?;

    let mut source: Box<dyn EventSource> = if local {
        eprintln!("Click in this terminal to record, hold Ctrl to record moves, Esc or q to finish");
        Box::new(TerminalSurface::new())
    } else {
        eprintln!("Click anywhere to record, hold Ctrl to record moves, Esc to finish");
        Box::new(GlobalHook::new())
    };

    let points = match record(source.as_mut(), ConsoleView::stderr()).await {
        Ok(points) => points,
        Err(e) => {
            controller.finish_capture(Vec::new())?;
            return Err(e).context("Capture failed");
        }
    };

    let count = points.len();
    if controller.finish_capture(points)? {
        eprintln!("Recorded {} points", count);
    } else {
        eprintln!("Nothing recorded, keeping the previous sequence");
    }
    Ok(())
}

enum Wake {
    Interrupt,
    Event(Option<RunEvent>),
}

async fn play(controller: &mut SequenceController) -> Result<()> {
    let (interrupt_tx, mut interrupt_rx) = mpsc::unbounded_channel();
    ctrlc::set_handler(move || {
        let _ = interrupt_tx.send(());
    })
    .context("Failed to install Ctrl-C handler")?;

    controller.run_or_cancel()?;
    eprintln!("Press Ctrl-C to cancel");

    loop {
        let wake = tokio::select! {
            Some(()) = interrupt_rx.recv() => Wake::Interrupt,
            event = controller.next_event() => Wake::Event(event),
        };

        match wake {
            Wake::Interrupt => {
                if controller.run_or_cancel()? == Toggle::Cancelling {
                    eprintln!("\nReceived Ctrl-C, stopping playback...");
                }
            }
            Wake::Event(Some(RunEvent::Countdown(remaining))) if remaining > 0 => {
                eprintln!("{}", controller.state());
            }
            Wake::Event(Some(RunEvent::Progress { pass, index })) => {
                debug!(pass, index, "Executing point");
            }
            Wake::Event(Some(RunEvent::Ended(outcome))) => {
                match outcome {
                    RunOutcome::Completed { passes } => {
                        eprintln!("Sequence finished after {} passes", passes)
                    }
                    RunOutcome::Cancelled { passes } => {
                        eprintln!("Cancelled after {} complete passes", passes)
                    }
                    RunOutcome::Failed { error, .. } => {
                        return Err(error).context("Playback failed");
                    }
                }
                return Ok(());
            }
            Wake::Event(Some(RunEvent::Countdown(_))) => {}
            Wake::Event(None) => return Ok(()),
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = load_settings(&cli.file)
        .with_context(|| format!("Failed to load {}", cli.file.display()))?;

    let scale = match &cli.command {
        Commands::Run { scale, .. } => *scale,
        _ => 1.0,
    };
    let mut controller = SequenceController::new(settings, injector_factory(scale));

    match cli.command {
        Commands::List => {
            print_sequence(&controller);
            return Ok(());
        }
        Commands::Run { overrides, .. } => {
            let config = overrides.apply(controller.config().clone());
            controller.set_config(config)?;
            return play(&mut controller).await;
        }
        Commands::Record { local, global } => {
            let local = local || (!global && !controller.config().interactive);
            capture(&mut controller, local).await?;
        }
        Commands::Add { x, y, kind } => {
            let index = controller.add_point()?;
            let point = ActionPoint::new(x.unwrap_or(0), y.unwrap_or(0), kind);
            controller.update_point(index, point)?;
        }
        Commands::Edit { index, x, y, kind } => {
            let index = position(index)?;
            let current = controller
                .points()
                .get(index)
                .copied()
                .with_context(|| format!("No point {}", index + 1))?;
            let kind = kind.unwrap_or(current.kind);
            controller.update_point(index, ActionPoint::new(x, y, kind))?;
        }
        Commands::Remove { index } => {
            controller.remove_point(position(index)?)?;
        }
        Commands::Clear => controller.clear()?,
        Commands::Config {
            values,
            interactive,
        } => {
            let mut config = values.apply(controller.config().clone());
            if let Some(interactive) = interactive {
                config.interactive = interactive;
            }
            controller.set_config(config)?;
        }
    }

    save_settings(&cli.file, &controller.settings())
        .with_context(|| format!("Failed to save {}", cli.file.display()))?;
    print_sequence(&controller);
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
