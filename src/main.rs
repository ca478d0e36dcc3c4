// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
mod audio;
mod bank;
mod config;
mod dispatch;
mod engine;
#[cfg(test)]
mod testutil;
mod zones;

use std::error::Error;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{crate_version, Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::warn;

use audio::{Device as _, Output as _};
use bank::{LoadEvent, SoundBank};
use dispatch::{InputDispatcher, RawInput};
use engine::PlaybackEngine;
use zones::ZoneRegistry;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A low-latency pad instrument."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Verifies an instrument configuration file.
    Verify {
        /// The path to the instrument config.
        config: String,
    },
    /// Starts the instrument on the terminal.
    Start {
        /// The path to the instrument config.
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Verify { config } => {
            let instrument = config::Instrument::parse(&PathBuf::from(&config))?;
            let problems = instrument.verify();
            if !problems.is_empty() {
                return Err(config::ConfigError::Invalid(problems).into());
            }

            println!("Zones (count: {}):", instrument.zones().len());
            for zone in instrument.zones() {
                println!(
                    "- {} ({}): sound={} keys=[{}]",
                    zone.id(),
                    zone.name(),
                    zone.sound(),
                    zone.keys().join(", "),
                );
            }
        }
        Commands::Start { config } => {
            start(&PathBuf::from(config)).await?;
        }
    }

    Ok(())
}

/// Wires up the instrument and runs the terminal shell until quit.
async fn start(config_path: &Path) -> Result<(), Box<dyn Error>> {
    let instrument = config::Instrument::parse(config_path)?;
    let problems = instrument.verify();
    if !problems.is_empty() {
        return Err(config::ConfigError::Invalid(problems).into());
    }

    let device = audio::get_device(instrument.audio())?;
    let output = device.open(instrument.audio())?;

    // Preload every sound before accepting input, rendering progress as the
    // assets settle.
    let bank = Arc::new(SoundBank::new(output.sample_rate()));
    let (load_tx, mut load_rx) = mpsc::channel(32);
    let progress = tokio::spawn(async move {
        while let Some(event) = load_rx.recv().await {
            match event {
                LoadEvent::Started { total } => println!("Loading {} sounds...", total),
                LoadEvent::Progress { settled, total } => println!("  {}/{}", settled, total),
                LoadEvent::AssetFailed { path, cause } => {
                    eprintln!("  could not load {}: {}", path.display(), cause)
                }
                LoadEvent::Settled { loaded, failed } => {
                    println!("Sounds ready ({} loaded, {} failed).", loaded, failed)
                }
            }
        }
    });
    let summary = bank
        .preload_all(instrument.sound_paths(), Some(load_tx))
        .await;
    progress.await?;
    if summary.loaded == 0 {
        warn!("No sounds loaded; the instrument will be silent.");
    }

    let registry = Arc::new(ZoneRegistry::new(instrument.build_zones())?);
    let mut pulses = registry
        .take_pulses()
        .ok_or("activation pulses already consumed")?;
    tokio::spawn(async move {
        // Terminal stand-in for the zone flash: print and let the pulse
        // duration pass.
        while let Some(pulse) = pulses.recv().await {
            println!("* {}", pulse.zone_id);
            tokio::time::sleep(pulse.duration).await;
        }
    });

    let engine = Arc::new(PlaybackEngine::new(output, bank));
    let dispatcher = InputDispatcher::new(registry.clone(), engine, instrument.spatial_volume());

    println!("Zones:");
    for zone in registry.zones() {
        println!(
            "- {} [{}]",
            zone.display_name(),
            registry.bindings_for(zone.id()).join(", ")
        );
    }
    println!("Press a bound key and enter, or: tap X Y | touch X Y | hint ID | focus on/off | quit");

    let (input_tx, mut input_rx) = mpsc::channel::<ShellCommand>(1);
    let reader = tokio::task::spawn_blocking(move || monitor_io(&input_tx, io::stdin().lock()));

    // Each command is processed to completion before the next is dequeued.
    while let Some(command) = input_rx.recv().await {
        match command {
            ShellCommand::Input(input) => {
                dispatcher.handle(input).await;
            }
            ShellCommand::Focus(has_focus) => dispatcher.set_focus(has_focus),
            ShellCommand::Quit => break,
        }
    }

    reader.await??;
    Ok(())
}

/// A line of terminal input, parsed.
#[derive(Debug, PartialEq)]
enum ShellCommand {
    Input(RawInput),
    Focus(bool),
    Quit,
}

/// Reads shell commands from the given reader until quit or EOF.
fn monitor_io<R>(input_tx: &mpsc::Sender<ShellCommand>, reader: R) -> Result<(), io::Error>
where
    R: BufRead,
{
    for line in reader.lines() {
        let line = line?;
        match parse_shell_line(&line) {
            Some(command) => {
                let quit = command == ShellCommand::Quit;
                if input_tx.blocking_send(command).is_err() || quit {
                    break;
                }
            }
            None => {
                if !line.trim().is_empty() {
                    warn!(line = %line, "Unrecognized input");
                }
            }
        }
    }
    Ok(())
}

/// Parses one terminal line into a shell command. Single characters are key
/// presses; "tap X Y" and "touch X Y" are surface presses in percent
/// coordinates; "hint ID" presses a key-hint element.
fn parse_shell_line(line: &str) -> Option<ShellCommand> {
    let mut parts = line.trim().split_whitespace();
    let head = parts.next()?;

    match head.to_lowercase().as_str() {
        "quit" | "exit" => Some(ShellCommand::Quit),
        "focus" => match parts.next() {
            Some("on") => Some(ShellCommand::Focus(true)),
            Some("off") => Some(ShellCommand::Focus(false)),
            _ => None,
        },
        "tap" | "touch" => {
            let x: f32 = parts.next()?.parse().ok()?;
            let y: f32 = parts.next()?.parse().ok()?;
            Some(ShellCommand::Input(RawInput::PointerDown {
                x,
                y,
                touch: head.eq_ignore_ascii_case("touch"),
            }))
        }
        "hint" => Some(ShellCommand::Input(RawInput::ElementDown {
            element_id: parts.next()?.to_string(),
            touch: false,
        })),
        "shift" => Some(ShellCommand::Input(RawInput::KeyDown {
            key: "Shift".to_string(),
            code: "ShiftLeft".to_string(),
            ctrl: false,
            alt: false,
            meta: false,
        })),
        key if key.chars().count() == 1 => {
            let c = key.chars().next()?;
            Some(ShellCommand::Input(RawInput::KeyDown {
                key: c.to_string(),
                code: format!("Key{}", c.to_uppercase()),
                ctrl: false,
                alt: false,
                meta: false,
            }))
        }
        _ => None,
    }
}
