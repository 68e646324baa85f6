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
use std::error::Error;
use std::io;
use std::path::PathBuf;

use clap::{crate_version, Parser};
use tracing::info;
use tracing_subscriber::EnvFilter;

use midimachine::codec::{self, Channel};
use midimachine::midi;
use midimachine::preset::PresetStore;
use midimachine::session::{Devices, Session};
use midimachine::settings::Settings;
use midimachine::shell::{print_devices, select_device, Shell};

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A MIDI CC controller for hardware and software synths."
)]
struct Cli {
    /// Lists MIDI devices and exits.
    #[arg(short, long)]
    list: bool,

    /// The output device index. Prompts if not given here or in the settings.
    #[arg(short, long)]
    device: Option<usize>,

    /// The MIDI channel (1-16).
    #[arg(short, long, value_parser = clap::value_parser!(i64).range(1..=16))]
    channel: Option<i64>,

    /// Sends a single control change to this controller and exits.
    #[arg(long, requires = "value", value_parser = clap::value_parser!(u8).range(0..=127))]
    cc: Option<u8>,

    /// The control change value (0-127).
    #[arg(short, long, requires = "cc", value_parser = clap::value_parser!(u8).range(0..=127))]
    value: Option<u8>,

    /// The path to a settings file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Uses a mock MIDI backend that sends nowhere.
    #[arg(long)]
    mock: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    let backend = midi::get_backend(cli.mock);

    if cli.list {
        let devices = Devices {
            inputs: backend.list_inputs()?,
            outputs: backend.list_outputs()?,
        };
        print_devices(&mut io::stdout(), &devices)?;
        return Ok(());
    }

    let channel = match cli.channel {
        Some(channel) => Channel::new(channel)?,
        None => settings.channel()?,
    };
    let presets = PresetStore::new(settings.presets_dir());
    let device = cli.device.or(settings.device());

    if let (Some(cc), Some(value)) = (cli.cc, cli.value) {
        let device = device.ok_or("--cc requires a device (--device or the settings file)")?;
        let mut session = Session::new(backend, device, channel, presets);
        session.set_device(device)?;
        session.send_cc(cc, value)?;
        println!(
            "{} = {} on {} (channel {})",
            codec::controller_name(cc),
            value,
            session.device_name(),
            channel
        );
        return Ok(());
    }

    let mut stdin = io::stdin().lock();
    let mut stdout = io::stdout().lock();
    let device = match device {
        Some(device) => device,
        None => match select_device(&mut stdin, &mut stdout, &backend.list_outputs()?)? {
            Some(device) => device,
            None => return Ok(()),
        },
    };

    let mut session = Session::new(backend, device, channel, presets);
    session.set_device(device)?;
    info!(device, channel = channel.number(), "Starting shell.");

    let mut shell = Shell::new(
        session,
        stdin,
        stdout,
        settings.sweep_duration()?,
        settings.note_duration()?,
    );
    shell.run()?;

    Ok(())
}
