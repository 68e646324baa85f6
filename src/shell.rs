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
use std::{
    io::{self, BufRead, Write},
    path::Path,
    time::Duration,
};

use tracing::{info, span, warn, Level};

use crate::{
    codec::{self, Channel},
    error::{Error, ParseError, Result},
    script::{operand, parse_duration, parse_float, parse_int, ScriptEvent},
    session::{Devices, Session},
    sweep::Sweep,
};

const HELP: &str = r#"
MIDIMACHINE COMMANDS

  BASIC:
    cc <cc#> <value>           Send Control Change
    note <note> <vel> [dur]    Send Note
    pc <program>               Program Change
    bend <0-16383>             Pitch Bend (8192=center)

  SHORTCUTS:
    cutoff/resonance/attack/release/volume/pan/mod <0-127>

  ADVANCED:
    nrpn <param> <value>       Non-Registered Parameter (14-bit)
    rpn <param> <value>        Registered Parameter
    sysex <F0 xx xx ... F7>    System Exclusive (hex bytes)

  PRESETS:
    save <name>                Save current CC values
    load <name>                Load and apply preset
    presets                    List saved presets

  AUTOMATION:
    lfo <cc> <min> <max> <hz>  Start LFO modulation
    lfo stop                   Stop LFO
    sweep <cc> <start> <end> [dur]  Sweep CC (default 2 seconds)
    script <file.txt>          Run command script

  SYSTEM:
    device [index]             Change MIDI device
    channel <1-16>             Set MIDI channel
    list                       List MIDI devices
    panic                      All Notes Off + Reset
    help                       This help
    quit                       Exit
"#;

/// Shorthand commands for common controllers.
fn shortcut(action: &str) -> Option<u8> {
    match action {
        "cutoff" | "brightness" => Some(74),
        "resonance" => Some(71),
        "attack" => Some(73),
        "release" => Some(72),
        "volume" => Some(7),
        "pan" => Some(10),
        "mod" => Some(1),
        _ => None,
    }
}

/// Whether the shell should keep reading commands.
#[derive(Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Writes the device listing.
pub fn print_devices<W: Write>(writer: &mut W, devices: &Devices) -> io::Result<()> {
    writeln!(writer, "\nINPUT:")?;
    print_device_list(writer, &devices.inputs)?;
    writeln!(writer, "\nOUTPUT:")?;
    print_device_list(writer, &devices.outputs)?;
    writeln!(writer)
}

fn print_device_list<W: Write>(writer: &mut W, names: &[String]) -> io::Result<()> {
    if names.is_empty() {
        return writeln!(writer, "   (none)");
    }
    for (i, name) in names.iter().enumerate() {
        writeln!(writer, "   [{}] {}", i, name)?;
    }
    Ok(())
}

/// Prompts for an output device until a valid index is entered. Returns None
/// on end of input or if there are no outputs.
pub fn select_device<R: BufRead, W: Write>(
    reader: &mut R,
    writer: &mut W,
    outputs: &[String],
) -> io::Result<Option<usize>> {
    if outputs.is_empty() {
        writeln!(writer, "No MIDI output devices found!")?;
        return Ok(None);
    }

    writeln!(writer, "\nOUTPUT DEVICES:")?;
    print_device_list(writer, outputs)?;

    loop {
        write!(writer, "\nSelect device [0]: ")?;
        writer.flush()?;

        let mut input = String::new();
        if reader.read_line(&mut input)? == 0 {
            return Ok(None);
        }
        let choice = match input.trim() {
            "" => "0",
            choice => choice,
        };
        match choice.parse::<usize>() {
            Ok(index) if index < outputs.len() => return Ok(Some(index)),
            Ok(_) => writeln!(writer, "Enter 0-{}", outputs.len() - 1)?,
            Err(_) => writeln!(writer, "Enter a number")?,
        }
    }
}

/// The interactive command shell.
pub struct Shell<R: BufRead, W: Write> {
    session: Session,
    reader: R,
    writer: W,
    sweep_duration: Duration,
    note_duration: Duration,
}

impl<R: BufRead, W: Write> Shell<R, W> {
    pub fn new(
        session: Session,
        reader: R,
        writer: W,
        sweep_duration: Duration,
        note_duration: Duration,
    ) -> Shell<R, W> {
        Shell {
            session,
            reader,
            writer,
            sweep_duration,
            note_duration,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    /// Reads and executes commands until `quit` or end of input. Any running
    /// LFO is stopped before returning.
    pub fn run(&mut self) -> io::Result<()> {
        let span = span!(Level::INFO, "shell");
        let _enter = span.enter();

        writeln!(self.writer, "\nMIDImachine - MIDI CC Controller")?;
        writeln!(self.writer, "Type 'help' for commands\n")?;
        writeln!(self.writer, "{}", self.session.device_name())?;
        writeln!(self.writer, "Channel {}\n", self.session.channel())?;

        loop {
            write!(self.writer, "midi[ch{}]> ", self.session.channel())?;
            self.writer.flush()?;

            let mut input = String::new();
            if self.reader.read_line(&mut input)? == 0 {
                writeln!(self.writer)?;
                self.shutdown()?;
                return Ok(());
            }

            if self.handle(&input)? == Flow::Quit {
                return Ok(());
            }
        }
    }

    /// Executes a single command line. Errors are reported to the writer and
    /// never end the shell; only writer failures are returned.
    pub fn handle(&mut self, line: &str) -> io::Result<Flow> {
        if let Some(e) = self.session.reap_lfo() {
            writeln!(self.writer, "LFO stopped: {}", e)?;
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            return Ok(Flow::Continue);
        }

        match self.dispatch(&tokens) {
            Ok(flow) => Ok(flow),
            Err(Error::Io(e)) if e.kind() == io::ErrorKind::BrokenPipe => Err(e),
            Err(e) => {
                if e.is_recoverable() {
                    info!(err = e.to_string(), "Command rejected.");
                } else {
                    warn!(err = e.to_string(), "Command failed.");
                }
                writeln!(self.writer, "Error: {}", e)?;
                Ok(Flow::Continue)
            }
        }
    }

    fn shutdown(&mut self) -> io::Result<()> {
        match self.session.close() {
            Ok(_) => writeln!(self.writer, "Goodbye!"),
            Err(e) => writeln!(self.writer, "Error stopping LFO: {}", e),
        }
    }

    fn dispatch(&mut self, tokens: &[&str]) -> Result<Flow> {
        let action = tokens[0].to_lowercase();
        let action = action.as_str();
        let int = |index: usize, name: &'static str| -> std::result::Result<i64, ParseError> {
            parse_int(operand(tokens, index, action, name)?)
        };

        if let Some(controller) = shortcut(action) {
            let value = int(1, "value")?.clamp(0, 127) as u8;
            self.session.send_cc(controller, value)?;
            writeln!(self.writer, "{} = {}", codec::controller_name(controller), value)?;
            return Ok(Flow::Continue);
        }

        match action {
            "quit" | "exit" | "q" => {
                self.shutdown()?;
                return Ok(Flow::Quit);
            }
            "help" => writeln!(self.writer, "{}", HELP)?,
            "list" => print_devices(&mut self.writer, &self.session.list_devices()?)?,
            "device" => {
                if let Some(params) = self.session.stop_lfo()? {
                    writeln!(self.writer, "LFO stopped: {}", params)?;
                }
                let device = match tokens.get(1) {
                    Some(token) => Some(
                        token
                            .parse::<usize>()
                            .map_err(|_| ParseError::InvalidInteger(token.to_string()))?,
                    ),
                    None => {
                        let outputs = self.session.list_devices()?.outputs;
                        select_device(&mut self.reader, &mut self.writer, &outputs)?
                    }
                };
                if let Some(device) = device {
                    self.session.set_device(device)?;
                    writeln!(self.writer, "{}", self.session.device_name())?;
                }
            }
            "channel" => {
                let channel = Channel::new(int(1, "channel")?)?;
                self.session.set_channel(channel);
                writeln!(self.writer, "Channel {}", channel)?;
            }
            "cc" => {
                let controller = int(1, "controller")? as u8;
                let value = int(2, "value")?.clamp(0, 127) as u8;
                self.session.send_cc(controller, value)?;
                writeln!(
                    self.writer,
                    "{} = {}",
                    codec::controller_name(controller & 0x7F),
                    value
                )?;
            }
            "note" => {
                let note = int(1, "note")? as u8;
                let velocity = int(2, "velocity")? as u8;
                let duration = match tokens.get(3) {
                    Some(token) => parse_duration(token)?,
                    None => self.note_duration,
                };
                self.session.note(note, velocity, duration)?;
                writeln!(self.writer, "Note {} vel={}", note, velocity)?;
            }
            "pc" => {
                let program = int(1, "program")? as u8;
                self.session.program_change(program)?;
                writeln!(self.writer, "Program = {}", program)?;
            }
            "bend" => {
                let value = int(1, "value")?.clamp(0, 16383) as u16;
                self.session.pitch_bend(value)?;
                writeln!(self.writer, "Pitch Bend = {}", value)?;
            }
            "nrpn" | "rpn" => {
                let param = int(1, "parameter")? as u16;
                let value = int(2, "value")? as u16;
                if action == "nrpn" {
                    self.session.nrpn(param, value)?;
                } else {
                    self.session.rpn(param, value)?;
                }
                writeln!(
                    self.writer,
                    "{} {} = {}",
                    action.to_uppercase(),
                    param,
                    value
                )?;
            }
            "sysex" => {
                operand(tokens, 1, action, "data")?;
                let data = codec::parse_hex(&tokens[1..].join(" "))?;
                let sent = self.session.sysex(&data)?;
                writeln!(self.writer, "SysEx sent ({} bytes)", sent)?;
            }
            "sweep" => {
                let sweep = Sweep {
                    controller: int(1, "controller")? as u8,
                    start: int(2, "start")?,
                    end: int(3, "end")?,
                    duration: match tokens.get(4) {
                        Some(token) => parse_duration(token)?,
                        None => self.sweep_duration,
                    },
                };
                if sweep.steps() > 0 {
                    writeln!(
                        self.writer,
                        "Sweeping CC{} {}->{}...",
                        sweep.controller, sweep.start, sweep.end
                    )?;
                    self.writer.flush()?;
                    self.session.sweep(&sweep)?;
                    writeln!(self.writer, "Sweep complete")?;
                }
            }
            "lfo" => self.lfo(tokens)?,
            "save" => {
                let name = operand(tokens, 1, action, "name")?;
                let path = self.session.save_preset(name)?;
                writeln!(self.writer, "Saved preset: {}", path.display())?;
            }
            "load" => {
                let name = operand(tokens, 1, action, "name")?;
                writeln!(self.writer, "Loading preset: {}", name)?;
                let preset = self.session.load_preset(name)?;
                for (controller, value) in preset.cc.iter() {
                    writeln!(self.writer, "  CC{} = {}", controller, value)?;
                }
                if let Some(program) = preset.program {
                    writeln!(self.writer, "  Program = {}", program)?;
                }
                writeln!(self.writer, "Preset applied")?;
            }
            "presets" => {
                let names = self.session.presets()?;
                if names.is_empty() {
                    writeln!(self.writer, "No presets saved yet")?;
                } else {
                    writeln!(self.writer, "Saved presets:")?;
                    for name in names {
                        writeln!(self.writer, "   - {}", name)?;
                    }
                }
            }
            "script" => {
                let path = operand(tokens, 1, action, "file")?;
                self.script(Path::new(path))?;
            }
            "panic" => {
                self.session.panic()?;
                writeln!(self.writer, "PANIC: All notes off")?;
            }
            _ => writeln!(self.writer, "Unknown: {}. Type 'help'", action)?,
        }

        Ok(Flow::Continue)
    }

    fn lfo(&mut self, tokens: &[&str]) -> Result<()> {
        if tokens
            .get(1)
            .is_some_and(|token| token.eq_ignore_ascii_case("stop"))
        {
            match self.session.stop_lfo()? {
                Some(_) => writeln!(self.writer, "LFO stopped")?,
                None => writeln!(self.writer, "No LFO running")?,
            }
            return Ok(());
        }

        if tokens.len() < 5 {
            writeln!(self.writer, "Usage: lfo <cc> <min> <max> <hz>  or  lfo stop")?;
            return Ok(());
        }

        let controller = parse_int(tokens[1])? as u8;
        let min = parse_int(tokens[2])?;
        let max = parse_int(tokens[3])?;
        let rate = parse_float(tokens[4])?;
        if rate <= 0.0 {
            return Err(ParseError::InvalidNumber(tokens[4].to_string()).into());
        }

        let params = self.session.start_lfo(controller, min, max, rate)?;
        writeln!(self.writer, "LFO started: {}", params)?;
        Ok(())
    }

    fn script(&mut self, path: &Path) -> Result<()> {
        writeln!(self.writer, "Running script: {}", path.display())?;

        let writer = &mut self.writer;
        let mut write_error: Option<io::Error> = None;
        let report = self.session.run_script(path, |event| {
            let result = match event {
                ScriptEvent::Executed { line, instruction } => {
                    writeln!(writer, "  [{}] {}", line, instruction)
                }
                ScriptEvent::Failed { line, error } => {
                    writeln!(writer, "  [{}] Error: {}", line, error)
                }
            };
            if let Err(e) = result {
                write_error.get_or_insert(e);
            }
        })?;
        if let Some(e) = write_error {
            return Err(e.into());
        }

        writeln!(
            self.writer,
            "Script complete ({} executed, {} errors)",
            report.executed,
            report.errors.len()
        )?;
        Ok(())
    }
}
