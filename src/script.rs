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

//! A line oriented automation language. One instruction per line:
//!
//! ```text
//! # comments and blank lines are skipped
//! channel 2
//! cc 74 100
//! note 60 100 0.25
//! pc 5
//! nrpn 1000 8192
//! wait 500ms
//! ```
//!
//! A bad line is reported and skipped; a transmission failure ends the script.

use std::{fmt, fs, path::Path, thread, time::Duration};

use duration_string::DurationString;
use tracing::{info, span, warn, Level};

use crate::{
    codec::{self, Channel},
    error::{Error, ParseError, Result},
    midi::Port,
};

/// How long a `note` holds when no duration is given.
pub const DEFAULT_NOTE_DURATION: Duration = Duration::from_millis(500);

/// A single script instruction.
#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    ControlChange { controller: u8, value: u8 },
    Note { note: u8, velocity: u8, duration: Duration },
    ProgramChange { program: u8 },
    Nrpn { param: u16, value: u16 },
    Wait(Duration),
    Channel(Channel),
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::ControlChange { controller, value } => {
                write!(f, "CC{} = {}", controller, value)
            }
            Instruction::Note { note, velocity, .. } => write!(f, "Note {} vel={}", note, velocity),
            Instruction::ProgramChange { program } => write!(f, "Program = {}", program),
            Instruction::Nrpn { param, value } => write!(f, "NRPN {} = {}", param, value),
            Instruction::Wait(duration) => write!(f, "Wait {}s", duration.as_secs_f64()),
            Instruction::Channel(channel) => write!(f, "Channel = {}", channel),
        }
    }
}

/// Parses an integer argument. Values are kept wide here; the codec masks them.
pub fn parse_int(token: &str) -> std::result::Result<i64, ParseError> {
    token
        .parse::<i64>()
        .map_err(|_| ParseError::InvalidInteger(token.to_string()))
}

/// Parses a floating point argument.
pub fn parse_float(token: &str) -> std::result::Result<f64, ParseError> {
    match token.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(ParseError::InvalidNumber(token.to_string())),
    }
}

/// Parses a duration given in seconds (`0.5`) or as a duration string (`500ms`).
pub fn parse_duration(token: &str) -> std::result::Result<Duration, ParseError> {
    if let Ok(seconds) = token.parse::<f64>() {
        return Duration::try_from_secs_f64(seconds)
            .map_err(|_| ParseError::InvalidDuration(token.to_string()));
    }

    DurationString::from_string(token.to_string())
        .map(Duration::from)
        .map_err(|_| ParseError::InvalidDuration(token.to_string()))
}

/// Returns the operand at `index`, or a missing operand error naming it.
pub(crate) fn operand<'a>(
    tokens: &[&'a str],
    index: usize,
    command: &str,
    name: &'static str,
) -> std::result::Result<&'a str, ParseError> {
    tokens
        .get(index)
        .copied()
        .ok_or_else(|| ParseError::MissingOperand {
            command: command.to_string(),
            operand: name,
        })
}

/// Parses one line. Blank lines and comments yield `None`.
pub fn parse_line(line: &str) -> std::result::Result<Option<Instruction>, ParseError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let tokens: Vec<&str> = line.split_whitespace().collect();
    let command = tokens[0].to_lowercase();
    let int = |index: usize, name: &'static str| -> std::result::Result<i64, ParseError> {
        parse_int(operand(&tokens, index, &command, name)?)
    };

    let instruction = match command.as_str() {
        "cc" => Instruction::ControlChange {
            controller: int(1, "controller")? as u8,
            value: int(2, "value")? as u8,
        },
        "note" => Instruction::Note {
            note: int(1, "note")? as u8,
            velocity: int(2, "velocity")? as u8,
            duration: match tokens.get(3) {
                Some(token) => parse_duration(token)?,
                None => DEFAULT_NOTE_DURATION,
            },
        },
        "pc" => Instruction::ProgramChange {
            program: int(1, "program")? as u8,
        },
        "nrpn" => Instruction::Nrpn {
            param: int(1, "parameter")? as u16,
            value: int(2, "value")? as u16,
        },
        "wait" | "sleep" => {
            Instruction::Wait(parse_duration(operand(&tokens, 1, &command, "duration")?)?)
        }
        "channel" => Instruction::Channel(Channel::new(int(1, "channel")?)?),
        _ => return Err(ParseError::UnknownCommand(tokens[0].to_string())),
    };

    Ok(Some(instruction))
}

/// Reads a script file into lines.
pub fn load(path: &Path) -> Result<Vec<String>> {
    if !path.is_file() {
        return Err(Error::NotFound {
            kind: "script",
            name: path.display().to_string(),
        });
    }
    Ok(fs::read_to_string(path)?
        .lines()
        .map(|line| line.to_string())
        .collect())
}

/// Progress reported while a script runs. Line numbers are 1-based.
#[derive(Debug)]
pub enum ScriptEvent<'a> {
    Executed {
        line: usize,
        instruction: &'a Instruction,
    },
    Failed {
        line: usize,
        error: &'a ParseError,
    },
}

/// A line that could not be executed.
#[derive(Clone, Debug, PartialEq)]
pub struct LineError {
    pub line: usize,
    pub error: ParseError,
}

/// The outcome of a completed script.
#[derive(Clone, Debug, PartialEq)]
pub struct ScriptReport {
    /// Instructions executed.
    pub executed: usize,
    /// Lines that were reported and skipped.
    pub errors: Vec<LineError>,
    /// The channel in effect when the script ended.
    pub channel: Channel,
}

/// Executes scripts against a port that stays open for the whole script.
pub struct Interpreter<'a> {
    port: &'a mut dyn Port,
    channel: Channel,
}

impl<'a> Interpreter<'a> {
    pub fn new(port: &'a mut dyn Port, channel: Channel) -> Interpreter<'a> {
        Interpreter { port, channel }
    }

    /// Runs the script.
    pub fn run(&mut self, lines: &[String]) -> Result<ScriptReport> {
        self.run_with(lines, |_| {})
    }

    /// Runs the script, calling `observer` after every executed or rejected line.
    pub fn run_with<F>(&mut self, lines: &[String], mut observer: F) -> Result<ScriptReport>
    where
        F: FnMut(ScriptEvent<'_>),
    {
        let span = span!(Level::INFO, "script");
        let _enter = span.enter();

        let mut executed = 0;
        let mut errors = Vec::new();

        for (i, text) in lines.iter().enumerate() {
            let line = i + 1;
            let instruction = match parse_line(text) {
                Ok(Some(instruction)) => instruction,
                Ok(None) => continue,
                Err(error) => {
                    warn!(line, err = error.to_string(), "Skipping script line.");
                    observer(ScriptEvent::Failed {
                        line,
                        error: &error,
                    });
                    errors.push(LineError { line, error });
                    continue;
                }
            };

            self.execute(&instruction)?;
            info!(line, instruction = instruction.to_string(), "Executed.");
            observer(ScriptEvent::Executed {
                line,
                instruction: &instruction,
            });
            executed += 1;
        }

        Ok(ScriptReport {
            executed,
            errors,
            channel: self.channel,
        })
    }

    /// Executes a single instruction. Notes and waits block for their duration.
    pub fn execute(&mut self, instruction: &Instruction) -> Result<()> {
        let channel = self.channel.wire();
        match *instruction {
            Instruction::ControlChange { controller, value } => self
                .port
                .send_short(&codec::encode_cc(channel, controller, value)),
            Instruction::Note {
                note,
                velocity,
                duration,
            } => {
                self.port
                    .send_short(&codec::encode_note_on(channel, note, velocity))?;
                thread::sleep(duration);
                self.port.send_short(&codec::encode_note_off(channel, note))
            }
            Instruction::ProgramChange { program } => self
                .port
                .send_short(&codec::encode_program_change(channel, program)),
            Instruction::Nrpn { param, value } => self
                .port
                .send_all(&codec::encode_nrpn(channel, param, value)),
            Instruction::Wait(duration) => {
                thread::sleep(duration);
                Ok(())
            }
            Instruction::Channel(channel) => {
                self.channel = channel;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::Instant;

    use tempfile::tempdir;

    use crate::midi::{mock, Backend as _};

    use super::*;

    fn lines(script: &str) -> Vec<String> {
        script.lines().map(|line| line.to_string()).collect()
    }

    #[test]
    fn test_parse_line() {
        assert_eq!(Ok(None), parse_line(""));
        assert_eq!(Ok(None), parse_line("   # a comment"));
        assert_eq!(
            Ok(Some(Instruction::ControlChange {
                controller: 74,
                value: 100
            })),
            parse_line("  CC 74 100 trailing")
        );
        assert_eq!(
            Ok(Some(Instruction::ControlChange {
                controller: 74,
                value: 200
            })),
            parse_line("cc 74 200")
        );
        assert_eq!(
            Ok(Some(Instruction::Note {
                note: 60,
                velocity: 90,
                duration: DEFAULT_NOTE_DURATION
            })),
            parse_line("note 60 90")
        );
        assert_eq!(
            Ok(Some(Instruction::Note {
                note: 60,
                velocity: 90,
                duration: Duration::from_millis(250)
            })),
            parse_line("note 60 90 0.25")
        );
        assert_eq!(
            Ok(Some(Instruction::Wait(Duration::from_millis(300)))),
            parse_line("sleep 300ms")
        );
        assert_eq!(
            Ok(Some(Instruction::Nrpn {
                param: 1000,
                value: 8192
            })),
            parse_line("nrpn 1000 8192")
        );
        assert_eq!(
            Ok(Some(Instruction::Channel(Channel::new(10).unwrap()))),
            parse_line("channel 10")
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            Err(ParseError::UnknownCommand("bogus".into())),
            parse_line("bogus 1 2")
        );
        assert_eq!(
            Err(ParseError::InvalidInteger("abc".into())),
            parse_line("cc abc 1")
        );
        assert_eq!(
            Err(ParseError::MissingOperand {
                command: "cc".into(),
                operand: "value"
            }),
            parse_line("cc 74")
        );
        assert_eq!(
            Err(ParseError::ChannelOutOfRange(17)),
            parse_line("channel 17")
        );
        assert_eq!(
            Err(ParseError::InvalidDuration("-1".into())),
            parse_line("wait -1")
        );
        assert_eq!(
            Err(ParseError::InvalidDuration("soon".into())),
            parse_line("wait soon")
        );
    }

    #[test]
    fn test_malformed_line_is_isolated() {
        let backend = mock::Backend::new();
        let mut port = backend.open(0).unwrap();
        let report = Interpreter::new(port.as_mut(), Channel::default())
            .run(&lines("cc 74 100\ncc 71 oops\ncc 10 64\n"))
            .unwrap();

        assert_eq!(2, report.executed);
        assert_eq!(
            vec![LineError {
                line: 2,
                error: ParseError::InvalidInteger("oops".into())
            }],
            report.errors
        );
        assert_eq!(vec![vec![0xB0, 74, 100], vec![0xB0, 10, 64]], backend.sent());
        assert_eq!(1, backend.opened());
    }

    #[test]
    fn test_out_of_range_values_are_masked_on_the_wire() {
        let backend = mock::Backend::new();
        let mut port = backend.open(0).unwrap();
        Interpreter::new(port.as_mut(), Channel::default())
            .run(&lines("cc 74 200\npc 130\nnrpn 16384 1"))
            .unwrap();
        assert_eq!(
            vec![
                vec![0xB0, 74, 72],
                vec![0xC0, 2],
                vec![0xB0, 99, 0],
                vec![0xB0, 98, 0],
                vec![0xB0, 6, 0],
                vec![0xB0, 38, 1],
            ],
            backend.sent()
        );
    }

    #[test]
    fn test_channel_carries_across_lines() {
        let backend = mock::Backend::new();
        let mut port = backend.open(0).unwrap();
        let mut seen = Vec::new();
        let report = Interpreter::new(port.as_mut(), Channel::new(1).unwrap())
            .run_with(
                &lines("# setup\n\npc 3\nchannel 5\nnrpn 130 257\nnope\n"),
                |event| match event {
                    ScriptEvent::Executed { line, instruction } => {
                        seen.push(format!("[{}] {}", line, instruction))
                    }
                    ScriptEvent::Failed { line, error } => {
                        seen.push(format!("[{}] Error: {}", line, error))
                    }
                },
            )
            .unwrap();

        assert_eq!(Channel::new(5).unwrap(), report.channel);
        assert_eq!(
            vec![
                vec![0xC0, 3],
                vec![0xB4, 99, 1],
                vec![0xB4, 98, 2],
                vec![0xB4, 6, 2],
                vec![0xB4, 38, 1],
            ],
            backend.sent()
        );
        assert_eq!(
            vec![
                "[3] Program = 3",
                "[4] Channel = 5",
                "[5] NRPN 130 = 257",
                "[6] Error: unknown command 'nope'",
            ],
            seen
        );
    }

    #[test]
    fn test_note_holds_for_duration() {
        let backend = mock::Backend::new();
        let mut port = backend.open(0).unwrap();
        let start = Instant::now();
        Interpreter::new(port.as_mut(), Channel::default())
            .run(&lines("note 60 100 0.1"))
            .unwrap();
        assert!(start.elapsed() >= Duration::from_millis(100));

        let records = backend.sent_records();
        assert_eq!(vec![0x90, 60, 100], records[0].bytes);
        assert_eq!(vec![0x80, 60, 0], records[1].bytes);
        assert!(records[1].at.duration_since(records[0].at) >= Duration::from_millis(100));
    }

    #[test]
    fn test_transmission_failure_ends_script() {
        let backend = mock::Backend::new();
        backend.fail_after(1);
        let mut port = backend.open(0).unwrap();
        let result = Interpreter::new(port.as_mut(), Channel::default())
            .run(&lines("cc 1 1\ncc 1 2\ncc 1 3"));
        assert!(matches!(result, Err(Error::Transmission(_))));
        assert_eq!(1, backend.sent().len());
    }

    #[test]
    fn test_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fade.txt");
        fs::write(&path, "cc 7 0\nwait 0.1\ncc 7 127\n").unwrap();
        assert_eq!(3, load(&path).unwrap().len());

        let missing = load(&dir.path().join("missing.txt")).unwrap_err();
        assert!(matches!(missing, Error::NotFound { kind: "script", .. }));
    }
}
