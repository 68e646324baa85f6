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
use std::{fmt, thread, time::Duration};

use midir::{MidiInput, MidiOutput, MidiOutputConnection};
use tracing::{debug, span, Level};

use crate::{
    codec::{self, ShortMessage},
    error::{Error, Result},
};

/// How long to let a SysEx transmission settle before the port can be reused.
const SYSEX_SETTLE: Duration = Duration::from_millis(10);

/// The system MIDI backend.
pub struct Backend {}

impl Backend {
    pub fn new() -> Backend {
        Backend {}
    }
}

impl super::Backend for Backend {
    fn list_outputs(&self) -> Result<Vec<String>> {
        let output = MidiOutput::new("midimachine output listing")?;
        output
            .ports()
            .iter()
            .map(|port| {
                output
                    .port_name(port)
                    .map_err(|e| Error::Backend(e.to_string()))
            })
            .collect()
    }

    fn list_inputs(&self) -> Result<Vec<String>> {
        let input = MidiInput::new("midimachine input listing")?;
        input
            .ports()
            .iter()
            .map(|port| {
                input
                    .port_name(port)
                    .map_err(|e| Error::Backend(e.to_string()))
            })
            .collect()
    }

    fn open(&self, index: usize) -> Result<Box<dyn super::Port>> {
        let span = span!(Level::DEBUG, "open port (midir)");
        let _enter = span.enter();

        let output = MidiOutput::new("midimachine output")?;
        let ports = output.ports();
        let port = ports.get(index).ok_or_else(|| Error::DeviceOpen {
            index,
            reason: format!("no such output ({} available)", ports.len()),
        })?;
        let name = output
            .port_name(port)
            .map_err(|e| Error::DeviceOpen {
                index,
                reason: e.to_string(),
            })?;
        let connection = output
            .connect(port, "midimachine")
            .map_err(|e| Error::DeviceOpen {
                index,
                reason: e.to_string(),
            })?;

        debug!(index, device = name, "Opened MIDI output.");

        Ok(Box::new(Port { name, connection }))
    }
}

/// An open midir output connection.
struct Port {
    name: String,
    connection: MidiOutputConnection,
}

impl super::Port for Port {
    fn send_short(&mut self, message: &ShortMessage) -> Result<()> {
        debug!(
            device = self.name,
            event = format!("{:?}", codec::decode(message.as_bytes())),
            "Sending message."
        );
        self.connection.send(message.as_bytes())?;
        Ok(())
    }

    fn send_long(&mut self, data: &[u8]) -> Result<()> {
        debug!(device = self.name, len = data.len(), "Sending SysEx.");
        self.connection.send(data)?;
        thread::sleep(SYSEX_SETTLE);
        Ok(())
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
