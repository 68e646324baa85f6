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
use std::{fmt, sync::Arc};

use crate::{codec::ShortMessage, error::Result};

mod midir;
pub mod mock;

/// An open connection to a MIDI output. The connection is closed when dropped.
pub trait Port: fmt::Display + Send {
    /// Sends a single channel voice message.
    fn send_short(&mut self, message: &ShortMessage) -> Result<()>;

    /// Sends an already framed System Exclusive message. Returns once the
    /// transmission has settled.
    fn send_long(&mut self, data: &[u8]) -> Result<()>;

    /// Sends the messages in order, stopping at the first failure.
    fn send_all(&mut self, messages: &[ShortMessage]) -> Result<()> {
        for message in messages {
            self.send_short(message)?;
        }
        Ok(())
    }
}

/// Enumerates and opens MIDI devices.
pub trait Backend: Send + Sync {
    /// Lists output device names, ordered by device index.
    fn list_outputs(&self) -> Result<Vec<String>>;

    /// Lists input device names, ordered by device index. Informational only.
    fn list_inputs(&self) -> Result<Vec<String>>;

    /// Opens the output with the given index.
    fn open(&self, index: usize) -> Result<Box<dyn Port>>;
}

/// Gets the system MIDI backend, or a mock backend that sends nowhere.
pub fn get_backend(mock: bool) -> Arc<dyn Backend> {
    if mock {
        return Arc::new(mock::Backend::new());
    }

    Arc::new(midir::Backend::new())
}
