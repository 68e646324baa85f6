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

/// Problems with user supplied input. These never abort a script or a shell
/// session: the offending line or command is reported and skipped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid integer '{0}'")]
    InvalidInteger(String),

    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    #[error("invalid duration '{0}'")]
    InvalidDuration(String),

    #[error("{command}: missing {operand}")]
    MissingOperand {
        command: String,
        operand: &'static str,
    },

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("invalid SysEx hex string '{0}'")]
    InvalidHex(String),

    #[error("channel {0} is out of range (1-16)")]
    ChannelOutOfRange(i64),

    #[error("invalid preset name '{0}'")]
    InvalidPresetName(String),
}

/// Errors surfaced by midimachine operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unable to open MIDI output {index}: {reason}")]
    DeviceOpen { index: usize, reason: String },

    #[error("MIDI transmission failed: {0}")]
    Transmission(String),

    #[error("MIDI backend error: {0}")]
    Backend(String),

    #[error("LFO did not stop within {0:?}")]
    StopTimeout(std::time::Duration),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("preset document error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("settings load/parse error: {0}")]
    Config(#[from] config::ConfigError),
}

impl Error {
    /// Returns true if the surrounding loop may continue after reporting this error.
    /// Device and transmission failures abort the current operation instead.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Parse(_) | Error::NotFound { .. })
    }
}

impl From<midir::InitError> for Error {
    fn from(e: midir::InitError) -> Self {
        Error::Backend(e.to_string())
    }
}

impl From<midir::SendError> for Error {
    fn from(e: midir::SendError) -> Self {
        Error::Transmission(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
