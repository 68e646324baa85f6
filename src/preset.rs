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
    fmt, fs,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use serde::{
    de::{MapAccess, Visitor},
    ser::SerializeMap,
    Deserialize, Deserializer, Serialize, Serializer,
};
use tracing::{debug, info};

use crate::{
    codec::{self, Channel},
    error::{Error, ParseError, Result},
    midi::Port,
};

/// Pause between controller messages when applying a preset.
const APPLY_PAUSE: Duration = Duration::from_millis(10);

const PRESET_EXTENSION: &str = "json";

/// Controller values in the order they were first set. Setting a controller
/// again updates its value without moving it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ControllerState {
    entries: Vec<(u8, u8)>,
}

impl ControllerState {
    pub fn new() -> ControllerState {
        ControllerState::default()
    }

    /// Records the last value sent to a controller.
    pub fn set(&mut self, controller: u8, value: u8) {
        match self.entries.iter_mut().find(|(cc, _)| *cc == controller) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((controller, value)),
        }
    }

    pub fn get(&self, controller: u8) -> Option<u8> {
        self.entries
            .iter()
            .find(|(cc, _)| *cc == controller)
            .map(|(_, value)| *value)
    }

    /// Merges another state into this one, in the other state's order.
    pub fn merge(&mut self, other: &ControllerState) {
        for (controller, value) in other.iter() {
            self.set(controller, value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, u8)> + '_ {
        self.entries.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(u8, u8)> for ControllerState {
    fn from_iter<T: IntoIterator<Item = (u8, u8)>>(iter: T) -> Self {
        let mut state = ControllerState::new();
        for (controller, value) in iter {
            state.set(controller, value);
        }
        state
    }
}

// Serialized as a JSON object keyed by controller number, e.g. {"74": 100}.
impl Serialize for ControllerState {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (controller, value) in self.iter() {
            map.serialize_entry(&controller.to_string(), &value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ControllerState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_map(ControllerStateVisitor)
    }
}

struct ControllerStateVisitor;

impl<'de> Visitor<'de> for ControllerStateVisitor {
    type Value = ControllerState;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "a map of controller numbers to values")
    }

    // Entries arrive in document order, which is the order they are applied in.
    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Self::Value, A::Error> {
        let mut state = ControllerState::new();
        while let Some((key, value)) = access.next_entry::<String, i64>()? {
            let controller: i64 = key.trim().parse().map_err(|_| {
                <A::Error as serde::de::Error>::custom(format!(
                    "controller '{}' is not an integer",
                    key
                ))
            })?;
            // Out of range numbers are masked by the codec, like everything else.
            state.set(controller as u8, value as u8);
        }
        Ok(state)
    }
}

/// A snapshot of controller values and an optional program.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Preset {
    /// Controller values, applied in order.
    #[serde(default)]
    pub cc: ControllerState,

    /// Program change sent after the controllers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<u8>,

    /// The channel the preset was captured on. Informational; presets are
    /// applied to the active channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<u8>,
}

impl Preset {
    /// Captures the current session state.
    pub fn capture(state: &ControllerState, program: Option<u8>, channel: Channel) -> Preset {
        Preset {
            cc: state.clone(),
            program,
            channel: Some(channel.number()),
        }
    }

    /// The messages that applying this preset sends, in order.
    pub fn messages(&self, channel: Channel) -> Vec<codec::ShortMessage> {
        let mut messages: Vec<codec::ShortMessage> = self
            .cc
            .iter()
            .map(|(controller, value)| codec::encode_cc(channel.wire(), controller, value))
            .collect();
        if let Some(program) = self.program {
            messages.push(codec::encode_program_change(channel.wire(), program));
        }
        messages
    }

    /// Sends the preset through the port: one control change per controller,
    /// then the program change if there is one.
    pub fn apply(&self, port: &mut dyn Port, channel: Channel) -> Result<()> {
        for message in self.messages(channel) {
            port.send_short(&message)?;
            debug!(message = %message, "Applied preset message.");
            if message.status() & 0xF0 == codec::CONTROL_CHANGE {
                thread::sleep(APPLY_PAUSE);
            }
        }
        Ok(())
    }
}

/// Presets stored as JSON documents in a directory, one file per preset.
pub struct PresetStore {
    dir: PathBuf,
}

impl PresetStore {
    pub fn new(dir: &Path) -> PresetStore {
        PresetStore {
            dir: dir.to_path_buf(),
        }
    }

    /// The directory presets live in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(ParseError::InvalidPresetName(name.to_string()).into());
        }
        Ok(self.dir.join(format!("{}.{}", name, PRESET_EXTENSION)))
    }

    /// Writes the preset, replacing any preset of the same name.
    pub fn save(&self, name: &str, preset: &Preset) -> Result<PathBuf> {
        let path = self.path(name)?;
        fs::create_dir_all(&self.dir)?;
        fs::write(&path, serde_json::to_string_pretty(preset)?)?;
        info!(path = %path.display(), "Saved preset.");
        Ok(path)
    }

    /// Reads the named preset.
    pub fn load(&self, name: &str) -> Result<Preset> {
        let path = self.path(name)?;
        if !path.is_file() {
            return Err(Error::NotFound {
                kind: "preset",
                name: name.to_string(),
            });
        }
        Ok(serde_json::from_str(&fs::read_to_string(&path)?)?)
    }

    /// Names of all stored presets, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        fs::create_dir_all(&self.dir)?;
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == PRESET_EXTENSION) {
                if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}
