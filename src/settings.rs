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
    path::{Path, PathBuf},
    time::Duration,
};

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::{
    codec::Channel,
    error::{ParseError, Result},
};

/// Looked up in the working directory when no settings file is given.
const DEFAULT_SETTINGS_FILE: &str = "midimachine";

const ENV_PREFIX: &str = "MIDIMACHINE";

/// Persistent settings. Sources, lowest precedence first: built in defaults,
/// the settings file, `MIDIMACHINE_*` environment variables.
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct Settings {
    /// Where presets are stored.
    presets_dir: PathBuf,

    /// The output device to use without prompting.
    #[serde(default)]
    device: Option<usize>,

    /// The initial MIDI channel (1-16).
    channel: i64,

    /// Default sweep length, in seconds.
    sweep_duration: f64,

    /// Default note length for interactive notes, in seconds.
    note_duration: f64,
}

impl Settings {
    /// Loads settings. If `path` is given the file must exist.
    pub fn load(path: Option<&Path>) -> Result<Settings> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_SETTINGS_FILE).required(false),
        };

        Ok(Config::builder()
            .set_default("presets_dir", "presets")?
            .set_default("channel", 1)?
            .set_default("sweep_duration", 2.0)?
            .set_default("note_duration", 0.5)?
            .add_source(file)
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize::<Settings>()?)
    }

    pub fn presets_dir(&self) -> &Path {
        &self.presets_dir
    }

    pub fn device(&self) -> Option<usize> {
        self.device
    }

    pub fn channel(&self) -> std::result::Result<Channel, ParseError> {
        Channel::new(self.channel)
    }

    pub fn sweep_duration(&self) -> std::result::Result<Duration, ParseError> {
        Duration::try_from_secs_f64(self.sweep_duration)
            .map_err(|_| ParseError::InvalidDuration(self.sweep_duration.to_string()))
    }

    pub fn note_duration(&self) -> std::result::Result<Duration, ParseError> {
        Duration::try_from_secs_f64(self.note_duration)
            .map_err(|_| ParseError::InvalidDuration(self.note_duration.to_string()))
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            presets_dir: PathBuf::from("presets"),
            device: None,
            channel: 1,
            sweep_duration: 2.0,
            note_duration: 0.5,
        }
    }
}

#[cfg(test)]
mod test {
    use std::{env, fs};

    use serial_test::serial;
    use tempfile::tempdir;

    use crate::error::Error;

    use super::*;

    #[test]
    #[serial]
    fn test_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.yaml");
        fs::write(&path, "{}\n").unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(Settings::default(), settings);
        assert_eq!(Channel::default(), settings.channel().unwrap());
        assert_eq!(Duration::from_secs(2), settings.sweep_duration().unwrap());
    }

    #[test]
    #[serial]
    fn test_file_and_env() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("midimachine.yaml");
        fs::write(
            &path,
            "presets_dir: /tmp/synth-presets\ndevice: 2\nchannel: 10\nnote_duration: 0.25\n",
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(Path::new("/tmp/synth-presets"), settings.presets_dir());
        assert_eq!(Some(2), settings.device());
        assert_eq!(10, settings.channel().unwrap().number());
        assert_eq!(Duration::from_millis(250), settings.note_duration().unwrap());

        env::set_var("MIDIMACHINE_CHANNEL", "4");
        let settings = Settings::load(Some(&path));
        env::remove_var("MIDIMACHINE_CHANNEL");
        assert_eq!(4, settings.unwrap().channel().unwrap().number());
    }

    #[test]
    #[serial]
    fn test_bad_channel_and_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.yaml");
        fs::write(&path, "channel: 17\n").unwrap();
        assert_eq!(
            Err(ParseError::ChannelOutOfRange(17)),
            Settings::load(Some(&path)).unwrap().channel()
        );

        assert!(matches!(
            Settings::load(Some(&dir.path().join("nope.yaml"))),
            Err(Error::Config(_))
        ));
    }
}
