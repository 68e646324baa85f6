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
    sync::Arc,
    thread,
    time::Duration,
};

use tracing::{info, warn};

use crate::{
    codec::{self, Channel},
    error::{Error, Result},
    lfo::{LfoParams, Modulator},
    midi::{Backend, Port},
    preset::{ControllerState, Preset, PresetStore},
    script::{self, Interpreter, ScriptEvent, ScriptReport},
    sweep::Sweep,
};

/// Device names known to the backend.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Devices {
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

/// Everything a command can act on: the selected device and channel, the
/// controller values sent so far, the modulation slot and the preset store.
///
/// Foreground operations open the device for their own duration and block
/// until done. The LFO holds its own connection on a background thread. The
/// backend is expected to serialize individual sends, so the only hazard is a
/// foreground NRPN/RPN interleaving with LFO messages on the same channel.
pub struct Session {
    backend: Arc<dyn Backend>,
    device: usize,
    channel: Channel,
    controllers: ControllerState,
    program: Option<u8>,
    modulator: Modulator,
    presets: PresetStore,
}

impl Session {
    pub fn new(
        backend: Arc<dyn Backend>,
        device: usize,
        channel: Channel,
        presets: PresetStore,
    ) -> Session {
        Session {
            backend,
            device,
            channel,
            controllers: ControllerState::new(),
            program: None,
            modulator: Modulator::new(),
            presets,
        }
    }

    pub fn device(&self) -> usize {
        self.device
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Controller values sent during this session.
    pub fn controllers(&self) -> &ControllerState {
        &self.controllers
    }

    /// The running LFO, if any.
    pub fn lfo(&self) -> Option<LfoParams> {
        self.modulator.active()
    }

    pub fn set_channel(&mut self, channel: Channel) {
        self.channel = channel;
    }

    /// Lists input and output devices.
    pub fn list_devices(&self) -> Result<Devices> {
        Ok(Devices {
            inputs: self.backend.list_inputs()?,
            outputs: self.backend.list_outputs()?,
        })
    }

    /// The name of the selected output.
    pub fn device_name(&self) -> String {
        self.backend
            .list_outputs()
            .ok()
            .and_then(|outputs| outputs.get(self.device).cloned())
            .unwrap_or_else(|| format!("Device {}", self.device))
    }

    /// Switches to another output. Any running LFO is stopped first.
    pub fn set_device(&mut self, device: usize) -> Result<()> {
        self.stop_lfo()?;
        let outputs = self.backend.list_outputs()?;
        if device >= outputs.len() {
            return Err(Error::DeviceOpen {
                index: device,
                reason: format!("no such output ({} available)", outputs.len()),
            });
        }
        self.device = device;
        info!(device, name = outputs[device].as_str(), "Selected output.");
        Ok(())
    }

    fn open(&self) -> Result<Box<dyn Port>> {
        self.backend.open(self.device)
    }

    fn send(&self, messages: &[codec::ShortMessage]) -> Result<()> {
        self.open()?.send_all(messages)
    }

    pub fn send_cc(&mut self, controller: u8, value: u8) -> Result<()> {
        let message = codec::encode_cc(self.channel.wire(), controller, value);
        self.send(&[message])?;
        self.controllers.set(message.data1(), message.data2());
        Ok(())
    }

    /// Plays a note, holding it for `duration` before releasing it.
    pub fn note(&mut self, note: u8, velocity: u8, duration: Duration) -> Result<()> {
        let mut port = self.open()?;
        port.send_short(&codec::encode_note_on(self.channel.wire(), note, velocity))?;
        thread::sleep(duration);
        port.send_short(&codec::encode_note_off(self.channel.wire(), note))
    }

    pub fn program_change(&mut self, program: u8) -> Result<()> {
        let message = codec::encode_program_change(self.channel.wire(), program);
        self.send(&[message])?;
        self.program = Some(message.data1());
        Ok(())
    }

    pub fn pitch_bend(&mut self, value: u16) -> Result<()> {
        self.send(&[codec::encode_pitch_bend(self.channel.wire(), value)])
    }

    pub fn nrpn(&mut self, param: u16, value: u16) -> Result<()> {
        self.warn_parameter_hazard("NRPN");
        self.send(&codec::encode_nrpn(self.channel.wire(), param, value))
    }

    pub fn rpn(&mut self, param: u16, value: u16) -> Result<()> {
        self.warn_parameter_hazard("RPN");
        self.send(&codec::encode_rpn(self.channel.wire(), param, value))
    }

    fn warn_parameter_hazard(&self, kind: &str) {
        if let Some(lfo) = self.modulator.active() {
            if lfo.channel == self.channel {
                warn!(
                    kind,
                    lfo = lfo.to_string(),
                    "LFO is running on this channel and may interleave with the parameter messages."
                );
            }
        }
    }

    /// Frames and sends a SysEx message. Returns the number of bytes sent.
    pub fn sysex(&mut self, data: &[u8]) -> Result<usize> {
        let framed = codec::encode_sysex(data);
        self.open()?.send_long(&framed)?;
        Ok(framed.len())
    }

    /// All notes off, reset all controllers, all sound off.
    pub fn panic(&mut self) -> Result<()> {
        self.send(&codec::panic_messages(self.channel.wire()))
    }

    /// Runs a sweep on the active channel, blocking until it completes.
    pub fn sweep(&mut self, sweep: &Sweep) -> Result<usize> {
        if sweep.steps() == 0 {
            return Ok(0);
        }
        let mut port = self.open()?;
        let controllers = &mut self.controllers;
        let controller = sweep.controller & 0x7F;
        sweep.run(port.as_mut(), self.channel, |value| {
            controllers.set(controller, value & 0x7F)
        })
    }

    /// Starts an LFO on the active channel, replacing any running one.
    pub fn start_lfo(&mut self, controller: u8, min: i64, max: i64, rate: f64) -> Result<LfoParams> {
        let params = LfoParams {
            channel: self.channel,
            controller,
            min,
            max,
            rate,
        };
        self.modulator
            .start(self.backend.as_ref(), self.device, params)?;
        Ok(params)
    }

    /// Stops the LFO. Returns what was running, if anything.
    pub fn stop_lfo(&mut self) -> Result<Option<LfoParams>> {
        self.modulator.stop()
    }

    /// Returns the error an LFO stopped with on its own, if one did since the last check.
    pub fn reap_lfo(&mut self) -> Option<Error> {
        self.modulator.reap()
    }

    /// Captures the session as a preset.
    pub fn capture(&self) -> Preset {
        Preset::capture(&self.controllers, self.program, self.channel)
    }

    pub fn save_preset(&self, name: &str) -> Result<PathBuf> {
        self.presets.save(name, &self.capture())
    }

    /// Loads and applies a preset to the active channel.
    pub fn load_preset(&mut self, name: &str) -> Result<Preset> {
        let preset = self.presets.load(name)?;
        preset.apply(self.open()?.as_mut(), self.channel)?;
        self.controllers.merge(&preset.cc);
        if preset.program.is_some() {
            self.program = preset.program;
        }
        info!(name, "Applied preset.");
        Ok(preset)
    }

    pub fn presets(&self) -> Result<Vec<String>> {
        self.presets.list()
    }

    /// Runs a script file on a single connection, starting on the active channel.
    /// Channel changes made by the script stay local to it.
    pub fn run_script<F>(&mut self, path: &Path, observer: F) -> Result<ScriptReport>
    where
        F: FnMut(ScriptEvent<'_>),
    {
        let lines = script::load(path)?;
        let mut port = self.open()?;
        Interpreter::new(port.as_mut(), self.channel).run_with(&lines, observer)
    }

    /// Stops background work. Called before the session goes away.
    pub fn close(&mut self) -> Result<()> {
        self.stop_lfo().map(|_| ())
    }
}
