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

//! Software LFO: a background task that modulates a single controller with a
//! triangle wave.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use tracing::{error, info, span, warn, Level};

use crate::{
    codec::{self, Channel},
    error::{Error, Result},
    midi::{Backend, Port},
};

/// The time between two consecutive controller updates.
pub const STEP_INTERVAL: Duration = Duration::from_millis(20);

/// How long `stop` waits for the task to acknowledge before giving up on it.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(1);

/// What to modulate and how.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LfoParams {
    pub channel: Channel,
    pub controller: u8,
    pub min: i64,
    pub max: i64,
    /// Cycles per second.
    pub rate: f64,
}

impl fmt::Display for LfoParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CC{} [{}-{}] @ {}Hz on channel {}",
            self.controller, self.min, self.max, self.rate, self.channel
        )
    }
}

/// Samples a triangle wave. Rises linearly from `min` at phase 0 to `max` at
/// phase 0.5, then falls back to `min` as phase approaches 1.
pub fn triangle(phase: f64, min: f64, max: f64) -> f64 {
    let t = if phase < 0.5 {
        phase * 2.0
    } else {
        2.0 - phase * 2.0
    };
    min + t * (max - min)
}

/// The number of updates in one full cycle at the given rate. Never less than one.
pub fn steps_per_cycle(rate: f64, step: Duration) -> u32 {
    let steps = (1.0 / rate / step.as_secs_f64()).round();
    if steps.is_nan() || steps < 1.0 {
        1
    } else {
        steps as u32
    }
}

/// Walks the triangle wave one step at a time.
pub struct Oscillator {
    phase: f64,
    increment: f64,
    min: f64,
    max: f64,
}

impl Oscillator {
    pub fn new(params: &LfoParams, step: Duration) -> Oscillator {
        Oscillator {
            phase: 0.0,
            increment: 1.0 / f64::from(steps_per_cycle(params.rate, step)),
            min: params.min as f64,
            max: params.max as f64,
        }
    }

    /// Returns the value at the current phase, truncated toward zero, and advances the phase.
    pub fn next_value(&mut self) -> i64 {
        let value = triangle(self.phase, self.min, self.max) as i64;
        self.phase = (self.phase + self.increment) % 1.0;
        value
    }
}

/// A running LFO task. Dropping it stops the task.
pub struct Lfo {
    params: LfoParams,
    running: Arc<AtomicBool>,
    done_rx: Receiver<Result<()>>,
    join_handle: Option<JoinHandle<()>>,
}

impl Lfo {
    /// Starts modulating through the given port. The port is owned by the task
    /// and closed before the task acknowledges a stop.
    pub fn spawn(port: Box<dyn Port>, params: LfoParams) -> Result<Lfo> {
        let running = Arc::new(AtomicBool::new(true));
        let (done_tx, done_rx) = bounded(1);

        let join_handle = {
            let running = running.clone();
            thread::Builder::new()
                .name("midimachine-lfo".to_string())
                .spawn(move || {
                    let result = Lfo::run(port, params, &running);
                    // Queued before the flag clears: a stopped task always has its result waiting.
                    let _ = done_tx.send(result);
                    running.store(false, Ordering::Release);
                })?
        };

        info!(lfo = params.to_string(), "LFO started.");

        Ok(Lfo {
            params,
            running,
            done_rx,
            join_handle: Some(join_handle),
        })
    }

    fn run(mut port: Box<dyn Port>, params: LfoParams, running: &AtomicBool) -> Result<()> {
        let span = span!(Level::INFO, "lfo", controller = params.controller);
        let _enter = span.enter();

        let mut oscillator = Oscillator::new(&params, STEP_INTERVAL);
        let mut next_tick = Instant::now();
        let channel = params.channel.wire();

        while running.load(Ordering::Acquire) {
            let value = oscillator.next_value();
            let message = codec::encode_cc(channel, params.controller, value as u8);
            if let Err(e) = port.send_short(&message) {
                error!(err = e.to_string(), device = port.to_string(), "LFO send failed, stopping.");
                return Err(e);
            }

            // Schedule against the ideal tick time so sleep overshoot doesn't accumulate.
            next_tick += STEP_INTERVAL;
            spin_sleep::sleep(next_tick.saturating_duration_since(Instant::now()));
        }

        drop(port);
        Ok(())
    }

    /// What this task is modulating.
    pub fn params(&self) -> LfoParams {
        self.params
    }

    /// False once a stop has been requested or the task has exited on its own.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// True once the task has exited and its result is waiting to be collected.
    fn has_exited(&self) -> bool {
        !self.is_running() && !self.done_rx.is_empty()
    }

    /// Stops the task and waits for it to release the port. Returns the error
    /// that ended the task, if it failed on its own. On `StopTimeout` the task
    /// may still hold its port, and stopping again waits for it once more.
    pub fn stop(&mut self) -> Result<()> {
        if self.join_handle.is_none() {
            return Ok(());
        }

        self.running.store(false, Ordering::Release);
        let result = match self.done_rx.recv_timeout(STOP_TIMEOUT) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    lfo = self.params.to_string(),
                    "LFO did not acknowledge stop in time."
                );
                return Err(Error::StopTimeout(STOP_TIMEOUT));
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(Error::Backend("LFO task exited unexpectedly".to_string()))
            }
        };

        if let Some(join_handle) = self.join_handle.take() {
            if join_handle.join().is_err() {
                return Err(Error::Backend("error while joining LFO thread".to_string()));
            }
        }

        info!(lfo = self.params.to_string(), "LFO stopped.");
        result
    }
}

impl Drop for Lfo {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(err = e.to_string(), "Error stopping LFO on drop.");
        }
    }
}

/// The single modulation slot. At most one LFO runs at a time; starting a new
/// one stops the previous one first.
#[derive(Default)]
pub struct Modulator {
    active: Option<Lfo>,
}

impl Modulator {
    pub fn new() -> Modulator {
        Modulator { active: None }
    }

    /// Starts an LFO on the given device. Any running LFO is stopped, and its
    /// port closed, before the new one opens its own. If the previous task
    /// doesn't acknowledge the stop it stays in the slot and nothing is started.
    pub fn start(&mut self, backend: &dyn Backend, device: usize, params: LfoParams) -> Result<()> {
        if let Some(previous) = self.active.as_mut() {
            match previous.stop() {
                Ok(()) => {}
                Err(e @ Error::StopTimeout(_)) => return Err(e),
                Err(e) => warn!(err = e.to_string(), "Previous LFO ended with an error."),
            }
        }
        self.active = None;

        let port = backend.open(device)?;
        self.active = Some(Lfo::spawn(port, params)?);
        Ok(())
    }

    /// Stops the active LFO, if any, returning what it was modulating.
    pub fn stop(&mut self) -> Result<Option<LfoParams>> {
        match self.active.as_mut() {
            Some(lfo) => {
                let params = lfo.params();
                let result = lfo.stop();
                if !matches!(result, Err(Error::StopTimeout(_))) {
                    self.active = None;
                }
                result.map(|_| Some(params))
            }
            None => Ok(None),
        }
    }

    /// Clears the slot if the LFO has stopped on its own and returns the error it stopped with.
    pub fn reap(&mut self) -> Option<Error> {
        if self.active.as_ref().is_some_and(|lfo| lfo.has_exited()) {
            return self.active.take().and_then(|mut lfo| lfo.stop().err());
        }
        None
    }

    /// The parameters of the running LFO.
    pub fn active(&self) -> Option<LfoParams> {
        self.active
            .as_ref()
            .filter(|lfo| lfo.is_running())
            .map(|lfo| lfo.params())
    }

    pub fn is_running(&self) -> bool {
        self.active().is_some()
    }
}
