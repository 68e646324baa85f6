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
use std::time::{Duration, Instant};

use tracing::{info, span, Level};

use crate::{
    codec::{self, Channel},
    error::Result,
    midi::Port,
};

/// A linear ramp of one controller across a time window. Blocks the caller for
/// the whole window and cannot be interrupted once started.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sweep {
    pub controller: u8,
    pub start: i64,
    pub end: i64,
    pub duration: Duration,
}

impl Sweep {
    /// The number of steps between start and end. Zero means there is nothing to do.
    pub fn steps(&self) -> u64 {
        self.start.abs_diff(self.end)
    }

    /// Every value from start to end inclusive, in sweep order. Empty when start equals end.
    /// Produced lazily; the range may be far wider than anything a device accepts.
    pub fn values(&self) -> Box<dyn Iterator<Item = i64>> {
        if self.steps() == 0 {
            return Box::new(std::iter::empty());
        }
        if self.end >= self.start {
            Box::new(self.start..=self.end)
        } else {
            Box::new((self.end..=self.start).rev())
        }
    }

    /// The pause between two consecutive values.
    pub fn step_delay(&self) -> Duration {
        match self.steps() {
            0 => Duration::ZERO,
            steps => self.duration.div_f64(steps as f64),
        }
    }

    /// Runs the sweep. `on_sent` is called with every value after it has gone out.
    /// A transmission failure ends the sweep immediately.
    pub fn run<F>(&self, port: &mut dyn Port, channel: Channel, mut on_sent: F) -> Result<usize>
    where
        F: FnMut(u8),
    {
        if self.steps() == 0 {
            return Ok(0);
        }

        let span = span!(Level::INFO, "sweep", controller = self.controller);
        let _enter = span.enter();
        info!(
            start = self.start,
            end = self.end,
            duration = ?self.duration,
            "Sweeping controller."
        );

        let delay = self.step_delay();
        let mut next_step = Instant::now();
        let mut sent = 0;
        for value in self.values() {
            if sent > 0 {
                next_step += delay;
                spin_sleep::sleep(next_step.saturating_duration_since(Instant::now()));
            }
            let value = value as u8;
            port.send_short(&codec::encode_cc(channel.wire(), self.controller, value))?;
            on_sent(value);
            sent += 1;
        }

        Ok(sent)
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use crate::{
        error::Error,
        midi::{mock, Backend as _},
    };

    use super::*;

    fn sweep(start: i64, end: i64, millis: u64) -> Sweep {
        Sweep {
            controller: 74,
            start,
            end,
            duration: Duration::from_millis(millis),
        }
    }

    #[test]
    fn test_values() {
        assert_eq!(vec![1, 2, 3], sweep(1, 3, 0).values().collect::<Vec<_>>());
        assert_eq!(vec![3, 2, 1], sweep(3, 1, 0).values().collect::<Vec<_>>());
        assert_eq!(0, sweep(5, 5, 1000).values().count());
        let delay = sweep(100, 20, 1600).step_delay();
        assert!((delay.as_secs_f64() - 0.02).abs() < 1e-6);
    }

    #[test]
    fn test_descending_sweep() {
        let backend = mock::Backend::new();
        let mut port = backend.open(0).unwrap();
        let mut seen = Vec::new();
        let sent = sweep(100, 20, 1600)
            .run(port.as_mut(), Channel::new(2).unwrap(), |value| seen.push(value))
            .unwrap();

        assert_eq!(81, sent);
        let expected: Vec<u8> = (20..=100).rev().collect();
        assert_eq!(expected, seen);

        let records = backend.sent_records();
        assert_eq!(81, records.len());
        for (record, value) in records.iter().zip(expected.iter()) {
            assert_eq!(vec![0xB1, 74, *value], record.bytes);
        }
        let elapsed = records[80].at.duration_since(records[0].at);
        assert!(elapsed >= Duration::from_millis(1550), "sweep too fast: {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(2500), "sweep too slow: {:?}", elapsed);
    }

    #[test]
    fn test_noop_sweep() {
        let backend = mock::Backend::new();
        let mut port = backend.open(0).unwrap();
        assert_eq!(
            0,
            sweep(64, 64, 2000)
                .run(port.as_mut(), Channel::default(), |_| {})
                .unwrap()
        );
        assert!(backend.sent().is_empty());
    }

    #[test]
    fn test_sweep_aborts_on_failure() {
        let backend = mock::Backend::new();
        backend.fail_after(2);
        let mut port = backend.open(0).unwrap();
        let mut seen = Vec::new();
        let result = sweep(0, 10, 10).run(port.as_mut(), Channel::default(), |value| {
            seen.push(value)
        });
        assert!(matches!(result, Err(Error::Transmission(_))));
        assert_eq!(vec![0, 1], seen);
    }

    #[test]
    fn test_wide_range_is_not_materialized() {
        let backend = mock::Backend::new();
        backend.fail_after(2);
        let mut port = backend.open(0).unwrap();
        let mut seen = Vec::new();
        let wide = sweep(0, i64::MAX, 1000);
        assert_eq!(u64::MAX / 2, wide.steps());
        assert_eq!(vec![0, 1, 2], wide.values().take(3).collect::<Vec<_>>());

        let result = wide.run(port.as_mut(), Channel::default(), |value| seen.push(value));
        assert!(matches!(result, Err(Error::Transmission(_))));
        assert_eq!(vec![0, 1], seen);
    }
}
